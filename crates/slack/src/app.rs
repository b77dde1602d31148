//! The bot shell: handler registration plus a one-way start.
//!
//! An [`App`] is idle until [`App::start`] consumes it. Starting connects the
//! transport, moves the event loop onto its own task and hands back a
//! [`Listening`] handle. There is no way back to idle.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::info;

use crate::commands::{CommandHandler, CommandTrigger};
use crate::events::{EventDispatcher, EventHandler, EventKind, MessageHandler, MessagePattern};
use crate::socket::{ReconnectPolicy, SocketError, SocketModeRunner, SocketTransport};
use crate::web_api::SlackApi;

pub struct App {
    api: Arc<dyn SlackApi>,
    transport: Arc<dyn SocketTransport>,
    dispatcher: EventDispatcher,
    reconnect_policy: ReconnectPolicy,
}

impl App {
    pub fn new(api: Arc<dyn SlackApi>, transport: Arc<dyn SocketTransport>) -> Self {
        Self {
            api,
            transport,
            dispatcher: EventDispatcher::new(),
            reconnect_policy: ReconnectPolicy::default(),
        }
    }

    pub fn with_reconnect_policy(mut self, reconnect_policy: ReconnectPolicy) -> Self {
        self.reconnect_policy = reconnect_policy;
        self
    }

    /// The Web API client every handler receives through its context.
    pub fn api(&self) -> Arc<dyn SlackApi> {
        Arc::clone(&self.api)
    }

    pub fn on_command<H>(&mut self, trigger: impl Into<CommandTrigger>, handler: H) -> &mut Self
    where
        H: CommandHandler + 'static,
    {
        self.dispatcher.on_command(trigger, handler);
        self
    }

    pub fn on_event<H>(&mut self, kind: EventKind, handler: H) -> &mut Self
    where
        H: EventHandler + 'static,
    {
        self.dispatcher.on_event(kind, handler);
        self
    }

    pub fn on_message<H>(&mut self, pattern: MessagePattern, handler: H) -> &mut Self
    where
        H: MessageHandler + 'static,
    {
        self.dispatcher.on_message(pattern, handler);
        self
    }

    pub fn handler_count(&self) -> usize {
        self.dispatcher.handler_count()
    }

    /// Connects and starts delivering events. Resolves once the connection is up.
    pub async fn start(self) -> Result<Listening, SocketError> {
        let handler_count = self.dispatcher.handler_count();
        let runner = SocketModeRunner::new(
            self.transport,
            self.dispatcher,
            self.api,
            self.reconnect_policy,
        );

        runner.connect().await?;
        info!(
            event_name = "system.app.listening",
            correlation_id = "bootstrap",
            handler_count,
            "slack app listening for events"
        );

        let task = tokio::spawn(async move { runner.run().await });
        Ok(Listening { task })
    }
}

pub struct Listening {
    task: JoinHandle<Result<(), SocketError>>,
}

impl Listening {
    /// Resolves when the event loop ends: the stream closed for good or reconnection failed.
    pub async fn closed(self) -> Result<(), SocketError> {
        match self.task.await {
            Ok(result) => result,
            Err(join_error) => Err(SocketError::Stopped(join_error.to_string())),
        }
    }
}
