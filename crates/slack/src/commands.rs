use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::debug;

use crate::events::HandlerError;
use crate::socket::{SocketTransport, TransportError};
use crate::web_api::{SlackApi, SlackApiError};

/// Slash command payload as delivered inside a `slash_commands` envelope.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct SlashCommandPayload {
    pub command: String,
    #[serde(default)]
    pub text: String,
    pub user_id: String,
    #[serde(default)]
    pub user_name: String,
    pub channel_id: String,
    #[serde(default)]
    pub response_url: String,
    #[serde(default)]
    pub trigger_id: String,
}

/// Normalized slash command name. `/calm`, `calm` and `/CALM` are the same trigger.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CommandTrigger(String);

impl CommandTrigger {
    pub fn new(command: &str) -> Self {
        Self(normalize_command_name(command))
    }

    pub fn matches(&self, command: &str) -> bool {
        self.0 == normalize_command_name(command)
    }
}

impl From<&str> for CommandTrigger {
    fn from(command: &str) -> Self {
        Self::new(command)
    }
}

impl From<String> for CommandTrigger {
    fn from(command: String) -> Self {
        Self::new(&command)
    }
}

impl fmt::Display for CommandTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.0)
    }
}

fn normalize_command_name(command: &str) -> String {
    command.trim().trim_start_matches('/').to_ascii_lowercase()
}

/// One-shot acknowledgement for a single envelope.
///
/// Clones share the same sent flag. A clone that acks while another clone's
/// send is in flight waits for that send and only returns `Ok` once the ack
/// is on the wire; if the first send failed it tries again itself.
#[derive(Clone)]
pub struct Acknowledger {
    envelope_id: String,
    transport: Arc<dyn SocketTransport>,
    sent: Arc<Mutex<bool>>,
}

impl Acknowledger {
    pub fn new(envelope_id: impl Into<String>, transport: Arc<dyn SocketTransport>) -> Self {
        Self { envelope_id: envelope_id.into(), transport, sent: Arc::new(Mutex::new(false)) }
    }

    pub fn envelope_id(&self) -> &str {
        &self.envelope_id
    }

    pub async fn is_sent(&self) -> bool {
        *self.sent.lock().await
    }

    pub async fn ack(&self) -> Result<(), TransportError> {
        // Held across the send so concurrent callers see its outcome.
        let mut sent = self.sent.lock().await;
        if *sent {
            debug!(envelope_id = %self.envelope_id, "envelope already acknowledged");
            return Ok(());
        }

        self.transport.acknowledge(&self.envelope_id).await?;
        *sent = true;
        Ok(())
    }
}

impl fmt::Debug for Acknowledger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Acknowledger")
            .field("envelope_id", &self.envelope_id)
            .field("sent", &self.sent.try_lock().map(|sent| *sent).ok())
            .finish_non_exhaustive()
    }
}

/// Everything a command handler needs for one invocation.
#[derive(Clone)]
pub struct CommandContext {
    pub command: SlashCommandPayload,
    pub ack: Acknowledger,
    pub api: Arc<dyn SlackApi>,
    pub correlation_id: String,
}

impl CommandContext {
    pub async fn ack(&self) -> Result<(), TransportError> {
        self.ack.ack().await
    }

    /// Replies to the invoking user on the channel the command came from.
    ///
    /// Uses the command's `response_url` when Slack supplied one and falls back
    /// to posting into `channel_id`.
    pub async fn respond(&self, text: &str) -> Result<(), SlackApiError> {
        if self.command.response_url.trim().is_empty() {
            self.api.post_message(&self.command.channel_id, text).await.map(|_| ())
        } else {
            self.api.respond(&self.command.response_url, text).await
        }
    }
}

#[async_trait]
pub trait CommandHandler: Send + Sync {
    async fn handle(&self, ctx: CommandContext) -> Result<(), HandlerError>;
}
