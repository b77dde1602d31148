use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::{
    commands::{Acknowledger, CommandContext, CommandHandler, CommandTrigger, SlashCommandPayload},
    socket::TransportError,
    web_api::{PostedMessage, SlackApi, SlackApiError},
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SlackEnvelope {
    pub envelope_id: String,
    pub event: SlackEvent,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SlackEvent {
    SlashCommand(SlashCommandPayload),
    AppMention(MentionEvent),
    Message(MessageEvent),
    Unsupported { event_type: String },
}

impl SlackEvent {
    pub fn event_type(&self) -> SlackEventType {
        match self {
            Self::SlashCommand(_) => SlackEventType::SlashCommand,
            Self::AppMention(_) => SlackEventType::AppMention,
            Self::Message(_) => SlackEventType::Message,
            Self::Unsupported { .. } => SlackEventType::Unsupported,
        }
    }

    pub fn channel_id(&self) -> Option<&str> {
        match self {
            Self::SlashCommand(payload) => Some(&payload.channel_id),
            Self::AppMention(event) => Some(&event.channel_id),
            Self::Message(event) => Some(&event.channel_id),
            Self::Unsupported { .. } => None,
        }
    }

    pub fn user_id(&self) -> Option<&str> {
        match self {
            Self::SlashCommand(payload) => Some(&payload.user_id),
            Self::AppMention(event) => Some(&event.user_id),
            Self::Message(event) => event.user_id.as_deref(),
            Self::Unsupported { .. } => None,
        }
    }

    /// Slash commands are acked by their handler; everything else is acked on receipt.
    pub fn defers_acknowledgement(&self) -> bool {
        matches!(self, Self::SlashCommand(_))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SlackEventType {
    SlashCommand,
    AppMention,
    Message,
    Unsupported,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct MentionEvent {
    #[serde(rename = "channel")]
    pub channel_id: String,
    #[serde(rename = "user")]
    pub user_id: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub ts: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct MessageEvent {
    #[serde(rename = "channel")]
    pub channel_id: String,
    #[serde(default, rename = "user")]
    pub user_id: Option<String>,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub ts: String,
    #[serde(default)]
    pub bot_id: Option<String>,
    #[serde(default)]
    pub subtype: Option<String>,
    #[serde(default)]
    pub channel_type: Option<String>,
}

impl MessageEvent {
    pub fn is_from_bot(&self) -> bool {
        self.bot_id.is_some() || self.subtype.as_deref() == Some("bot_message")
    }

    /// Edits, deletions and thread bookkeeping that Slack generates about an
    /// earlier message. People-authored subtypes such as `file_share`,
    /// `thread_broadcast` and `me_message` are not housekeeping.
    pub fn is_housekeeping(&self) -> bool {
        matches!(
            self.subtype.as_deref(),
            Some("message_changed" | "message_deleted" | "message_replied")
        )
    }
}

/// Events API event kinds a handler can subscribe to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    AppMention,
    Message,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CallbackEvent {
    AppMention(MentionEvent),
    Message(MessageEvent),
}

impl CallbackEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::AppMention(_) => EventKind::AppMention,
            Self::Message(_) => EventKind::Message,
        }
    }

    pub fn channel_id(&self) -> &str {
        match self {
            Self::AppMention(event) => &event.channel_id,
            Self::Message(event) => &event.channel_id,
        }
    }
}

/// Decides which messages a message handler sees.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MessagePattern {
    /// Every message, including ones with empty text.
    Any,
    /// Messages whose text contains the given substring.
    Contains(String),
}

impl MessagePattern {
    pub fn contains(text: impl Into<String>) -> Self {
        Self::Contains(text.into())
    }

    pub fn matches(&self, text: &str) -> bool {
        match self {
            Self::Any => true,
            Self::Contains(needle) => text.contains(needle.as_str()),
        }
    }
}

#[derive(Clone)]
pub struct EventContext {
    pub event: CallbackEvent,
    pub api: Arc<dyn SlackApi>,
    pub correlation_id: String,
}

impl EventContext {
    /// Posts `text` to the channel the event happened in.
    pub async fn say(&self, text: &str) -> Result<PostedMessage, SlackApiError> {
        self.api.post_message(self.event.channel_id(), text).await
    }
}

#[derive(Clone)]
pub struct MessageContext {
    pub message: MessageEvent,
    pub api: Arc<dyn SlackApi>,
    pub correlation_id: String,
}

impl MessageContext {
    /// Posts `text` to the channel the message came from.
    pub async fn say(&self, text: &str) -> Result<PostedMessage, SlackApiError> {
        self.api.post_message(&self.message.channel_id, text).await
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HandlerResult {
    Handled(usize),
    Ignored,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum HandlerError {
    #[error(transparent)]
    Api(#[from] SlackApiError),
    #[error(transparent)]
    Acknowledge(#[from] TransportError),
    #[error("handler failure: {0}")]
    Failed(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error(transparent)]
    Handler(#[from] HandlerError),
}

#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, ctx: EventContext) -> Result<(), HandlerError>;
}

#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, ctx: MessageContext) -> Result<(), HandlerError>;
}

/// What a single dispatch hands to handlers besides the event itself.
#[derive(Clone)]
pub struct DispatchContext {
    pub api: Arc<dyn SlackApi>,
    pub ack: Acknowledger,
    pub correlation_id: String,
}

#[derive(Default)]
pub struct EventDispatcher {
    commands: Vec<(CommandTrigger, Arc<dyn CommandHandler>)>,
    events: Vec<(EventKind, Arc<dyn EventHandler>)>,
    messages: Vec<(MessagePattern, Arc<dyn MessageHandler>)>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_command<H>(&mut self, trigger: impl Into<CommandTrigger>, handler: H) -> &mut Self
    where
        H: CommandHandler + 'static,
    {
        self.commands.push((trigger.into(), Arc::new(handler)));
        self
    }

    pub fn on_event<H>(&mut self, kind: EventKind, handler: H) -> &mut Self
    where
        H: EventHandler + 'static,
    {
        self.events.push((kind, Arc::new(handler)));
        self
    }

    pub fn on_message<H>(&mut self, pattern: MessagePattern, handler: H) -> &mut Self
    where
        H: MessageHandler + 'static,
    {
        self.messages.push((pattern, Arc::new(handler)));
        self
    }

    pub fn handler_count(&self) -> usize {
        self.commands.len() + self.events.len() + self.messages.len()
    }

    /// Runs every handler registered for the envelope's event, in registration order.
    /// The first handler error stops the remaining handlers for this envelope.
    pub async fn dispatch(
        &self,
        envelope: &SlackEnvelope,
        ctx: &DispatchContext,
    ) -> Result<HandlerResult, DispatchError> {
        let handled = match &envelope.event {
            SlackEvent::SlashCommand(payload) => self.dispatch_command(payload, ctx).await?,
            SlackEvent::AppMention(event) => {
                self.dispatch_callback(CallbackEvent::AppMention(event.clone()), ctx).await?
            }
            SlackEvent::Message(event) => {
                if event.is_from_bot() {
                    debug!(
                        correlation_id = %ctx.correlation_id,
                        channel_id = %event.channel_id,
                        "skipping bot-authored message"
                    );
                    return Ok(HandlerResult::Ignored);
                }

                let mut handled =
                    self.dispatch_callback(CallbackEvent::Message(event.clone()), ctx).await?;
                if !event.is_housekeeping() {
                    handled += self.dispatch_message(event, ctx).await?;
                }
                handled
            }
            SlackEvent::Unsupported { .. } => 0,
        };

        Ok(if handled == 0 { HandlerResult::Ignored } else { HandlerResult::Handled(handled) })
    }

    async fn dispatch_command(
        &self,
        payload: &SlashCommandPayload,
        ctx: &DispatchContext,
    ) -> Result<usize, HandlerError> {
        let mut handled = 0;
        for (trigger, handler) in &self.commands {
            if !trigger.matches(&payload.command) {
                continue;
            }
            handler
                .handle(CommandContext {
                    command: payload.clone(),
                    ack: ctx.ack.clone(),
                    api: Arc::clone(&ctx.api),
                    correlation_id: ctx.correlation_id.clone(),
                })
                .await?;
            handled += 1;
        }
        Ok(handled)
    }

    async fn dispatch_callback(
        &self,
        event: CallbackEvent,
        ctx: &DispatchContext,
    ) -> Result<usize, HandlerError> {
        let mut handled = 0;
        for (kind, handler) in &self.events {
            if *kind != event.kind() {
                continue;
            }
            handler
                .handle(EventContext {
                    event: event.clone(),
                    api: Arc::clone(&ctx.api),
                    correlation_id: ctx.correlation_id.clone(),
                })
                .await?;
            handled += 1;
        }
        Ok(handled)
    }

    async fn dispatch_message(
        &self,
        message: &MessageEvent,
        ctx: &DispatchContext,
    ) -> Result<usize, HandlerError> {
        let mut handled = 0;
        for (pattern, handler) in &self.messages {
            if !pattern.matches(&message.text) {
                continue;
            }
            handler
                .handle(MessageContext {
                    message: message.clone(),
                    api: Arc::clone(&ctx.api),
                    correlation_id: ctx.correlation_id.clone(),
                })
                .await?;
            handled += 1;
        }
        Ok(handled)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;

    use super::{
        CallbackEvent, DispatchContext, DispatchError, EventContext, EventDispatcher, EventHandler,
        EventKind, HandlerError, HandlerResult, MentionEvent, MessageContext, MessageEvent,
        MessageHandler, MessagePattern, SlackEnvelope, SlackEvent,
    };
    use crate::commands::{Acknowledger, CommandContext, CommandHandler, SlashCommandPayload};
    use crate::testing::{RecordingSlackApi, ScriptedTransport};

    #[derive(Default, Clone)]
    struct Seen(Arc<Mutex<Vec<String>>>);

    impl Seen {
        fn push(&self, entry: impl Into<String>) {
            self.0.lock().expect("seen lock").push(entry.into());
        }

        fn entries(&self) -> Vec<String> {
            self.0.lock().expect("seen lock").clone()
        }
    }

    struct RecordCommand(Seen);

    #[async_trait]
    impl CommandHandler for RecordCommand {
        async fn handle(&self, ctx: CommandContext) -> Result<(), HandlerError> {
            self.0.push(format!("command:{}", ctx.command.user_id));
            Ok(())
        }
    }

    struct RecordEvent(Seen);

    #[async_trait]
    impl EventHandler for RecordEvent {
        async fn handle(&self, ctx: EventContext) -> Result<(), HandlerError> {
            let label = match &ctx.event {
                CallbackEvent::AppMention(event) => format!("mention:{}", event.user_id),
                CallbackEvent::Message(event) => format!("event-message:{}", event.text),
            };
            self.0.push(label);
            Ok(())
        }
    }

    struct RecordMessage(Seen);

    #[async_trait]
    impl MessageHandler for RecordMessage {
        async fn handle(&self, ctx: MessageContext) -> Result<(), HandlerError> {
            self.0.push(format!("message:{}", ctx.message.text));
            Ok(())
        }
    }

    struct FailingMessage;

    #[async_trait]
    impl MessageHandler for FailingMessage {
        async fn handle(&self, _ctx: MessageContext) -> Result<(), HandlerError> {
            Err(HandlerError::Failed("boom".to_owned()))
        }
    }

    fn context() -> DispatchContext {
        DispatchContext {
            api: Arc::new(RecordingSlackApi::default()),
            ack: Acknowledger::new("env-test", Arc::new(ScriptedTransport::default())),
            correlation_id: "env-test".to_owned(),
        }
    }

    fn envelope(event: SlackEvent) -> SlackEnvelope {
        SlackEnvelope { envelope_id: "env-test".to_owned(), event }
    }

    fn command(name: &str) -> SlackEvent {
        SlackEvent::SlashCommand(SlashCommandPayload {
            command: name.to_owned(),
            text: String::new(),
            user_id: "U1".to_owned(),
            user_name: "ada".to_owned(),
            channel_id: "C1".to_owned(),
            response_url: String::new(),
            trigger_id: String::new(),
        })
    }

    fn message(text: &str) -> MessageEvent {
        MessageEvent {
            channel_id: "D1".to_owned(),
            user_id: Some("U2".to_owned()),
            text: text.to_owned(),
            ts: "1730000000.0001".to_owned(),
            bot_id: None,
            subtype: None,
            channel_type: Some("im".to_owned()),
        }
    }

    fn full_dispatcher(seen: &Seen) -> EventDispatcher {
        let mut dispatcher = EventDispatcher::new();
        dispatcher
            .on_command("/calm", RecordCommand(seen.clone()))
            .on_event(EventKind::AppMention, RecordEvent(seen.clone()))
            .on_message(MessagePattern::Any, RecordMessage(seen.clone()));
        dispatcher
    }

    #[tokio::test]
    async fn routes_matching_slash_command() {
        let seen = Seen::default();
        let dispatcher = full_dispatcher(&seen);

        let result =
            dispatcher.dispatch(&envelope(command("/calm")), &context()).await.expect("dispatch");

        assert_eq!(result, HandlerResult::Handled(1));
        assert_eq!(seen.entries(), vec!["command:U1"]);
    }

    #[tokio::test]
    async fn unknown_slash_command_is_ignored() {
        let seen = Seen::default();
        let dispatcher = full_dispatcher(&seen);

        let result =
            dispatcher.dispatch(&envelope(command("/panic")), &context()).await.expect("dispatch");

        assert_eq!(result, HandlerResult::Ignored);
        assert!(seen.entries().is_empty());
    }

    #[tokio::test]
    async fn routes_mentions_to_event_handlers_only() {
        let seen = Seen::default();
        let dispatcher = full_dispatcher(&seen);
        let mention = SlackEvent::AppMention(MentionEvent {
            channel_id: "C1".to_owned(),
            user_id: "U3".to_owned(),
            text: "<@B1> hi".to_owned(),
            ts: "1730000000.0002".to_owned(),
        });

        let result = dispatcher.dispatch(&envelope(mention), &context()).await.expect("dispatch");

        assert_eq!(result, HandlerResult::Handled(1));
        assert_eq!(seen.entries(), vec!["mention:U3"]);
    }

    #[tokio::test]
    async fn catch_all_pattern_matches_empty_text() {
        let seen = Seen::default();
        let dispatcher = full_dispatcher(&seen);

        dispatcher
            .dispatch(&envelope(SlackEvent::Message(message(""))), &context())
            .await
            .expect("dispatch");

        assert_eq!(seen.entries(), vec!["message:"]);
    }

    #[tokio::test]
    async fn message_event_handlers_run_before_message_handlers() {
        let seen = Seen::default();
        let mut dispatcher = full_dispatcher(&seen);
        dispatcher.on_event(EventKind::Message, RecordEvent(seen.clone()));

        let result = dispatcher
            .dispatch(&envelope(SlackEvent::Message(message("hey"))), &context())
            .await
            .expect("dispatch");

        assert_eq!(result, HandlerResult::Handled(2));
        assert_eq!(seen.entries(), vec!["event-message:hey", "message:hey"]);
    }

    #[tokio::test]
    async fn bot_messages_are_never_delivered() {
        let seen = Seen::default();
        let dispatcher = full_dispatcher(&seen);
        let mut from_bot = message("Haha, yeah.");
        from_bot.bot_id = Some("B1".to_owned());

        let result = dispatcher
            .dispatch(&envelope(SlackEvent::Message(from_bot)), &context())
            .await
            .expect("dispatch");

        assert_eq!(result, HandlerResult::Ignored);
        assert!(seen.entries().is_empty());
    }

    #[tokio::test]
    async fn housekeeping_subtypes_skip_message_handlers() {
        let seen = Seen::default();
        let dispatcher = full_dispatcher(&seen);

        for subtype in ["message_changed", "message_deleted", "message_replied"] {
            let mut housekeeping = message("edited text");
            housekeeping.subtype = Some(subtype.to_owned());

            let result = dispatcher
                .dispatch(&envelope(SlackEvent::Message(housekeeping)), &context())
                .await
                .expect("dispatch");

            assert_eq!(result, HandlerResult::Ignored, "subtype {subtype}");
        }
        assert!(seen.entries().is_empty());
    }

    #[tokio::test]
    async fn person_authored_subtypes_reach_message_handlers() {
        let seen = Seen::default();
        let dispatcher = full_dispatcher(&seen);

        for subtype in ["file_share", "thread_broadcast", "me_message"] {
            let mut authored = message(subtype);
            authored.subtype = Some(subtype.to_owned());

            let result = dispatcher
                .dispatch(&envelope(SlackEvent::Message(authored)), &context())
                .await
                .expect("dispatch");

            assert_eq!(result, HandlerResult::Handled(1), "subtype {subtype}");
        }
        assert_eq!(
            seen.entries(),
            vec!["message:file_share", "message:thread_broadcast", "message:me_message"]
        );
    }

    #[tokio::test]
    async fn contains_pattern_filters_messages() {
        let seen = Seen::default();
        let mut dispatcher = EventDispatcher::new();
        dispatcher.on_message(MessagePattern::contains("hello"), RecordMessage(seen.clone()));

        dispatcher
            .dispatch(&envelope(SlackEvent::Message(message("goodbye"))), &context())
            .await
            .expect("dispatch");
        dispatcher
            .dispatch(&envelope(SlackEvent::Message(message("well hello there"))), &context())
            .await
            .expect("dispatch");

        assert_eq!(seen.entries(), vec!["message:well hello there"]);
    }

    #[tokio::test]
    async fn handler_errors_surface_as_dispatch_errors() {
        let mut dispatcher = EventDispatcher::new();
        dispatcher.on_message(MessagePattern::Any, FailingMessage);

        let result =
            dispatcher.dispatch(&envelope(SlackEvent::Message(message("x"))), &context()).await;

        assert_eq!(
            result,
            Err(DispatchError::Handler(HandlerError::Failed("boom".to_owned())))
        );
    }

    #[tokio::test]
    async fn unsupported_events_are_ignored() {
        let seen = Seen::default();
        let dispatcher = full_dispatcher(&seen);

        let result = dispatcher
            .dispatch(
                &envelope(SlackEvent::Unsupported { event_type: "interactive".to_owned() }),
                &context(),
            )
            .await
            .expect("dispatch");

        assert_eq!(result, HandlerResult::Ignored);
    }

    #[test]
    fn registration_counts_every_handler() {
        let seen = Seen::default();
        assert_eq!(full_dispatcher(&seen).handler_count(), 3);
    }

    #[test]
    fn only_slash_commands_defer_acknowledgement() {
        assert!(command("/calm").defers_acknowledgement());
        assert!(!SlackEvent::Message(message("x")).defers_acknowledgement());
    }
}
