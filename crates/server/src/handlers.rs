//! The bot's three handlers.
//!
//! Error handling differs on purpose between them: the mention greeter logs
//! and swallows a failed post, while the command and message handlers return
//! the error to the socket runner, which logs it at warn and keeps going.

use async_trait::async_trait;
use calmbot_core::replies::{calm_reply, mention_greeting, MESSAGE_REPLY};
use calmbot_slack::commands::{CommandContext, CommandHandler};
use calmbot_slack::events::{
    CallbackEvent, EventContext, EventHandler, HandlerError, MessageContext, MessageHandler,
};
use tracing::{debug, error};

/// Acknowledges the slash command, then thanks the user who ran it.
pub struct CalmCommand;

#[async_trait]
impl CommandHandler for CalmCommand {
    async fn handle(&self, ctx: CommandContext) -> Result<(), HandlerError> {
        ctx.ack().await?;
        ctx.respond(&calm_reply(&ctx.command.user_id)).await?;
        debug!(
            event_name = "ingress.slack.command_replied",
            correlation_id = %ctx.correlation_id,
            channel_id = %ctx.command.channel_id,
            user_id = %ctx.command.user_id,
            "replied to slash command"
        );
        Ok(())
    }
}

pub struct MentionGreeter;

#[async_trait]
impl EventHandler for MentionGreeter {
    async fn handle(&self, ctx: EventContext) -> Result<(), HandlerError> {
        let CallbackEvent::AppMention(mention) = &ctx.event else {
            return Ok(());
        };

        if let Err(api_error) = ctx.say(&mention_greeting(&mention.user_id)).await {
            error!(
                event_name = "ingress.slack.mention_reply_failed",
                correlation_id = %ctx.correlation_id,
                channel_id = %mention.channel_id,
                user_id = %mention.user_id,
                error = %api_error,
                "failed to greet mentioning user"
            );
        }
        Ok(())
    }
}

pub struct MessageEcho;

#[async_trait]
impl MessageHandler for MessageEcho {
    async fn handle(&self, ctx: MessageContext) -> Result<(), HandlerError> {
        ctx.say(MESSAGE_REPLY).await?;
        Ok(())
    }
}
