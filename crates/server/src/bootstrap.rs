use std::io::Write;
use std::sync::Arc;

use calmbot_core::config::{AppConfig, ConfigError, LoadOptions};
use calmbot_core::replies::READY_LINE;
use calmbot_slack::events::{EventKind, MessagePattern};
use calmbot_slack::{
    App, Listening, ReconnectPolicy, SlackWebClient, SocketError, WebSocketTransport,
};
use thiserror::Error;
use tracing::info;

use crate::handlers::{CalmCommand, MentionGreeter, MessageEcho};

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Socket(#[from] SocketError),
    #[error("failed to write readiness line: {0}")]
    Io(#[from] std::io::Error),
}

pub fn load_config(options: LoadOptions) -> Result<AppConfig, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );
    Ok(AppConfig::load(options)?)
}

/// Wires the Slack clients from config and registers the bot's handlers.
pub fn build_app(config: &AppConfig) -> App {
    let web = SlackWebClient::with_base_url(
        config.slack.bot_token.clone(),
        config.slack.api_base_url.clone(),
    );
    let transport = WebSocketTransport::new(web.clone(), config.slack.app_token.clone());
    let policy = ReconnectPolicy {
        max_retries: config.socket.max_retries,
        base_delay_ms: config.socket.base_delay_ms,
        max_delay_ms: config.socket.max_delay_ms,
    };

    let mut app = App::new(Arc::new(web), Arc::new(transport)).with_reconnect_policy(policy);
    register_handlers(&mut app, &config.bot.command);
    info!(
        event_name = "system.bootstrap.handlers_registered",
        correlation_id = "bootstrap",
        command = %config.bot.command,
        handler_count = app.handler_count(),
        "slack handlers registered"
    );
    app
}

pub fn register_handlers(app: &mut App, command: &str) {
    app.on_command(command, CalmCommand)
        .on_event(EventKind::AppMention, MentionGreeter)
        .on_message(MessagePattern::Any, MessageEcho);
}

/// Starts the app and prints the readiness line once the connection is up.
pub async fn start_and_announce<W: Write>(
    app: App,
    out: &mut W,
) -> Result<Listening, BootstrapError> {
    let listening = app.start().await?;
    writeln!(out, "{READY_LINE}")?;
    out.flush()?;
    Ok(listening)
}
