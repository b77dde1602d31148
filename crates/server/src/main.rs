mod bootstrap;
mod handlers;
#[cfg(test)]
mod test_support;

use anyhow::Result;
use calmbot_core::config::{AppConfig, LoadOptions};
use tracing_subscriber::EnvFilter;

fn init_logging(config: &AppConfig) {
    use calmbot_core::config::LogFormat::*;

    let filter =
        EnvFilter::try_new(&config.logging.level).unwrap_or_else(|_| EnvFilter::new("info"));

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_env_filter(filter).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_env_filter(filter).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_env_filter(filter).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

async fn run() -> Result<()> {
    // Config comes first so logging honours the configured level and format.
    let config = bootstrap::load_config(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::build_app(&config);
    let listening = bootstrap::start_and_announce(app, &mut std::io::stdout()).await?;
    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        command = %config.bot.command,
        "calmbot-server started"
    );

    tokio::select! {
        closed = listening.closed() => {
            closed?;
            tracing::info!(
                event_name = "system.server.stream_closed",
                correlation_id = "shutdown",
                "slack connection closed; exiting"
            );
        }
        signal = tokio::signal::ctrl_c() => {
            signal?;
            tracing::info!(
                event_name = "system.server.stopping",
                correlation_id = "shutdown",
                "calmbot-server stopping"
            );
        }
    }

    Ok(())
}
