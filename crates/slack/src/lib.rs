//! Slack Integration - Socket Mode bot interface
//!
//! This crate provides the Slack side of calmbot:
//! - **Web API** (`web_api`) - `chat.postMessage`, `response_url` replies, `apps.connections.open`
//! - **Socket Mode** (`socket`, `websocket`) - event loop with reconnection over a WebSocket
//! - **Payloads** (`payload`) - raw frame parsing into envelopes
//! - **Slash Commands** (`commands`) - command payloads, triggers and acknowledgement
//! - **Events** (`events`) - mentions, messages and handler dispatch
//! - **Bot shell** (`app`) - handler registration and start
//!
//! # Getting Started
//!
//! 1. Create a Slack app at https://api.slack.com/apps
//! 2. Enable Socket Mode and subscribe to `app_mention` and `message.*` events
//! 3. Add the slash command (default `/calm`)
//! 4. Set env vars: `CALMBOT_SLACK_APP_TOKEN`, `CALMBOT_SLACK_BOT_TOKEN`
//!
//! # Architecture
//!
//! ```text
//! WebSocket frames → payload → SocketModeRunner → EventDispatcher → Handlers
//!                                    ↓                                 ↓
//!                                  ack                          SlackApi replies
//! ```
//!
//! # Key Types
//!
//! - `App` - registers handlers and starts listening
//! - `SocketModeRunner` - event loop with reconnection logic
//! - `EventDispatcher` - routes envelopes to handlers
//! - `SlackApi` - outbound messaging seam, implemented by `SlackWebClient`

pub mod app;
pub mod commands;
pub mod events;
pub mod payload;
pub mod socket;
pub mod web_api;
pub mod websocket;

#[cfg(test)]
pub(crate) mod testing;

pub use app::{App, Listening};
pub use socket::{ReconnectPolicy, SocketError, SocketTransport, TransportError};
pub use web_api::{SlackApi, SlackApiError, SlackWebClient};
pub use websocket::WebSocketTransport;
