//! Parsing of raw Socket Mode frames into [`SlackEnvelope`]s.
//!
//! Slack sends JSON text frames with a `type` field. `hello` and `disconnect`
//! are connection-control frames; `slash_commands`, `events_api` and
//! `interactive` carry an `envelope_id` that must be acknowledged.

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::commands::SlashCommandPayload;
use crate::events::{MentionEvent, MessageEvent, SlackEnvelope, SlackEvent};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SocketFrame {
    Hello,
    Disconnect { reason: Option<String> },
    Envelope(SlackEnvelope),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum PayloadError {
    #[error("malformed socket frame: {0}")]
    Frame(String),
}

/// An envelope whose id is known but whose payload does not deserialize.
#[derive(Debug)]
struct MalformedPayload {
    kind: &'static str,
    message: String,
}

#[derive(Debug, Deserialize)]
struct RawSocketFrame {
    #[serde(rename = "type")]
    frame_type: String,
    #[serde(default)]
    envelope_id: Option<String>,
    #[serde(default)]
    payload: Option<serde_json::Value>,
    #[serde(default)]
    reason: Option<String>,
}

/// Parses one text frame. Returns `Ok(None)` for frames that carry nothing to
/// act on, such as unknown frame types or envelopes without an id.
///
/// An envelope with an id always comes back as an envelope so it gets acked;
/// a payload that fails to deserialize becomes `SlackEvent::Unsupported`.
pub fn parse_socket_frame(text: &str) -> Result<Option<SocketFrame>, PayloadError> {
    let raw: RawSocketFrame =
        serde_json::from_str(text).map_err(|error| PayloadError::Frame(error.to_string()))?;

    match raw.frame_type.as_str() {
        "hello" => Ok(Some(SocketFrame::Hello)),
        "disconnect" => Ok(Some(SocketFrame::Disconnect { reason: raw.reason })),
        "slash_commands" | "events_api" | "interactive" => {
            let Some(envelope_id) = raw.envelope_id else {
                warn!(frame_type = %raw.frame_type, "envelope missing envelope_id, skipping");
                return Ok(None);
            };
            let payload = raw.payload.unwrap_or(serde_json::Value::Null);
            let event = parse_event(&raw.frame_type, payload).unwrap_or_else(|malformed| {
                warn!(
                    envelope_id = %envelope_id,
                    kind = malformed.kind,
                    error = %malformed.message,
                    "malformed envelope payload; treating as unsupported"
                );
                SlackEvent::Unsupported { event_type: malformed.kind.to_owned() }
            });
            debug!(envelope_id = %envelope_id, event_type = ?event.event_type(), "parsed envelope");
            Ok(Some(SocketFrame::Envelope(SlackEnvelope { envelope_id, event })))
        }
        other => {
            warn!(frame_type = other, "unknown socket mode frame type");
            Ok(None)
        }
    }
}

fn parse_event(
    frame_type: &str,
    payload: serde_json::Value,
) -> Result<SlackEvent, MalformedPayload> {
    match frame_type {
        "slash_commands" => serde_json::from_value::<SlashCommandPayload>(payload)
            .map(SlackEvent::SlashCommand)
            .map_err(|error| MalformedPayload {
                kind: "slash_commands",
                message: error.to_string(),
            }),
        "events_api" => parse_events_api(payload),
        other => Ok(SlackEvent::Unsupported { event_type: other.to_owned() }),
    }
}

fn parse_events_api(payload: serde_json::Value) -> Result<SlackEvent, MalformedPayload> {
    let Some(event) = payload.get("event") else {
        return Err(MalformedPayload {
            kind: "events_api",
            message: "missing `event` object".to_owned(),
        });
    };
    let event_type = event.get("type").and_then(serde_json::Value::as_str).unwrap_or("unknown");

    match event_type {
        "app_mention" => serde_json::from_value::<MentionEvent>(event.clone())
            .map(SlackEvent::AppMention)
            .map_err(|error| MalformedPayload {
                kind: "app_mention",
                message: error.to_string(),
            }),
        "message" => serde_json::from_value::<MessageEvent>(event.clone())
            .map(SlackEvent::Message)
            .map_err(|error| MalformedPayload { kind: "message", message: error.to_string() }),
        other => Ok(SlackEvent::Unsupported { event_type: other.to_owned() }),
    }
}
