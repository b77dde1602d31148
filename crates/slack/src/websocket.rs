//! Socket Mode transport over a real WebSocket.
//!
//! [`WebSocketTransport`] asks Slack for a fresh WebSocket URL with the
//! app-level token (`apps.connections.open`), connects, and then turns text
//! frames into envelopes. Read and write halves sit behind separate locks so
//! handler tasks can acknowledge while the runner is blocked on the next read.

use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use secrecy::SecretString;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::events::SlackEnvelope;
use crate::payload::{parse_socket_frame, SocketFrame};
use crate::socket::{SocketTransport, TransportError};
use crate::web_api::SlackWebClient;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub struct WebSocketTransport {
    web: SlackWebClient,
    app_token: SecretString,
    reader: Mutex<Option<SplitStream<WsStream>>>,
    writer: Mutex<Option<SplitSink<WsStream, WsMessage>>>,
}

impl WebSocketTransport {
    pub fn new(web: SlackWebClient, app_token: SecretString) -> Self {
        Self { web, app_token, reader: Mutex::new(None), writer: Mutex::new(None) }
    }

    async fn send(&self, message: WsMessage) -> Result<(), String> {
        let mut writer = self.writer.lock().await;
        let Some(sink) = writer.as_mut() else {
            return Err("websocket is not connected".to_owned());
        };
        sink.send(message).await.map_err(|error| error.to_string())
    }
}

#[async_trait]
impl SocketTransport for WebSocketTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        let url = self
            .web
            .open_connection(&self.app_token)
            .await
            .map_err(|error| TransportError::Connect(error.to_string()))?;
        debug!("obtained socket mode websocket url");

        let (stream, _response): (WsStream, _) =
            connect_async(url.as_str()).await.map_err(|error| {
                TransportError::Connect(format!("websocket connect failed: {error}"))
            })?;
        let (sink, source) = stream.split();

        *self.writer.lock().await = Some(sink);
        *self.reader.lock().await = Some(source);
        info!("websocket connected to slack socket mode");
        Ok(())
    }

    async fn next_envelope(&self) -> Result<Option<SlackEnvelope>, TransportError> {
        let mut reader = self.reader.lock().await;
        let Some(source) = reader.as_mut() else {
            return Err(TransportError::Receive("websocket is not connected".to_owned()));
        };

        loop {
            let Some(message) = source.next().await else {
                return Err(TransportError::Receive("websocket stream ended".to_owned()));
            };
            let message = message.map_err(|error| TransportError::Receive(error.to_string()))?;

            match message {
                WsMessage::Text(text) => match parse_socket_frame(&text) {
                    Ok(Some(SocketFrame::Envelope(envelope))) => return Ok(Some(envelope)),
                    Ok(Some(SocketFrame::Hello)) => {
                        info!("received hello from slack; connection established");
                    }
                    Ok(Some(SocketFrame::Disconnect { reason })) => {
                        let reason = reason.unwrap_or_else(|| "unspecified".to_owned());
                        info!(reason = %reason, "slack requested disconnect");
                        return Err(TransportError::Receive(format!(
                            "slack requested disconnect: {reason}"
                        )));
                    }
                    Ok(None) => {}
                    Err(error) => {
                        warn!(error = %error, "dropping unparseable socket mode frame");
                    }
                },
                WsMessage::Close(frame) => {
                    info!(frame = ?frame, "received websocket close frame");
                    return Err(TransportError::Receive("websocket closed by peer".to_owned()));
                }
                // tungstenite queues the pong for pings and flushes it on the next read.
                _ => {}
            }
        }
    }

    async fn acknowledge(&self, envelope_id: &str) -> Result<(), TransportError> {
        let ack = ack_frame(envelope_id);
        self.send(WsMessage::Text(ack.to_string())).await.map_err(TransportError::Acknowledge)
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        let sink = self.writer.lock().await.take();
        self.reader.lock().await.take();

        if let Some(mut sink) = sink {
            sink.close().await.map_err(|error| TransportError::Disconnect(error.to_string()))?;
        }
        Ok(())
    }
}

fn ack_frame(envelope_id: &str) -> serde_json::Value {
    serde_json::json!({ "envelope_id": envelope_id })
}
