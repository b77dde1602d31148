use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use thiserror::Error;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::commands::Acknowledger;
use crate::events::{DispatchContext, EventDispatcher, HandlerResult, SlackEnvelope};
use crate::web_api::SlackApi;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("transport failed to connect: {0}")]
    Connect(String),
    #[error("transport read failed: {0}")]
    Receive(String),
    #[error("transport ack failed: {0}")]
    Acknowledge(String),
    #[error("transport disconnect failed: {0}")]
    Disconnect(String),
}

#[derive(Debug, Error)]
pub enum SocketError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("socket mode listener stopped unexpectedly: {0}")]
    Stopped(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self { max_retries: 5, base_delay_ms: 250, max_delay_ms: 5_000 }
    }
}

impl ReconnectPolicy {
    fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(16);
        let multiplier = 1_u64 << exponent;
        let delay_ms = self.base_delay_ms.saturating_mul(multiplier).min(self.max_delay_ms);
        Duration::from_millis(delay_ms)
    }
}

#[async_trait]
pub trait SocketTransport: Send + Sync {
    async fn connect(&self) -> Result<(), TransportError>;
    /// `Ok(None)` means the stream is closed for good and will not be reconnected.
    async fn next_envelope(&self) -> Result<Option<SlackEnvelope>, TransportError>;
    async fn acknowledge(&self, envelope_id: &str) -> Result<(), TransportError>;
    async fn disconnect(&self) -> Result<(), TransportError>;
}

pub struct SocketModeRunner {
    transport: Arc<dyn SocketTransport>,
    dispatcher: Arc<EventDispatcher>,
    api: Arc<dyn SlackApi>,
    reconnect_policy: ReconnectPolicy,
}

impl SocketModeRunner {
    pub fn new(
        transport: Arc<dyn SocketTransport>,
        dispatcher: EventDispatcher,
        api: Arc<dyn SlackApi>,
        reconnect_policy: ReconnectPolicy,
    ) -> Self {
        Self { transport, dispatcher: Arc::new(dispatcher), api, reconnect_policy }
    }

    /// Opens the transport, retrying with exponential backoff until the policy is exhausted.
    pub async fn connect(&self) -> Result<(), SocketError> {
        let mut attempt = 0;
        loop {
            info!(attempt, "opening socket mode transport connection");
            match self.transport.connect().await {
                Ok(()) => {
                    info!(attempt, "socket mode transport connected");
                    return Ok(());
                }
                Err(transport_error) => {
                    warn!(
                        attempt,
                        max_retries = self.reconnect_policy.max_retries,
                        error = %transport_error,
                        "socket mode transport failed"
                    );

                    if attempt >= self.reconnect_policy.max_retries {
                        warn!(
                            max_retries = self.reconnect_policy.max_retries,
                            "socket mode retries exhausted"
                        );
                        return Err(transport_error.into());
                    }

                    let delay = self.reconnect_policy.backoff(attempt);
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    attempt += 1;
                }
            }
        }
    }

    /// Pumps envelopes from an already connected transport until the stream closes
    /// for good or reconnection fails. In-flight handlers finish before this returns.
    pub async fn run(&self) -> Result<(), SocketError> {
        let mut tasks = JoinSet::new();

        let outcome = loop {
            match self.pump(&mut tasks).await {
                Ok(()) => break Ok(()),
                Err(transport_error) => {
                    warn!(error = %transport_error, "socket mode stream interrupted; reconnecting");
                    if let Err(error) = self.connect().await {
                        break Err(error);
                    }
                }
            }
        };

        while let Some(joined) = tasks.join_next().await {
            if let Err(join_error) = joined {
                warn!(error = %join_error, "event handler task panicked or was cancelled");
            }
        }

        outcome
    }

    async fn pump(&self, tasks: &mut JoinSet<()>) -> Result<(), TransportError> {
        loop {
            while let Some(joined) = tasks.try_join_next() {
                if let Err(join_error) = joined {
                    warn!(error = %join_error, "event handler task panicked or was cancelled");
                }
            }

            let Some(envelope) = self.transport.next_envelope().await? else {
                info!("socket mode transport stream closed");
                self.transport.disconnect().await?;
                return Ok(());
            };
            let (channel_id, user_id) = routing_fields(&envelope);

            info!(
                event_name = "ingress.slack.envelope_received",
                envelope_id = %envelope.envelope_id,
                event_type = ?envelope.event.event_type(),
                correlation_id = %envelope.envelope_id,
                channel_id = channel_id.unwrap_or("unknown"),
                user_id = user_id.unwrap_or("unknown"),
                "received slack envelope"
            );

            let ack = Acknowledger::new(envelope.envelope_id.clone(), Arc::clone(&self.transport));
            if !envelope.event.defers_acknowledgement() {
                acknowledge(&ack).await;
            }

            let dispatcher = Arc::clone(&self.dispatcher);
            let context = DispatchContext {
                api: Arc::clone(&self.api),
                ack,
                correlation_id: envelope.envelope_id.clone(),
            };
            tasks.spawn(async move {
                let result = dispatcher.dispatch(&envelope, &context).await;
                match &result {
                    Ok(outcome) => debug!(
                        envelope_id = %envelope.envelope_id,
                        correlation_id = %context.correlation_id,
                        outcome = ?outcome,
                        "slack envelope dispatched"
                    ),
                    Err(error) => warn!(
                        envelope_id = %envelope.envelope_id,
                        correlation_id = %context.correlation_id,
                        error = %error,
                        "event dispatch failed; continuing socket loop"
                    ),
                }

                if !context.ack.is_sent().await {
                    if matches!(result, Ok(HandlerResult::Handled(_))) {
                        warn!(
                            envelope_id = %envelope.envelope_id,
                            correlation_id = %context.correlation_id,
                            "handler returned without acknowledging; acknowledging on its behalf"
                        );
                    }
                    acknowledge(&context.ack).await;
                }
            });
        }
    }
}

async fn acknowledge(ack: &Acknowledger) {
    if let Err(error) = ack.ack().await {
        warn!(
            event_name = "ingress.slack.ack_sent",
            envelope_id = %ack.envelope_id(),
            correlation_id = %ack.envelope_id(),
            error = %error,
            "failed to acknowledge slack envelope"
        );
    } else {
        debug!(
            event_name = "ingress.slack.ack_sent",
            envelope_id = %ack.envelope_id(),
            correlation_id = %ack.envelope_id(),
            "acknowledged slack envelope"
        );
    }
}

fn routing_fields(envelope: &SlackEnvelope) -> (Option<&str>, Option<&str>) {
    (envelope.event.channel_id(), envelope.event.user_id())
}
