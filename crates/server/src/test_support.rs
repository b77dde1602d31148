//! Fakes for exercising handlers and bootstrap without a Slack workspace.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use calmbot_slack::events::SlackEnvelope;
use calmbot_slack::web_api::{PostedMessage, SlackApi, SlackApiError};
use calmbot_slack::{SocketTransport, TransportError};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::Layer;

/// Outbound side effects in the order they happened.
#[derive(Clone, Default)]
pub struct Effects(Arc<Mutex<Vec<Effect>>>);

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Effect {
    Ack { envelope_id: String },
    Post { channel: String, text: String },
    Respond { response_url: String, text: String },
}

impl Effects {
    fn push(&self, effect: Effect) {
        self.0.lock().expect("effects lock").push(effect);
    }

    pub fn all(&self) -> Vec<Effect> {
        self.0.lock().expect("effects lock").clone()
    }
}

pub struct FakeSlackApi {
    effects: Effects,
    failure: Option<SlackApiError>,
}

impl FakeSlackApi {
    pub fn new(effects: Effects) -> Self {
        Self { effects, failure: None }
    }

    /// Every outbound call is recorded and then fails with `error`.
    pub fn failing(effects: Effects, error: SlackApiError) -> Self {
        Self { effects, failure: Some(error) }
    }

    fn outcome(&self) -> Result<(), SlackApiError> {
        match &self.failure {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl SlackApi for FakeSlackApi {
    async fn post_message(
        &self,
        channel: &str,
        text: &str,
    ) -> Result<PostedMessage, SlackApiError> {
        self.effects.push(Effect::Post { channel: channel.to_owned(), text: text.to_owned() });
        self.outcome()?;
        Ok(PostedMessage { channel: channel.to_owned(), ts: "1730000000.0100".to_owned() })
    }

    async fn respond(&self, response_url: &str, text: &str) -> Result<(), SlackApiError> {
        self.effects
            .push(Effect::Respond { response_url: response_url.to_owned(), text: text.to_owned() });
        self.outcome()
    }
}

/// Transport that replays a fixed list of envelopes and records acks.
pub struct FakeTransport {
    effects: Effects,
    envelopes: Mutex<VecDeque<SlackEnvelope>>,
    connect_calls: AtomicUsize,
}

impl FakeTransport {
    pub fn new(effects: Effects, envelopes: Vec<SlackEnvelope>) -> Self {
        Self {
            effects,
            envelopes: Mutex::new(envelopes.into()),
            connect_calls: AtomicUsize::new(0),
        }
    }

    pub fn connect_calls(&self) -> usize {
        self.connect_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SocketTransport for FakeTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn next_envelope(&self) -> Result<Option<SlackEnvelope>, TransportError> {
        Ok(self.envelopes.lock().expect("envelopes lock").pop_front())
    }

    async fn acknowledge(&self, envelope_id: &str) -> Result<(), TransportError> {
        self.effects.push(Effect::Ack { envelope_id: envelope_id.to_owned() });
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        Ok(())
    }
}

/// Counts error-level tracing events seen while installed as the default subscriber.
#[derive(Clone, Default)]
pub struct ErrorCounter(Arc<AtomicUsize>);

impl ErrorCounter {
    pub fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

impl<S: Subscriber> Layer<S> for ErrorCounter {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        if *event.metadata().level() == Level::ERROR {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }
}
