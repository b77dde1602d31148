//! In-memory fakes shared by the unit tests in this crate.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::events::SlackEnvelope;
use crate::socket::{SocketTransport, TransportError};
use crate::web_api::{PostedMessage, SlackApi, SlackApiError};

/// Ordered record of side effects across fakes, for asserting call order.
#[derive(Clone, Default)]
pub(crate) struct Timeline(Arc<StdMutex<Vec<String>>>);

impl Timeline {
    pub(crate) fn record(&self, entry: impl Into<String>) {
        self.0.lock().expect("timeline lock").push(entry.into());
    }

    pub(crate) fn entries(&self) -> Vec<String> {
        self.0.lock().expect("timeline lock").clone()
    }
}

#[derive(Default)]
pub(crate) struct ScriptedTransport {
    state: Mutex<ScriptedState>,
    timeline: Timeline,
}

#[derive(Default)]
struct ScriptedState {
    connect_results: VecDeque<Result<(), TransportError>>,
    envelopes: VecDeque<Result<Option<SlackEnvelope>, TransportError>>,
    ack_failures: VecDeque<TransportError>,
    connect_attempts: usize,
    acknowledged_ids: Vec<String>,
    disconnect_calls: usize,
}

impl ScriptedTransport {
    pub(crate) fn with_script(
        connect_results: Vec<Result<(), TransportError>>,
        envelopes: Vec<Result<Option<SlackEnvelope>, TransportError>>,
    ) -> Self {
        Self {
            state: Mutex::new(ScriptedState {
                connect_results: connect_results.into(),
                envelopes: envelopes.into(),
                ..ScriptedState::default()
            }),
            timeline: Timeline::default(),
        }
    }

    pub(crate) fn with_timeline(
        timeline: Timeline,
        envelopes: Vec<Result<Option<SlackEnvelope>, TransportError>>,
    ) -> Self {
        Self { timeline, ..Self::with_script(Vec::new(), envelopes) }
    }

    pub(crate) async fn fail_next_ack(&self, error: TransportError) {
        self.state.lock().await.ack_failures.push_back(error);
    }

    pub(crate) async fn connect_attempts(&self) -> usize {
        self.state.lock().await.connect_attempts
    }

    pub(crate) async fn acknowledged_ids(&self) -> Vec<String> {
        self.state.lock().await.acknowledged_ids.clone()
    }

    pub(crate) async fn disconnect_calls(&self) -> usize {
        self.state.lock().await.disconnect_calls
    }
}

#[async_trait]
impl SocketTransport for ScriptedTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        let mut state = self.state.lock().await;
        state.connect_attempts += 1;
        state.connect_results.pop_front().unwrap_or(Ok(()))
    }

    async fn next_envelope(&self) -> Result<Option<SlackEnvelope>, TransportError> {
        let mut state = self.state.lock().await;
        state.envelopes.pop_front().unwrap_or(Ok(None))
    }

    async fn acknowledge(&self, envelope_id: &str) -> Result<(), TransportError> {
        let mut state = self.state.lock().await;
        if let Some(error) = state.ack_failures.pop_front() {
            return Err(error);
        }
        state.acknowledged_ids.push(envelope_id.to_owned());
        self.timeline.record(format!("ack:{envelope_id}"));
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        let mut state = self.state.lock().await;
        state.disconnect_calls += 1;
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum ApiCall {
    Post { channel: String, text: String },
    Respond { response_url: String, text: String },
}

#[derive(Default)]
pub(crate) struct RecordingSlackApi {
    calls: StdMutex<Vec<ApiCall>>,
}

impl RecordingSlackApi {
    pub(crate) fn calls(&self) -> Vec<ApiCall> {
        self.calls.lock().expect("calls lock").clone()
    }
}

#[async_trait]
impl SlackApi for RecordingSlackApi {
    async fn post_message(
        &self,
        channel: &str,
        text: &str,
    ) -> Result<PostedMessage, SlackApiError> {
        self.calls
            .lock()
            .expect("calls lock")
            .push(ApiCall::Post { channel: channel.to_owned(), text: text.to_owned() });
        Ok(PostedMessage { channel: channel.to_owned(), ts: "1730000000.9999".to_owned() })
    }

    async fn respond(&self, response_url: &str, text: &str) -> Result<(), SlackApiError> {
        let call =
            ApiCall::Respond { response_url: response_url.to_owned(), text: text.to_owned() };
        self.calls.lock().expect("calls lock").push(call);
        Ok(())
    }
}
