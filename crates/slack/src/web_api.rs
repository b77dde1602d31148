//! Outbound Slack Web API calls.
//!
//! [`SlackApi`] is the seam handlers talk to. [`SlackWebClient`] is the
//! reqwest-backed implementation that authenticates with the bot token, except
//! for [`SlackWebClient::open_connection`], which needs the app-level token.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

use calmbot_core::config::DEFAULT_SLACK_API_BASE_URL;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SlackApiError {
    #[error("{method} request failed: {message}")]
    Request { method: String, message: String },
    #[error("{method} response parse failed: {message}")]
    Decode { method: String, message: String },
    #[error("{method} error: {error}")]
    Api { method: String, error: String },
    #[error("{method} response missing `{field}`")]
    MissingField { method: String, field: &'static str },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PostedMessage {
    pub channel: String,
    pub ts: String,
}

#[async_trait]
pub trait SlackApi: Send + Sync {
    /// `chat.postMessage` with a plain-text body.
    async fn post_message(&self, channel: &str, text: &str) -> Result<PostedMessage, SlackApiError>;

    /// Replies to a slash command through its `response_url`. The reply is
    /// ephemeral: only the invoking user sees it.
    async fn respond(&self, response_url: &str, text: &str) -> Result<(), SlackApiError>;
}

#[derive(Debug, Deserialize)]
struct SlackApiResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    channel: Option<String>,
    #[serde(default)]
    ts: Option<String>,
    #[serde(default)]
    url: Option<String>,
}

#[derive(Clone, Debug)]
pub struct SlackWebClient {
    http: reqwest::Client,
    bot_token: SecretString,
    base_url: String,
}

impl SlackWebClient {
    pub fn new(bot_token: SecretString) -> Self {
        Self::with_base_url(bot_token, DEFAULT_SLACK_API_BASE_URL)
    }

    pub fn with_base_url(bot_token: SecretString, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_owned();
        Self { http: reqwest::Client::new(), bot_token, base_url }
    }

    /// Calls `apps.connections.open` and returns the Socket Mode WebSocket URL.
    pub async fn open_connection(&self, app_token: &SecretString) -> Result<String, SlackApiError> {
        let method = "apps.connections.open";
        debug!("opening socket mode connection");
        let response = self
            .http
            .post(self.method_url(method))
            .bearer_auth(app_token.expose_secret())
            .header("Content-Type", "application/x-www-form-urlencoded")
            .send()
            .await
            .map_err(|error| request_error(method, &error))?;

        let api_response: SlackApiResponse =
            response.json().await.map_err(|error| decode_error(method, &error))?;
        let api_response = check_ok(method, api_response)?;

        api_response
            .url
            .ok_or(SlackApiError::MissingField { method: method.to_owned(), field: "url" })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/{method}", self.base_url)
    }

    async fn call_bot_api(
        &self,
        method: &str,
        body: &serde_json::Value,
    ) -> Result<SlackApiResponse, SlackApiError> {
        let response = self
            .http
            .post(self.method_url(method))
            .bearer_auth(self.bot_token.expose_secret())
            .json(body)
            .send()
            .await
            .map_err(|error| request_error(method, &error))?;

        let api_response: SlackApiResponse =
            response.json().await.map_err(|error| decode_error(method, &error))?;
        check_ok(method, api_response)
    }
}

#[async_trait]
impl SlackApi for SlackWebClient {
    async fn post_message(
        &self,
        channel: &str,
        text: &str,
    ) -> Result<PostedMessage, SlackApiError> {
        let method = "chat.postMessage";
        let body = serde_json::json!({ "channel": channel, "text": text });
        debug!(channel, "posting message");

        let response = self.call_bot_api(method, &body).await?;
        let ts = response
            .ts
            .ok_or(SlackApiError::MissingField { method: method.to_owned(), field: "ts" })?;
        Ok(PostedMessage { channel: response.channel.unwrap_or_else(|| channel.to_owned()), ts })
    }

    async fn respond(&self, response_url: &str, text: &str) -> Result<(), SlackApiError> {
        let method = "response_url";
        let body = serde_json::json!({ "response_type": "ephemeral", "text": text });
        debug!("responding through response_url");

        // response_url answers with a plain `ok` body, so only the status matters.
        self.http
            .post(response_url)
            .json(&body)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|error| request_error(method, &error))?;
        Ok(())
    }
}

fn check_ok(method: &str, response: SlackApiResponse) -> Result<SlackApiResponse, SlackApiError> {
    if response.ok {
        return Ok(response);
    }

    let error = response.error.unwrap_or_else(|| "unknown".to_owned());
    warn!(method, error = %error, "slack api error");
    Err(SlackApiError::Api { method: method.to_owned(), error })
}

fn request_error(method: &str, error: &reqwest::Error) -> SlackApiError {
    SlackApiError::Request { method: method.to_owned(), message: error.to_string() }
}

fn decode_error(method: &str, error: &reqwest::Error) -> SlackApiError {
    SlackApiError::Decode { method: method.to_owned(), message: error.to_string() }
}
