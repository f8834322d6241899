//! HTTP client for the dialogue backend.
//!
//! Two single-round-trip operations: session bootstrap and turn exchange.
//! Neither retries internally; failure policy belongs to the call
//! controller, which aborts the call on any backend error.

use crate::config::BackendConfig;
use crate::error::{CallError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Opaque session token issued by the backend at bootstrap.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Wrap a raw token.
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// The token as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Successful session bootstrap payload.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionBootstrap {
    /// Token to present on every subsequent turn exchange.
    pub session_id: SessionId,
    /// The agent's first line for this call.
    pub opening_line: String,
}

/// One turn's reply from the dialogue backend.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnReply {
    /// The agent's reply to the caller's message.
    pub reply: String,
    /// Optional second utterance voiced right after the reply.
    #[serde(default)]
    pub follow_up: Option<String>,
    /// Whether the agent is hanging up after this turn.
    pub ended: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RespondRequest<'a> {
    session_id: &'a str,
    message: &'a str,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

/// Client for the dialogue backend.
#[derive(Debug, Clone)]
pub struct BackendClient {
    base_url: String,
    session_path: String,
    respond_path: String,
    client: reqwest::Client,
}

impl BackendClient {
    /// Build a client from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be constructed.
    pub fn new(config: &BackendConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(ms) = config.request_timeout_ms {
            builder = builder.timeout(Duration::from_millis(ms));
        }
        let client = builder
            .build()
            .map_err(|e| CallError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_owned(),
            session_path: config.session_path.clone(),
            respond_path: config.respond_path.clone(),
            client,
        })
    }

    /// Start a new dialogue session.
    ///
    /// # Errors
    ///
    /// Returns [`CallError::Bootstrap`] on any transport failure,
    /// non-success status, or malformed response body.
    pub async fn bootstrap_session(&self) -> Result<SessionBootstrap> {
        let url = format!("{}{}", self.base_url, self.session_path);
        debug!("bootstrapping session at {url}");

        let response = self
            .client
            .post(&url)
            .send()
            .await
            .map_err(|e| CallError::Bootstrap(format!("request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(CallError::Bootstrap(error_message(response).await));
        }

        response
            .json::<SessionBootstrap>()
            .await
            .map_err(|e| CallError::Bootstrap(format!("invalid response body: {e}")))
    }

    /// Exchange one caller message for the agent's reply.
    ///
    /// # Errors
    ///
    /// Returns [`CallError::Validation`] before any network I/O when
    /// `session` or `message` is empty, and [`CallError::Response`] on any
    /// transport failure, non-success status, or malformed response body.
    pub async fn respond(&self, session: &SessionId, message: &str) -> Result<TurnReply> {
        if session.as_str().is_empty() || message.trim().is_empty() {
            return Err(CallError::Validation);
        }

        let url = format!("{}{}", self.base_url, self.respond_path);
        debug!(session = %session, "sending caller turn to {url}");

        let response = self
            .client
            .post(&url)
            .json(&RespondRequest {
                session_id: session.as_str(),
                message,
            })
            .send()
            .await
            .map_err(|e| CallError::Response(format!("request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(CallError::Response(error_message(response).await));
        }

        response
            .json::<TurnReply>()
            .await
            .map_err(|e| CallError::Response(format!("invalid response body: {e}")))
    }
}

/// Extract the backend's `{ "error": ... }` message, falling back to the
/// HTTP status when the body is absent or malformed.
async fn error_message(response: reqwest::Response) -> String {
    let status = response.status();
    match response.json::<ErrorBody>().await {
        Ok(body) => body.error,
        Err(_) => format!("backend returned {status}"),
    }
}
