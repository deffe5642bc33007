//! LLM error types.

use serde::Deserialize;
use thiserror::Error;

/// Errors that can occur when making LLM API calls.
#[derive(Debug, Error)]
pub enum LLMError {
    /// HTTP request failed
    #[error("http request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// API returned an error response
    #[error("api error (status {status}): {message}")]
    Api { status: u16, message: String },

    /// The provider reported an error inside an already-open stream
    #[error("{0}")]
    Stream(String),
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorDetail,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ErrorDetail {
    Object { message: String },
    Text(String),
}

impl ErrorDetail {
    pub(super) fn into_message(self) -> String {
        match self {
            ErrorDetail::Object { message } | ErrorDetail::Text(message) => message,
        }
    }
}

/// Pull a readable message out of an OpenAI-style error body.
///
/// Falls back to the raw body, then to the canonical status reason.
pub(super) fn api_error_message(status: reqwest::StatusCode, body: &str) -> String {
    if let Ok(envelope) = serde_json::from_str::<ErrorEnvelope>(body) {
        return envelope.error.into_message();
    }
    let body = body.trim();
    if !body.is_empty() {
        return body.to_string();
    }
    status
        .canonical_reason()
        .unwrap_or("unknown error")
        .to_string()
}

/// Convert a non-success response into [`LLMError::Api`].
pub(super) async fn api_error(response: reqwest::Response) -> LLMError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    LLMError::Api {
        status: status.as_u16(),
        message: api_error_message(status, &body),
    }
}

/// Extract the message of an in-stream `{"error": ...}` event, if any.
pub(super) fn stream_error_message(data: &str) -> Option<String> {
    serde_json::from_str::<ErrorEnvelope>(data)
        .ok()
        .map(|e| e.error.into_message())
}
