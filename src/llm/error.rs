//! LLM error types.

use thiserror::Error;

use crate::types::ErrorCode;

/// Errors that can occur when calling an LLM provider.
#[derive(Debug, Error)]
pub enum LlmError {
    /// HTTP request failed (connect, timeout, transport).
    #[error("http request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// API returned an error response.
    #[error("api error (status {status}): {message}")]
    Api { status: u16, message: String },

    /// The requested model is not present on the server.
    #[error("model '{model}' not found (try: ollama pull {model})")]
    ModelNotFound { model: String },
}

impl LlmError {
    /// The wire-level error code for this error.
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        ErrorCode::LlmError
    }
}
