//! Error types for the analysis call subsystem.

use thiserror::Error;

/// Errors that can occur while calling the analysis model.
///
/// Display strings matter: the retry classifier reads them, so HTTP
/// failures always carry their status code and the upstream message.
#[derive(Error, Debug)]
pub enum LlmError {
    /// API error with status code
    #[error("API error ({provider}): status {status}, {message}")]
    ApiError {
        /// Provider name
        provider: String,
        /// HTTP status code
        status: u16,
        /// Response body or error message
        message: String,
    },

    /// Connection could not be established or was dropped
    #[error("upstream unavailable ({provider}): {message}")]
    Unavailable {
        /// Provider name
        provider: String,
        /// Error message
        message: String,
    },

    /// No API key configured
    #[error("no API key configured for {provider}")]
    MissingApiKey {
        /// Provider name
        provider: String,
    },

    /// Request validation error
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The provider answered but returned no text
    #[error("response text is empty{}", .reason.as_deref().map(|r| format!(" ({r})")).unwrap_or_default())]
    EmptyResponse {
        /// Block or finish reason, when the provider gives one
        reason: Option<String>,
    },

    /// Response envelope could not be decoded
    #[error("failed to parse response from {provider}: {message}")]
    ParseError {
        /// Provider name
        provider: String,
        /// Error message
        message: String,
    },

    /// Model output could not be recovered as JSON
    #[error("the model returned a response that could not be parsed as JSON ({reason}). Raw output:\n---\n{raw}\n---")]
    Unparseable {
        /// Why the last recovery step failed
        reason: String,
        /// Raw model output
        raw: String,
    },

    /// Recovered JSON does not match the requested schema
    #[error("response is missing required fields: {}", .missing.join(", "))]
    SchemaMismatch {
        /// Required keys absent from the response
        missing: Vec<String>,
    },

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Timeout error
    #[error("request timed out after {seconds}s")]
    Timeout {
        /// Timeout duration in seconds
        seconds: u64,
    },

    /// Internal error
    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type alias for LLM operations.
pub type Result<T> = std::result::Result<T, LlmError>;
