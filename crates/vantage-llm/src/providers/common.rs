//! Common utilities shared across LLM providers.

use crate::error::{LlmError, Result};
use reqwest::Client;
use std::time::Duration;

/// Build a standard HTTP client with common timeout settings.
///
/// # Arguments
/// * `timeout_secs` - Timeout in seconds (defaults to 60 if not specified)
///
/// # Errors
/// Returns error if the HTTP client cannot be created.
pub fn build_http_client(timeout_secs: Option<u64>) -> Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs.unwrap_or(60)))
        .build()
        .map_err(|e| LlmError::Internal(format!("failed to create HTTP client: {e}")))
}

/// Map a transport-level reqwest failure onto an error the retry classifier
/// understands.
pub fn transport_error(provider: &str, timeout_secs: u64, err: &reqwest::Error) -> LlmError {
    if err.is_timeout() {
        LlmError::Timeout {
            seconds: timeout_secs,
        }
    } else if err.is_connect() || err.is_request() || err.is_body() {
        LlmError::Unavailable {
            provider: provider.to_string(),
            message: err.to_string(),
        }
    } else {
        LlmError::ParseError {
            provider: provider.to_string(),
            message: err.to_string(),
        }
    }
}
