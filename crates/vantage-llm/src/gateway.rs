//! Analysis call gateway.
//!
//! Every model call in the engine goes through here: one slot of the shared
//! analysis pool is held for the whole call, transient provider failures are
//! retried under the configured policy, and the output is recovered as JSON
//! and checked against the schema's required keys.

use crate::error::{LlmError, Result};
use crate::json_recovery::recover_json;
use crate::provider::{LlmProvider, StructuredRequest};
use serde_json::Value;
use std::sync::Arc;
use vantage_core::{BoundedSemaphore, RetryPolicy};

/// Bounded, retrying, JSON-recovering front for an [`LlmProvider`].
#[derive(Clone)]
pub struct AnalysisGateway {
    provider: Arc<dyn LlmProvider>,
    pool: BoundedSemaphore,
    policy: RetryPolicy,
}

impl AnalysisGateway {
    /// Create a gateway over `provider`, limited by `pool`.
    #[must_use]
    pub fn new(provider: Arc<dyn LlmProvider>, pool: BoundedSemaphore, policy: RetryPolicy) -> Self {
        Self {
            provider,
            pool,
            policy,
        }
    }

    /// The shared analysis pool.
    #[must_use]
    pub fn pool(&self) -> &BoundedSemaphore {
        &self.pool
    }

    /// Run one structured generation and return the recovered object.
    ///
    /// # Errors
    /// Returns the provider error once retries are exhausted or on a fatal
    /// failure, [`LlmError::EmptyResponse`] for blank output,
    /// [`LlmError::Unparseable`] when JSON recovery fails, and
    /// [`LlmError::SchemaMismatch`] when required keys are missing.
    pub async fn generate(&self, request: &StructuredRequest) -> Result<Value> {
        let _ticket = self.pool.acquire().await;

        let raw = self
            .policy
            .retry("generate content", move || self.provider.generate(request))
            .await?;

        if raw.trim().is_empty() {
            return Err(LlmError::EmptyResponse { reason: None });
        }

        let value = recover_json(&raw).map_err(|reason| {
            tracing::error!(
                provider = self.provider.provider_id(),
                "failed to parse model output as JSON: {reason}"
            );
            LlmError::Unparseable {
                reason,
                raw: raw.trim().to_string(),
            }
        })?;

        check_required(request, &value)?;
        Ok(value)
    }
}

fn check_required(request: &StructuredRequest, value: &Value) -> Result<()> {
    let required = request.required_keys();
    let Some(object) = value.as_object() else {
        if required.is_empty() {
            return Ok(());
        }
        return Err(LlmError::SchemaMismatch {
            missing: required.into_iter().map(str::to_string).collect(),
        });
    };

    let missing: Vec<String> = required
        .into_iter()
        .filter(|key| !object.contains_key(*key))
        .map(str::to_string)
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(LlmError::SchemaMismatch { missing })
    }
}
