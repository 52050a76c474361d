//! Vantage LLM - structured-output analysis calls.
//!
//! Every call the audit engine makes to the generative model goes through
//! the [`AnalysisGateway`], which:
//!
//! - holds one slot of the process-wide analysis pool for the whole call
//! - retries rate limits, overloads and dropped connections with capped
//!   full-jitter backoff, honoring server-suggested delays
//! - recovers JSON from fenced, chatty or truncated output
//! - checks the recovered object against the schema's required keys
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use vantage_core::{AppConfig, BoundedSemaphore, RetryPolicy};
//! use vantage_llm::{AnalysisGateway, GeminiProvider, StructuredRequest};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = AppConfig::load_with_env()?;
//! let provider = GeminiProvider::from_config(&config.llm)?;
//! let gateway = AnalysisGateway::new(
//!     Arc::new(provider),
//!     BoundedSemaphore::new("analysis", config.limits.analysis_calls),
//!     RetryPolicy::from(&config.retry),
//! );
//!
//! let request = StructuredRequest::new(
//!     "You are a UX auditor.",
//!     "Page text goes here",
//!     serde_json::json!({"type": "OBJECT", "required": ["Score"]}),
//! );
//! let result = gateway.generate(&request).await?;
//! println!("{result}");
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod error;
pub mod gateway;
pub mod json_recovery;
pub mod provider;
pub mod providers;

// Re-export commonly used types
pub use error::{LlmError, Result};
pub use gateway::AnalysisGateway;
pub use json_recovery::recover_json;
pub use provider::{InlineImage, LlmProvider, StructuredRequest};
pub use providers::GeminiProvider;
