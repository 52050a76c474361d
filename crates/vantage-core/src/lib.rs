//! Vantage Core - Foundation crate for the Vantage audit engine.
//!
//! This crate provides shared types, error handling, configuration management,
//! and the two resource-control primitives every other Vantage crate leans on.
//!
//! # Modules
//!
//! - [`error`] - Central error types using thiserror
//! - [`config`] - TOML-based configuration with XDG paths and env overrides
//! - [`types`] - Shared domain types (`AuditInput`, `ExpertKey`, `CapturedEvidence`, ...)
//! - [`limiter`] - Fair bounded semaphore handing out RAII tickets
//! - [`retry`] - Transient-error classification and capped full-jitter backoff
//!
//! # Example
//!
//! ```rust
//! use vantage_core::{AppConfig, BoundedSemaphore};
//!
//! # async fn example() {
//! let config = AppConfig::default();
//! let pool = BoundedSemaphore::new("analysis", config.limits.analysis_calls);
//!
//! let ticket = pool.acquire().await;
//! assert_eq!(pool.in_use(), 1);
//! drop(ticket);
//! assert_eq!(pool.in_use(), 0);
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod config;
pub mod error;
pub mod limiter;
pub mod retry;
pub mod types;

// Re-export commonly used types
pub use config::{
    AppConfig, BrowserConfig, LimitsConfig, LlmConfig, NetworkIdleMode, PerformanceConfig,
    RetryConfig, ServerConfig, StorageConfig,
};
pub use error::{ConfigError, ConfigResult, Result, VantageError};
pub use limiter::{BoundedSemaphore, SemaphoreTicket};
pub use retry::{classify, server_suggested_delay, ErrorClass, RetryPolicy};
pub use types::{
    AccessibilityHeuristics, AuditId, AuditInput, AuditMode, CapturedEvidence, DeviceClass,
    ExpertKey, InputKind, InputRole, RuleResults, Screenshot, StoredScreenshot,
};
