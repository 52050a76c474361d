//! Vantage Pipeline - audit orchestration.
//!
//! This crate turns a list of audit inputs into a persisted report. It
//! coordinates evidence capture, the expert fan-out through the analysis
//! gateway, the contextual re-rank of critical issues and finalize, and
//! reports progress as line-delimited frames while it works.
//!
//! # Features
//!
//! - Sequential acquisition with per-input failure isolation
//! - Per-audit limit on concurrent experts, on top of the global analysis pool
//! - Competitor comparison with the schema split into parallel halves
//! - Contextual re-rank with a deterministic fallback
//! - Optional PageSpeed Insights metrics in the expert context
//!
//! # Example
//!
//! ```rust,ignore
//! use vantage_pipeline::{AuditRequest, Coordinator, FrameSink};
//!
//! let (sink, mut frames) = FrameSink::channel();
//! tokio::spawn(async move {
//!     while let Some(frame) = frames.recv().await {
//!         print!("{}", frame.to_line()?);
//!     }
//! });
//!
//! let outcome = coordinator
//!     .run(AuditRequest { inputs, mode: AuditMode::Standard }, &sink)
//!     .await?;
//! println!("stored as {}", outcome.audit_id);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

#[allow(missing_docs)]
pub mod acquisition;
#[allow(missing_docs)]
pub mod catalog;
#[allow(missing_docs)]
pub mod coordinator;
#[allow(missing_docs)]
pub mod error;
#[allow(missing_docs)]
pub mod performance;
#[allow(missing_docs)]
pub mod report;
pub mod rerank;
#[allow(missing_docs)]
pub mod stream;

// Re-export commonly used types
pub use acquisition::{Acquirer, Acquisition, EvidenceSource};
pub use catalog::{BuiltinCatalog, ExpertContext, PromptCatalog, SchemaPartition};
pub use coordinator::{
    AuditOutcome, AuditPhase, AuditRequest, CompetitorSide, Coordinator, CoordinatorSettings,
};
pub use error::{AuditError, Result};
pub use performance::{PerformanceClient, PerformanceMetrics, PerformanceReport};
pub use report::{AuditReport, CriticalIssue, CONTEXTUAL_ISSUES_KEY};
pub use rerank::contextual_rank;
pub use stream::{run_expert_stream, CompletePayload, DataPayload, FrameSink, StreamFrame};
