//! Line-delimited progress frames.
//!
//! Each audit section writes `status`, then `data` and a closing `status`,
//! or a single `error`. Sections share one [`FrameSink`] and never block or
//! fail each other; a caller that stops reading just stops receiving.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::Display;
use std::future::Future;
use tokio::sync::mpsc;

/// One NDJSON frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StreamFrame {
    /// Human-readable progress
    Status { message: String },
    /// A finished section result
    Data { payload: DataPayload },
    /// A failed section, or the whole audit when `key` is absent
    Error {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        key: Option<String>,
        message: String,
    },
    /// The audit was persisted
    Complete { payload: CompletePayload },
}

/// Payload of a `data` frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataPayload {
    /// Section key, e.g. `UX Audit expert`
    pub key: String,
    /// Section result
    pub data: Value,
}

/// Payload of the `complete` frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletePayload {
    pub audit_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot_url: Option<String>,
    pub report: Value,
}

impl StreamFrame {
    /// Render as one newline-terminated JSON line.
    ///
    /// # Errors
    /// Returns the serializer error, which only a non-string map key can cause.
    pub fn to_line(&self) -> serde_json::Result<String> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }

    /// Section key of a `data` or keyed `error` frame.
    #[must_use]
    pub fn key(&self) -> Option<&str> {
        match self {
            Self::Data { payload } => Some(&payload.key),
            Self::Error { key, .. } => key.as_deref(),
            Self::Status { .. } | Self::Complete { .. } => None,
        }
    }
}

/// Cloneable producer half of an audit's frame stream.
#[derive(Debug, Clone)]
pub struct FrameSink {
    tx: mpsc::UnboundedSender<StreamFrame>,
}

impl FrameSink {
    /// Create a sink and the receiver the response body drains.
    #[must_use]
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<StreamFrame>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Send a frame. A disconnected caller is not an error.
    pub fn send(&self, frame: StreamFrame) {
        if self.tx.send(frame).is_err() {
            tracing::trace!("frame dropped, stream consumer went away");
        }
    }

    pub fn status(&self, message: impl Into<String>) {
        self.send(StreamFrame::Status {
            message: message.into(),
        });
    }

    pub fn data(&self, key: impl Into<String>, data: Value) {
        self.send(StreamFrame::Data {
            payload: DataPayload {
                key: key.into(),
                data,
            },
        });
    }

    pub fn error(&self, key: Option<&str>, message: impl Into<String>) {
        self.send(StreamFrame::Error {
            key: key.map(str::to_string),
            message: message.into(),
        });
    }

    pub fn complete(&self, payload: CompletePayload) {
        self.send(StreamFrame::Complete { payload });
    }

    /// Whether the consumer has gone away.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Display name of a section key: `UX Audit expert` becomes `UX Audit`.
#[must_use]
pub fn section_name(key: &str) -> &str {
    key.strip_suffix(" expert").unwrap_or(key)
}

/// Run one section and frame its outcome.
///
/// Emits `status("Running <name> analysis...")`, then either `data` followed
/// by `status("✓ <name> analysis complete.")`, or exactly one `error`.
/// Returns the result so the caller can assemble the report.
pub async fn run_expert_stream<F, E>(sink: &FrameSink, key: &str, analysis: F) -> Option<Value>
where
    F: Future<Output = Result<Value, E>>,
    E: Display,
{
    let name = section_name(key);
    sink.status(format!("Running {name} analysis..."));

    match analysis.await {
        Ok(data) => {
            sink.data(key, data.clone());
            sink.status(format!("✓ {name} analysis complete."));
            Some(data)
        }
        Err(e) => {
            tracing::error!("Analysis failed for {}: {}", key, e);
            sink.error(Some(key), format!("Error in {key}: {e}"));
            None
        }
    }
}
