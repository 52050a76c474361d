use thiserror::Error;
use vantage_db::DatabaseError;
use vantage_llm::LlmError;

/// Failures of one audit or one of its sections.
#[derive(Debug, Error)]
pub enum AuditError {
    /// One input could not be captured or decoded; the input is skipped.
    #[error("Failed to acquire {input}: {message}")]
    Acquisition { input: String, message: String },

    /// No input produced any evidence, so no model call was made.
    #[error("Evidence acquisition failed for all {attempted} input(s)")]
    FatalAcquisition { attempted: usize },

    /// The analysis model call failed after retries, or fatally.
    #[error("Analysis failed for {section}: {source}")]
    Generation {
        section: String,
        #[source]
        source: LlmError,
    },

    /// The model answered but the output could not be recovered as JSON.
    #[error("Unparseable output for {section}: {reason}. Raw output:\n---\n{raw}\n---")]
    Parse {
        section: String,
        reason: String,
        raw: String,
    },

    /// Finalize could not store the audit; nothing was persisted.
    #[error("Finalization failed: {0}")]
    Persistence(#[from] DatabaseError),

    #[error("Invalid audit request: {0}")]
    InvalidInput(String),
}

impl AuditError {
    /// Attribute a gateway failure to `section`.
    pub fn analysis(section: impl Into<String>, error: LlmError) -> Self {
        let section = section.into();
        match error {
            LlmError::Unparseable { reason, raw } => Self::Parse {
                section,
                reason,
                raw,
            },
            source => Self::Generation { section, source },
        }
    }
}

pub type Result<T> = std::result::Result<T, AuditError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unparseable_becomes_parse_error_with_raw() {
        let err = AuditError::analysis(
            "UX Audit expert",
            LlmError::Unparseable {
                reason: "expected value at line 1 column 1".to_string(),
                raw: "I cannot comply".to_string(),
            },
        );
        let message = err.to_string();
        assert!(message.contains("Raw output:\n---\nI cannot comply\n---"));
        match err {
            AuditError::Parse { section, raw, .. } => {
                assert_eq!(section, "UX Audit expert");
                assert_eq!(raw, "I cannot comply");
            }
            other => panic!("unexpected: {other}"),
        }
    }

    #[test]
    fn test_other_failures_are_generation_errors() {
        let err = AuditError::analysis("Visual Audit expert", LlmError::Timeout { seconds: 300 });
        assert!(matches!(err, AuditError::Generation { .. }));
        assert!(err.to_string().starts_with("Analysis failed for Visual Audit expert"));
    }
}
