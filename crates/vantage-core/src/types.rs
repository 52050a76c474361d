//! Shared types used across the Vantage engine.
//!
//! Wire names follow the JSON the browser client exchanges with the
//! server (`camelCase` fields, human-readable expert labels).

use crate::error::VantageError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

/// Newtype for audit identifiers.
///
/// Audit IDs are UUID v4 strings generated at finalize time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AuditId(String);

impl AuditId {
    /// Create an `AuditId` from a string.
    ///
    /// # Errors
    /// Returns error if the ID is not a valid UUID v4.
    pub fn new(id: impl Into<String>) -> Result<Self, VantageError> {
        let id = id.into();
        Self::validate(&id)?;
        Ok(Self(id))
    }

    /// Create a new random `AuditId`.
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Get the inner string value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn validate(id: &str) -> Result<(), VantageError> {
        static UUID_REGEX: OnceLock<Regex> = OnceLock::new();
        let regex = UUID_REGEX.get_or_init(|| {
            Regex::new(r"^[0-9a-f]{8}-[0-9a-f]{4}-4[0-9a-f]{3}-[89ab][0-9a-f]{3}-[0-9a-f]{12}$")
                .expect("valid regex")
        });

        if regex.is_match(id) {
            Ok(())
        } else {
            Err(VantageError::Validation(format!(
                "invalid audit ID: must be a valid UUID v4, got '{id}'"
            )))
        }
    }
}

impl fmt::Display for AuditId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How an audit input is supplied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputKind {
    /// A live page to capture with the browser
    Url,
    /// An image the caller already has
    Upload,
}

/// Which side of a comparison an input belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputRole {
    /// The site being audited
    Primary,
    /// The site it is compared against
    Competitor,
}

/// One thing to audit. Consumed once by acquisition and never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditInput {
    /// Input kind
    #[serde(rename = "type")]
    pub kind: InputKind,
    /// Page URL (for `InputKind::Url`)
    #[serde(default)]
    pub url: Option<String>,
    /// Base64-encoded image (for `InputKind::Upload`)
    #[serde(default)]
    pub file_bytes: Option<String>,
    /// Comparison role, if any
    #[serde(default)]
    pub role: Option<InputRole>,
}

impl AuditInput {
    /// A URL input.
    #[must_use]
    pub fn url(url: impl Into<String>) -> Self {
        Self {
            kind: InputKind::Url,
            url: Some(url.into()),
            file_bytes: None,
            role: None,
        }
    }

    /// An uploaded image input, already base64-encoded.
    #[must_use]
    pub fn upload(file_base64: impl Into<String>) -> Self {
        Self {
            kind: InputKind::Upload,
            url: None,
            file_bytes: Some(file_base64.into()),
            role: None,
        }
    }

    /// Set the comparison role.
    #[must_use]
    pub fn with_role(mut self, role: InputRole) -> Self {
        self.role = Some(role);
        self
    }

    /// Human-readable label used in status messages.
    #[must_use]
    pub fn label(&self) -> &str {
        match self.kind {
            InputKind::Url => self.url.as_deref().unwrap_or("(missing url)"),
            InputKind::Upload => "uploaded image",
        }
    }
}

/// Device class a page is rendered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceClass {
    /// Large fixed viewport
    Desktop,
    /// Narrow touch viewport
    Mobile,
}

impl DeviceClass {
    /// Lowercase name, used in storage keys.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Desktop => "desktop",
            Self::Mobile => "mobile",
        }
    }

    /// Whether this is the mobile class.
    #[must_use]
    pub fn is_mobile(self) -> bool {
        matches!(self, Self::Mobile)
    }
}

/// An in-memory screenshot. `data` stays base64 until finalize uploads it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Screenshot {
    /// URL path of the captured page, or `upload`
    pub path: String,
    /// Base64-encoded JPEG/PNG bytes; empty once the bytes were dropped
    #[serde(default)]
    pub data: String,
    /// Captured with the mobile device class
    #[serde(default)]
    pub is_mobile: bool,
}

impl Screenshot {
    /// Device class this screenshot was taken with.
    #[must_use]
    pub fn device(&self) -> DeviceClass {
        if self.is_mobile {
            DeviceClass::Mobile
        } else {
            DeviceClass::Desktop
        }
    }
}

/// A screenshot after finalize replaced its bytes with a durable URL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredScreenshot {
    /// URL path of the captured page, or `upload`
    pub path: String,
    /// Captured with the mobile device class
    pub is_mobile: bool,
    /// Public URL of the uploaded image
    pub url: String,
}

/// Cheap DOM heuristics gathered on the first desktop capture.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessibilityHeuristics {
    /// `<img>` elements without an `alt` attribute
    pub images_missing_alt: u32,
    /// Inputs and textareas without an associated label
    pub inputs_missing_labels: u32,
    /// Any landmark element present (`main`, `nav`, `header`, ...)
    pub has_semantic_elements: bool,
    /// Any ARIA role/label attributes present
    pub has_aria_attributes: bool,
}

/// Accessibility rule engine output, partitioned by outcome.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleResults {
    /// Rules that failed
    pub violations: Vec<serde_json::Value>,
    /// Rules that passed
    pub passes: Vec<serde_json::Value>,
    /// Rules that need manual review
    pub incomplete: Vec<serde_json::Value>,
    /// Rules that did not apply to the page
    pub inapplicable: Vec<serde_json::Value>,
}

/// Evidence produced by one capture of one (input, device class) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapturedEvidence {
    /// Full-page screenshot
    pub screenshot: Screenshot,
    /// Visible page text
    pub live_text: String,
    /// Selectors of animated or transitioned elements (first desktop pass only)
    #[serde(default)]
    pub animation_data: Option<Vec<String>>,
    /// DOM accessibility heuristics (first desktop pass only)
    #[serde(default)]
    pub accessibility_data: Option<AccessibilityHeuristics>,
    /// Accessibility rule engine results (first desktop pass only)
    #[serde(default)]
    pub rule_results: Option<RuleResults>,
}

/// Which pipeline an audit runs through.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditMode {
    /// Five independent experts plus contextual re-rank
    #[default]
    Standard,
    /// Side-by-side comparison of two sites
    Competitor,
}

/// The closed set of analysis dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ExpertKey {
    /// Purpose, audience and positioning
    #[serde(rename = "Strategy Audit expert")]
    Strategy,
    /// Usability heuristics and metrics
    #[serde(rename = "UX Audit expert")]
    Ux,
    /// Market fit, retention, conversion
    #[serde(rename = "Product Audit expert")]
    Product,
    /// Visual design and branding
    #[serde(rename = "Visual Audit expert")]
    Visual,
    /// WCAG compliance
    #[serde(rename = "Accessibility Audit expert")]
    Accessibility,
    /// Primary-vs-competitor comparison
    #[serde(rename = "Competitor Analysis expert")]
    Competitor,
}

impl ExpertKey {
    /// The experts a standard audit runs, in launch order.
    pub const STANDARD: [ExpertKey; 5] = [
        Self::Strategy,
        Self::Ux,
        Self::Product,
        Self::Visual,
        Self::Accessibility,
    ];

    /// Wire label, identical to the serde representation.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Strategy => "Strategy Audit expert",
            Self::Ux => "UX Audit expert",
            Self::Product => "Product Audit expert",
            Self::Visual => "Visual Audit expert",
            Self::Accessibility => "Accessibility Audit expert",
            Self::Competitor => "Competitor Analysis expert",
        }
    }

    /// Short display name used in status messages.
    #[must_use]
    pub fn short_name(self) -> &'static str {
        match self {
            Self::Strategy => "Strategy",
            Self::Ux => "UX",
            Self::Product => "Product",
            Self::Visual => "Visual",
            Self::Accessibility => "Accessibility",
            Self::Competitor => "Competitor",
        }
    }

    /// Request-dispatch mode that runs this expert on its own.
    #[must_use]
    pub fn mode(self) -> &'static str {
        match self {
            Self::Strategy => "analyze-strategy",
            Self::Ux => "analyze-ux",
            Self::Product => "analyze-product",
            Self::Visual => "analyze-visual",
            Self::Accessibility => "analyze-accessibility",
            Self::Competitor => "analyze-competitor",
        }
    }

    /// Inverse of [`ExpertKey::mode`].
    #[must_use]
    pub fn from_mode(mode: &str) -> Option<Self> {
        [
            Self::Strategy,
            Self::Ux,
            Self::Product,
            Self::Visual,
            Self::Accessibility,
            Self::Competitor,
        ]
        .into_iter()
        .find(|key| key.mode() == mode)
    }

    /// Field of the expert's result holding its self-reported top five issues.
    ///
    /// Strategy and competitor results carry no such list.
    #[must_use]
    pub fn top_issues_field(self) -> Option<&'static str> {
        match self {
            Self::Ux => Some("Top5CriticalUXIssues"),
            Self::Product => Some("Top5CriticalProductIssues"),
            Self::Visual => Some("Top5CriticalVisualIssues"),
            Self::Accessibility => Some("Top5CriticalAccessibilityIssues"),
            Self::Strategy | Self::Competitor => None,
        }
    }

    /// Source tag attached to issues pooled for the contextual re-rank.
    #[must_use]
    pub fn issue_source(self) -> &'static str {
        match self {
            Self::Strategy => "Strategy Audit",
            Self::Ux => "UX Audit",
            Self::Product => "Product Audit",
            Self::Visual => "Visual Design",
            Self::Accessibility => "Accessibility Audit",
            Self::Competitor => "Competitor Analysis",
        }
    }
}

impl fmt::Display for ExpertKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audit_id_generate_is_valid() {
        let id = AuditId::generate();
        assert!(AuditId::new(id.as_str()).is_ok());
    }

    #[test]
    fn test_audit_id_rejects_garbage() {
        assert!(AuditId::new("not-a-uuid").is_err());
        assert!(AuditId::new("").is_err());
    }

    #[test]
    fn test_expert_key_serializes_as_label() {
        for key in ExpertKey::STANDARD {
            let json = serde_json::to_string(&key).expect("serialize key");
            assert_eq!(json, format!("\"{}\"", key.label()));
        }
        let parsed: ExpertKey =
            serde_json::from_str("\"Competitor Analysis expert\"").expect("parse key");
        assert_eq!(parsed, ExpertKey::Competitor);
    }

    #[test]
    fn test_expert_key_mode_round_trip() {
        assert_eq!(ExpertKey::from_mode("analyze-ux"), Some(ExpertKey::Ux));
        assert_eq!(
            ExpertKey::from_mode(ExpertKey::Accessibility.mode()),
            Some(ExpertKey::Accessibility)
        );
        assert_eq!(ExpertKey::from_mode("analyze-everything"), None);
    }

    #[test]
    fn test_top_issue_fields() {
        let with_lists: Vec<_> = ExpertKey::STANDARD
            .iter()
            .filter(|k| k.top_issues_field().is_some())
            .collect();
        assert_eq!(with_lists.len(), 4);
        assert!(ExpertKey::Strategy.top_issues_field().is_none());
    }

    #[test]
    fn test_audit_input_wire_format() {
        let input: AuditInput =
            serde_json::from_str(r#"{"type":"url","url":"https://example.com","role":"primary"}"#)
                .expect("parse input");
        assert_eq!(input.kind, InputKind::Url);
        assert_eq!(input.role, Some(InputRole::Primary));
        assert_eq!(input.label(), "https://example.com");

        let upload: AuditInput =
            serde_json::from_str(r#"{"type":"upload","fileBytes":"aGVsbG8="}"#)
                .expect("parse upload");
        assert_eq!(upload.kind, InputKind::Upload);
        assert_eq!(upload.file_bytes.as_deref(), Some("aGVsbG8="));
    }

    #[test]
    fn test_screenshot_device() {
        let shot = Screenshot {
            path: "/".to_string(),
            data: String::new(),
            is_mobile: true,
        };
        assert_eq!(shot.device(), DeviceClass::Mobile);
        assert_eq!(shot.device().as_str(), "mobile");
        let json = serde_json::to_value(&shot).expect("serialize screenshot");
        assert_eq!(json["isMobile"], true);
    }
}
