//! The assembled audit report.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use std::collections::BTreeMap;
use vantage_core::ExpertKey;

/// Report key of the contextual re-rank result.
pub const CONTEXTUAL_ISSUES_KEY: &str = "Top5ContextualIssues";

/// One critical issue. Fields the engine does not read are carried through.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriticalIssue {
    #[serde(rename = "Issue", default)]
    pub issue: String,
    #[serde(rename = "ImpactLevel", default)]
    pub impact_level: String,
    #[serde(rename = "Score", default, skip_serializing_if = "Option::is_none")]
    pub score: Option<Number>,
    /// Which expert reported it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(flatten)]
    pub rest: Map<String, Value>,
}

impl CriticalIssue {
    /// High > Medium > Low > anything else.
    #[must_use]
    pub fn impact_rank(&self) -> u8 {
        match self.impact_level.trim().to_ascii_lowercase().as_str() {
            "high" => 3,
            "medium" => 2,
            "low" => 1,
            _ => 0,
        }
    }

    /// Numeric score; a missing score sorts after every real one.
    #[must_use]
    pub fn score_value(&self) -> f64 {
        self.score
            .as_ref()
            .and_then(Number::as_f64)
            .unwrap_or(f64::INFINITY)
    }
}

/// Expert results keyed by expert plus the optional contextual list.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AuditReport {
    #[serde(flatten)]
    pub experts: BTreeMap<ExpertKey, Value>,
    #[serde(rename = "Top5ContextualIssues", skip_serializing_if = "Option::is_none")]
    pub contextual_issues: Option<Vec<CriticalIssue>>,
}

impl AuditReport {
    /// Record an expert's result. A second result for the same key is ignored.
    pub fn insert(&mut self, key: ExpertKey, result: Value) -> bool {
        if self.experts.contains_key(&key) {
            tracing::warn!("duplicate result for {} ignored", key);
            return false;
        }
        self.experts.insert(key, result);
        true
    }

    #[must_use]
    pub fn get(&self, key: ExpertKey) -> Option<&Value> {
        self.experts.get(&key)
    }

    /// JSON object with expert labels as keys.
    ///
    /// # Errors
    /// Returns the serializer error, which only non-string map keys can cause.
    pub fn to_json(&self) -> serde_json::Result<Map<String, Value>> {
        match serde_json::to_value(self)? {
            Value::Object(map) => Ok(map),
            _ => Ok(Map::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_issue_round_trips_unknown_fields() {
        let raw = json!({
            "Issue": "Low contrast CTA",
            "ImpactLevel": "High",
            "Score": 3,
            "Recommendation": "Darken the button",
            "Citations": ["Sign up today"]
        });
        let issue: CriticalIssue = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(issue.impact_rank(), 3);
        assert!((issue.score_value() - 3.0).abs() < f64::EPSILON);
        assert_eq!(serde_json::to_value(&issue).unwrap(), raw);
    }

    #[test]
    fn test_report_serializes_labels() {
        let mut report = AuditReport::default();
        assert!(report.insert(ExpertKey::Ux, json!({"CategoryScore": 6})));
        assert!(!report.insert(ExpertKey::Ux, json!({"CategoryScore": 1})));
        report.contextual_issues = Some(vec![]);

        let map = report.to_json().unwrap();
        assert_eq!(map["UX Audit expert"]["CategoryScore"], 6);
        assert_eq!(map[CONTEXTUAL_ISSUES_KEY], json!([]));
    }

    #[test]
    fn test_contextual_list_omitted_when_absent() {
        let report = AuditReport::default();
        assert!(report.to_json().unwrap().is_empty());
    }
}
