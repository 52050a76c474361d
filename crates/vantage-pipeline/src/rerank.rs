//! Contextual re-rank of the experts' critical issues.

use crate::catalog::{PromptCatalog, RERANK_EXCLUSIONS};
use crate::error::{AuditError, Result};
use crate::report::{CriticalIssue, CONTEXTUAL_ISSUES_KEY};
use serde_json::{Map, Value};
use vantage_core::ExpertKey;
use vantage_llm::{AnalysisGateway, StructuredRequest};

/// Length of the contextual list.
pub const TOP_N: usize = 5;

/// Every expert's top-five list, tagged with its source, in expert order.
#[must_use]
pub fn pool_issues(report: &Map<String, Value>) -> Vec<CriticalIssue> {
    let mut pooled = Vec::new();
    for key in ExpertKey::STANDARD {
        let Some(field) = key.top_issues_field() else {
            continue;
        };
        let Some(items) = report
            .get(key.label())
            .and_then(|result| result.get(field))
            .and_then(Value::as_array)
        else {
            continue;
        };

        for item in items {
            match serde_json::from_value::<CriticalIssue>(item.clone()) {
                Ok(mut issue) => {
                    issue.source = Some(key.issue_source().to_string());
                    pooled.push(issue);
                }
                Err(e) => tracing::debug!("skipping malformed issue from {}: {}", key, e),
            }
        }
    }
    pooled
}

/// Impact descending, then score ascending; the first [`TOP_N`].
#[must_use]
pub fn fallback_rank(mut issues: Vec<CriticalIssue>) -> Vec<CriticalIssue> {
    issues.sort_by(|a, b| {
        b.impact_rank()
            .cmp(&a.impact_rank())
            .then_with(|| a.score_value().total_cmp(&b.score_value()))
    });
    issues.truncate(TOP_N);
    issues
}

/// Whether an issue's subject is handled outside the contextual list.
#[must_use]
pub fn is_excluded(issue: &CriticalIssue) -> bool {
    let normalize = |s: &str| {
        s.chars()
            .filter(|c| c.is_alphanumeric())
            .collect::<String>()
            .to_lowercase()
    };
    let subject = normalize(&issue.issue);
    RERANK_EXCLUSIONS
        .iter()
        .any(|excluded| subject.contains(&normalize(excluded)))
}

fn joined(value: Option<&Value>) -> String {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| item.as_str().map_or_else(|| item.to_string(), str::to_string))
            .collect::<Vec<_>>()
            .join(", "),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

/// Purpose and audience summary from the strategy result.
#[must_use]
pub fn strategy_context(strategy: &Value) -> String {
    let purpose = strategy.get("PurposeAnalysis");
    let audience = strategy.get("TargetAudience");
    let field = |section: Option<&Value>, name: &str| joined(section.and_then(|s| s.get(name)));

    format!(
        "- Website Purpose: {}\n- Key Objectives: {}\n- Target Audience: {} ({})\n- Website Type: {}",
        field(purpose, "PrimaryPurpose"),
        field(purpose, "KeyObjectives"),
        field(audience, "Primary"),
        field(audience, "DemographicsPsychographics"),
        field(audience, "WebsiteType"),
    )
}

fn rerank_content(strategy: &Value, issues: &[CriticalIssue]) -> Result<String> {
    let list = serde_json::to_string_pretty(issues).map_err(|e| AuditError::Parse {
        section: CONTEXTUAL_ISSUES_KEY.to_string(),
        reason: e.to_string(),
        raw: String::new(),
    })?;
    let exclusions = RERANK_EXCLUSIONS
        .iter()
        .map(|s| format!("\"{s}\""))
        .collect::<Vec<_>>()
        .join(", ");

    Ok(format!(
        "\n### Strategic Context ###\n{}\n### Your Task ###\n\
         1. Review the strategic context and each issue in the JSON list.\n\
         2. Select the {TOP_N} issues that most block the website's success.\n\
         3. Return only those issues, most critical first.\n\
         4. Keep the exact JSON structure of each issue, including every original field.\n\
         5. Do NOT select issues primarily about {exclusions}.\n\
         ### Critical Issues List (JSON) ###\n{list}",
        strategy_context(strategy)
    ))
}

/// Pick the contextual top five for a report.
///
/// Falls back to [`fallback_rank`] when there is no strategy result or no
/// pooled issue. Otherwise asks the model, drops excluded subjects and keeps
/// at most [`TOP_N`].
///
/// # Errors
/// Returns the gateway failure, or a parse error when the model does not
/// answer with an array of issues.
pub async fn contextual_rank(
    gateway: &AnalysisGateway,
    catalog: &dyn PromptCatalog,
    report: &Map<String, Value>,
) -> Result<Vec<CriticalIssue>> {
    let issues = pool_issues(report);
    let strategy = report
        .get(ExpertKey::Strategy.label())
        .filter(|value| !value.is_null());

    let Some(strategy) = strategy.filter(|_| !issues.is_empty()) else {
        tracing::debug!(pooled = issues.len(), "using deterministic fallback rank");
        return Ok(fallback_rank(issues));
    };

    let request = StructuredRequest::new(
        catalog.rerank_instruction(),
        rerank_content(strategy, &issues)?,
        catalog.rerank_schema(),
    );
    let value = gateway
        .generate(&request)
        .await
        .map_err(|e| AuditError::analysis(CONTEXTUAL_ISSUES_KEY, e))?;

    let Value::Array(items) = value else {
        return Err(AuditError::Parse {
            section: CONTEXTUAL_ISSUES_KEY.to_string(),
            reason: "expected an array of issues".to_string(),
            raw: value.to_string(),
        });
    };

    let mut ranked: Vec<CriticalIssue> = items
        .into_iter()
        .filter_map(|item| serde_json::from_value(item).ok())
        .filter(|issue| !is_excluded(issue))
        .collect();
    ranked.truncate(TOP_N);
    Ok(ranked)
}
