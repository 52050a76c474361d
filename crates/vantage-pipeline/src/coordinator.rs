//! Pipeline coordinator.
//!
//! Drives one audit from its inputs to a persisted report:
//! acquisition, the expert fan-out (or the competitor comparison), the
//! contextual re-rank and finalize. Progress goes out on a [`FrameSink`]
//! as it happens.

use crate::acquisition::{Acquirer, Acquisition, EvidenceSource};
use crate::catalog::{expert_content, ExpertContext, PromptCatalog};
use crate::error::{AuditError, Result};
use crate::performance::{PerformanceClient, PerformanceReport};
use crate::report::{AuditReport, CONTEXTUAL_ISSUES_KEY};
use crate::rerank::contextual_rank;
use crate::stream::{run_expert_stream, CompletePayload, FrameSink};
use futures::future::try_join_all;
use futures::stream::{FuturesUnordered, StreamExt};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use vantage_core::{
    AuditId, AuditInput, AuditMode, BoundedSemaphore, ExpertKey, InputKind, InputRole,
    LimitsConfig, RuleResults, Screenshot,
};
use vantage_db::{AuditStore, FinalizeRequest};
use vantage_llm::{AnalysisGateway, InlineImage, StructuredRequest};

/// Characters of each site's text sent to the competitor comparison.
pub const COMPETITOR_TEXT_LIMIT: usize = 15_000;

/// Where an audit is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditPhase {
    Acquiring,
    Analyzing,
    Reranking,
    Finalizing,
    Done,
    Failed,
}

impl fmt::Display for AuditPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Acquiring => "acquiring",
            Self::Analyzing => "analyzing",
            Self::Reranking => "reranking",
            Self::Finalizing => "finalizing",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Per-audit tuning.
#[derive(Debug, Clone, Copy)]
pub struct CoordinatorSettings {
    /// Experts of one audit that may run at once
    pub experts_per_audit: usize,
    /// Pause between primary and competitor acquisition
    pub acquisition_pause: Duration,
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self::from(&LimitsConfig::default())
    }
}

impl From<&LimitsConfig> for CoordinatorSettings {
    fn from(limits: &LimitsConfig) -> Self {
        Self {
            experts_per_audit: limits.experts_per_audit.max(1),
            acquisition_pause: Duration::from_millis(limits.acquisition_pause_ms),
        }
    }
}

/// One audit to run.
#[derive(Debug, Clone, Default)]
pub struct AuditRequest {
    pub inputs: Vec<AuditInput>,
    pub mode: AuditMode,
}

/// A finished, persisted audit.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditOutcome {
    pub audit_id: AuditId,
    pub screenshot_url: Option<String>,
    pub report: Value,
}

/// One site of a competitor comparison.
#[derive(Debug, Clone)]
pub struct CompetitorSide {
    pub url: String,
    pub text: String,
    /// Base64 screenshot, if one was captured
    pub screenshot: Option<String>,
}

/// Lifecycle of a single audit run. Evidence and expert results live in
/// the run's own [`Acquisition`] and [`AuditReport`], never in shared state.
struct AuditContext {
    mode: AuditMode,
    phase: AuditPhase,
}

impl AuditContext {
    fn new(mode: AuditMode) -> Self {
        Self {
            mode,
            phase: AuditPhase::Acquiring,
        }
    }

    fn enter(&mut self, phase: AuditPhase) {
        tracing::debug!(
            mode = ?self.mode,
            from = %self.phase,
            to = %phase,
            "audit phase transition"
        );
        self.phase = phase;
    }
}

/// Runs audits end to end.
#[derive(Clone)]
pub struct Coordinator {
    evidence: Arc<dyn EvidenceSource>,
    gateway: AnalysisGateway,
    catalog: Arc<dyn PromptCatalog>,
    store: Arc<dyn AuditStore>,
    performance: Option<PerformanceClient>,
    settings: CoordinatorSettings,
}

impl Coordinator {
    #[must_use]
    pub fn new(
        evidence: Arc<dyn EvidenceSource>,
        gateway: AnalysisGateway,
        catalog: Arc<dyn PromptCatalog>,
        store: Arc<dyn AuditStore>,
        settings: CoordinatorSettings,
    ) -> Self {
        Self {
            evidence,
            gateway,
            catalog,
            store,
            performance: None,
            settings,
        }
    }

    /// Look up performance metrics for the primary URL of every audit.
    #[must_use]
    pub fn with_performance(mut self, client: PerformanceClient) -> Self {
        self.performance = Some(client);
        self
    }

    #[must_use]
    pub fn gateway(&self) -> &AnalysisGateway {
        &self.gateway
    }

    #[must_use]
    pub fn catalog(&self) -> &dyn PromptCatalog {
        self.catalog.as_ref()
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn AuditStore> {
        &self.store
    }

    #[must_use]
    pub fn performance(&self) -> Option<&PerformanceClient> {
        self.performance.as_ref()
    }

    /// Run one audit, streaming progress to `sink`.
    ///
    /// A hard failure is also reported as an `error` frame without a key,
    /// and no `complete` frame is sent.
    pub async fn run(&self, request: AuditRequest, sink: &FrameSink) -> Result<AuditOutcome> {
        let mut ctx = AuditContext::new(request.mode);
        match self.run_phases(&mut ctx, request, sink).await {
            Ok(outcome) => {
                ctx.enter(AuditPhase::Done);
                sink.complete(CompletePayload {
                    audit_id: outcome.audit_id.as_str().to_string(),
                    screenshot_url: outcome.screenshot_url.clone(),
                    report: outcome.report.clone(),
                });
                Ok(outcome)
            }
            Err(e) => {
                ctx.enter(AuditPhase::Failed);
                tracing::error!("Audit failed: {}", e);
                sink.error(None, e.to_string());
                Err(e)
            }
        }
    }

    async fn run_phases(
        &self,
        ctx: &mut AuditContext,
        request: AuditRequest,
        sink: &FrameSink,
    ) -> Result<AuditOutcome> {
        let inputs = assign_roles(request.inputs, request.mode)?;
        let primary_url = inputs
            .iter()
            .find(|(input, _)| input.kind == InputKind::Url)
            .and_then(|(input, _)| input.url.clone());

        tracing::info!(mode = ?request.mode, inputs = inputs.len(), "Audit started");
        sink.status("Starting evidence acquisition...");
        let acquirer = Acquirer::new(self.evidence.as_ref(), sink)
            .with_pause_between_roles(self.settings.acquisition_pause);

        let (acquisition, performance) = match (&self.performance, &primary_url) {
            (Some(client), Some(url)) if request.mode == AuditMode::Standard => {
                sink.status("Fetching performance metrics...");
                let (acquisition, report) =
                    tokio::join!(acquirer.acquire(&inputs), client.lookup(url));
                (acquisition, Some(report))
            }
            _ => (acquirer.acquire(&inputs).await, None),
        };

        if acquisition.is_empty() {
            return Err(AuditError::FatalAcquisition {
                attempted: acquisition.attempted,
            });
        }

        ctx.enter(AuditPhase::Analyzing);
        let report = match request.mode {
            AuditMode::Standard => {
                let mut report = self.analyze_standard(&acquisition, performance, sink).await;
                ctx.enter(AuditPhase::Reranking);
                self.rerank(&mut report, sink).await;
                report
            }
            AuditMode::Competitor => self.analyze_competitor_audit(&acquisition, sink).await?,
        };

        ctx.enter(AuditPhase::Finalizing);
        sink.status("Saving audit...");
        let report = report.to_json().map_err(|e| AuditError::Parse {
            section: "report".to_string(),
            reason: e.to_string(),
            raw: String::new(),
        })?;
        let url = primary_url.unwrap_or_else(|| {
            acquisition
                .inputs
                .first()
                .map(|input| input.label.clone())
                .unwrap_or_default()
        });

        let finalized = self
            .store
            .finalize(FinalizeRequest {
                url,
                report: Value::Object(report),
                screenshots: acquisition.screenshots,
            })
            .await?;

        tracing::info!(audit_id = %finalized.audit_id, "Audit finalized");
        Ok(AuditOutcome {
            audit_id: finalized.audit_id,
            screenshot_url: finalized.screenshot_url,
            report: finalized.report,
        })
    }

    async fn analyze_standard(
        &self,
        acquisition: &Acquisition,
        performance: Option<PerformanceReport>,
        sink: &FrameSink,
    ) -> AuditReport {
        let context = ExpertContext {
            url: acquisition
                .inputs
                .first()
                .map(|input| input.label.clone())
                .unwrap_or_default(),
            performance,
            animation_hints: acquisition.animation_hints.clone(),
            heuristics: acquisition.heuristics,
            multi_page: acquisition.inputs.len() > 1,
            mobile_captured: acquisition.mobile_screenshot.is_some(),
        };
        let text = acquisition.combined_text();
        let images: Vec<InlineImage> = acquisition
            .primary_screenshot()
            .into_iter()
            .chain(acquisition.mobile_screenshot())
            .map(|s| inline_image(&s.data))
            .collect();

        let limiter = BoundedSemaphore::new("audit-experts", self.settings.experts_per_audit);
        let mut pending = FuturesUnordered::new();

        for key in ExpertKey::STANDARD {
            let limiter = limiter.clone();
            let context = &context;
            let text = text.as_str();
            let images = images.as_slice();
            pending.push(async move {
                let _ticket = limiter.acquire().await;
                let result = run_expert_stream(
                    sink,
                    key.label(),
                    self.analyze_expert(
                        key,
                        context,
                        acquisition.rule_results.as_ref(),
                        text,
                        images,
                    ),
                )
                .await;
                (key, result)
            });
        }

        let mut report = AuditReport::default();
        while let Some((key, result)) = pending.next().await {
            if let Some(value) = result {
                report.insert(key, value);
            }
        }
        tracing::info!(
            succeeded = report.experts.len(),
            total = ExpertKey::STANDARD.len(),
            "Expert analysis finished"
        );
        report
    }

    async fn rerank(&self, report: &mut AuditReport, sink: &FrameSink) {
        if report.experts.is_empty() {
            return;
        }
        sink.status("Ranking critical issues in context...");

        let experts = match report.to_json() {
            Ok(map) => map,
            Err(e) => {
                tracing::error!("Could not serialize expert results: {}", e);
                return;
            }
        };

        match contextual_rank(&self.gateway, self.catalog.as_ref(), &experts).await {
            Ok(issues) => {
                match serde_json::to_value(&issues) {
                    Ok(value) => sink.data(CONTEXTUAL_ISSUES_KEY, value),
                    Err(e) => tracing::error!("Could not serialize contextual issues: {}", e),
                }
                report.contextual_issues = Some(issues);
                sink.status("✓ Contextual ranking complete.");
            }
            Err(e) => {
                tracing::warn!("Contextual ranking failed: {}", e);
                sink.status(format!("⚠ Contextual ranking unavailable: {e}"));
            }
        }
    }

    async fn analyze_competitor_audit(
        &self,
        acquisition: &Acquisition,
        sink: &FrameSink,
    ) -> Result<AuditReport> {
        let side = |role: InputRole| {
            acquisition
                .first_with_role(role)
                .map(|input| CompetitorSide {
                    url: input.label.clone(),
                    text: input.text.clone(),
                    screenshot: acquisition
                        .screenshots
                        .get(input.screenshot)
                        .map(|s: &Screenshot| s.data.clone()),
                })
                .ok_or_else(|| AuditError::Acquisition {
                    input: format!("{role:?} site").to_lowercase(),
                    message: "no evidence was acquired".to_string(),
                })
        };
        let primary = side(InputRole::Primary)?;
        let competitor = side(InputRole::Competitor)?;

        let key = ExpertKey::Competitor;
        let mut report = AuditReport::default();
        if let Some(value) =
            run_expert_stream(sink, key.label(), self.analyze_competitor(&primary, &competitor))
                .await
        {
            report.insert(key, value);
        }
        Ok(report)
    }

    /// Run one standard expert.
    pub async fn analyze_expert(
        &self,
        key: ExpertKey,
        context: &ExpertContext,
        rule_results: Option<&RuleResults>,
        live_text: &str,
        images: &[InlineImage],
    ) -> Result<Value> {
        let mut request = StructuredRequest::new(
            self.catalog.system_instruction(key, context),
            expert_content(key, context, rule_results, live_text),
            self.catalog.schema(key),
        );
        for image in images {
            request = request.with_image(image.clone());
        }

        self.gateway
            .generate(&request)
            .await
            .map_err(|e| AuditError::analysis(key.label(), e))
    }

    /// Compare two sites. The schema halves are generated in parallel and
    /// merged into one object.
    pub async fn analyze_competitor(
        &self,
        primary: &CompetitorSide,
        competitor: &CompetitorSide,
    ) -> Result<Value> {
        let key = ExpertKey::Competitor;
        let content = competitor_content(primary, competitor);
        let images: Vec<InlineImage> = [primary, competitor]
            .iter()
            .filter_map(|side| side.screenshot.as_deref())
            .map(inline_image)
            .collect();
        let instruction = self
            .catalog
            .system_instruction(key, &ExpertContext::default());

        let calls = self.catalog.competitor_partitions().into_iter().map(|part| {
            let mut request = StructuredRequest::new(
                format!("{instruction}\n\n{}", part.focus),
                content.clone(),
                part.schema,
            );
            for image in &images {
                request = request.with_image(image.clone());
            }
            async move {
                self.gateway
                    .generate(&request)
                    .await
                    .map_err(|e| AuditError::analysis(key.label(), e))
            }
        });

        let mut merged = Map::new();
        for part in try_join_all(calls).await? {
            if let Value::Object(fields) = part {
                merged.extend(fields);
            }
        }
        Ok(Value::Object(merged))
    }
}

/// Pair every input with its role, primary inputs first.
///
/// In competitor mode an input without a role is primary when it comes
/// first and competitor otherwise.
fn assign_roles(
    inputs: Vec<AuditInput>,
    mode: AuditMode,
) -> Result<Vec<(AuditInput, InputRole)>> {
    if inputs.is_empty() {
        return Err(AuditError::InvalidInput("at least one input is required".to_string()));
    }

    match mode {
        AuditMode::Standard => Ok(inputs
            .into_iter()
            .map(|input| (input, InputRole::Primary))
            .collect()),
        AuditMode::Competitor => {
            if inputs.len() < 2 {
                return Err(AuditError::InvalidInput(
                    "a competitor audit needs a primary and a competitor input".to_string(),
                ));
            }
            let (mut primary, competitor): (Vec<_>, Vec<_>) = inputs
                .into_iter()
                .enumerate()
                .map(|(index, input)| {
                    let role = input.role.unwrap_or(if index == 0 {
                        InputRole::Primary
                    } else {
                        InputRole::Competitor
                    });
                    (input, role)
                })
                .partition(|(_, role)| *role == InputRole::Primary);
            primary.extend(competitor);
            Ok(primary)
        }
    }
}

/// Truncate to `limit` characters, marking the cut.
fn truncate_chars(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((cut, _)) => format!("{}... (truncated)", &text[..cut]),
        None => text.to_string(),
    }
}

/// User content for the competitor comparison.
#[must_use]
pub fn competitor_content(primary: &CompetitorSide, competitor: &CompetitorSide) -> String {
    format!(
        "\n### PRIMARY WEBSITE ###\n- URL: {}\n- Content: {}\n\n### COMPETITOR WEBSITE ###\n- URL: {}\n- Content: {}\n",
        primary.url,
        truncate_chars(&primary.text, COMPETITOR_TEXT_LIMIT),
        competitor.url,
        truncate_chars(&competitor.text, COMPETITOR_TEXT_LIMIT),
    )
}

/// Inline image for base64 data, PNG when the bytes say so.
#[must_use]
pub fn inline_image(data: &str) -> InlineImage {
    if data.starts_with("iVBOR") {
        InlineImage::png(data)
    } else {
        InlineImage::jpeg(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn side(url: &str, text: &str) -> CompetitorSide {
        CompetitorSide {
            url: url.to_string(),
            text: text.to_string(),
            screenshot: None,
        }
    }

    #[test]
    fn test_settings_from_limits() {
        let settings = CoordinatorSettings::from(&LimitsConfig {
            experts_per_audit: 0,
            acquisition_pause_ms: 1500,
            ..LimitsConfig::default()
        });
        assert_eq!(settings.experts_per_audit, 1);
        assert_eq!(settings.acquisition_pause, Duration::from_millis(1500));
    }

    #[test]
    fn test_competitor_content_truncates_by_chars() {
        let long = "é".repeat(COMPETITOR_TEXT_LIMIT + 10);
        let content = competitor_content(&side("https://a.com", &long), &side("https://b.com", "short"));

        assert!(content.starts_with("\n### PRIMARY WEBSITE ###\n- URL: https://a.com\n"));
        assert!(content.contains("... (truncated)"));
        assert!(content.contains("### COMPETITOR WEBSITE ###\n- URL: https://b.com\n- Content: short\n"));
        let primary_part = content.split("### COMPETITOR").next().unwrap();
        assert_eq!(primary_part.matches('é').count(), COMPETITOR_TEXT_LIMIT);
    }

    #[test]
    fn test_assign_roles_orders_primary_first() {
        let inputs = vec![
            AuditInput::url("https://rival.com").with_role(InputRole::Competitor),
            AuditInput::url("https://mine.com").with_role(InputRole::Primary),
        ];
        let assigned = assign_roles(inputs, AuditMode::Competitor).unwrap();
        assert_eq!(assigned[0].0.url.as_deref(), Some("https://mine.com"));
        assert_eq!(assigned[0].1, InputRole::Primary);
        assert_eq!(assigned[1].1, InputRole::Competitor);
    }

    #[test]
    fn test_assign_roles_defaults_by_position() {
        let inputs = vec![AuditInput::url("https://a.com"), AuditInput::url("https://b.com")];
        let assigned = assign_roles(inputs, AuditMode::Competitor).unwrap();
        assert_eq!(assigned[0].1, InputRole::Primary);
        assert_eq!(assigned[1].1, InputRole::Competitor);
    }

    #[test]
    fn test_assign_roles_rejects_bad_requests() {
        assert!(matches!(
            assign_roles(Vec::new(), AuditMode::Standard),
            Err(AuditError::InvalidInput(_))
        ));
        assert!(matches!(
            assign_roles(vec![AuditInput::url("https://a.com")], AuditMode::Competitor),
            Err(AuditError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_inline_image_sniffs_png() {
        assert_eq!(inline_image("iVBORw0KGgo=").mime_type, "image/png");
        assert_eq!(inline_image("/9j/4AAQ").mime_type, "image/jpeg");
    }

    #[test]
    fn test_phase_display() {
        assert_eq!(AuditPhase::Reranking.to_string(), "reranking");
    }
}
