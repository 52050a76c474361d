//! Handlers behind `POST /api/audit`, one per `mode`.

use super::ndjson::spawn_stream;
use crate::error::ApiError;
use crate::state::AppState;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use vantage_browser::CaptureRequest;
use vantage_core::{
    AccessibilityHeuristics, AuditInput, AuditMode, CapturedEvidence, DeviceClass, ExpertKey,
    RuleResults, Screenshot,
};
use vantage_db::FinalizeRequest;
use vantage_llm::InlineImage;
use vantage_pipeline::coordinator::inline_image;
use vantage_pipeline::{
    contextual_rank, run_expert_stream, AuditRequest, CompetitorSide, ExpertContext,
    PerformanceMetrics, PerformanceReport,
};

/// Every mode the endpoint understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    ScrapeSinglePage,
    ScrapePerformance,
    Analyze(ExpertKey),
    AnalyzeCompetitor,
    ContextualRank,
    Finalize,
    GetAudit,
    RunAudit,
}

impl Mode {
    /// Parse the `mode` discriminator.
    pub fn parse(mode: &str) -> Option<Self> {
        let parsed = match mode {
            "scrape-single-page" => Self::ScrapeSinglePage,
            "scrape-performance" => Self::ScrapePerformance,
            "analyze-competitor" => Self::AnalyzeCompetitor,
            "contextual-rank" => Self::ContextualRank,
            "finalize" => Self::Finalize,
            "get-audit" => Self::GetAudit,
            "run-audit" => Self::RunAudit,
            other => return ExpertKey::from_mode(other).map(Self::Analyze),
        };
        Some(parsed)
    }
}

fn body<T: DeserializeOwned>(value: Value) -> Result<T, ApiError> {
    serde_json::from_value(value).map_err(|e| ApiError::BadRequest(format!("Invalid request body: {e}")))
}

/// Route one request to its handler.
pub async fn dispatch(state: AppState, payload: Value) -> Response {
    let mode = payload.get("mode").and_then(Value::as_str).unwrap_or_default();
    tracing::info!("[AUDIT] Request received for mode: {}", mode);

    let Some(mode) = Mode::parse(mode) else {
        return ApiError::BadRequest("Invalid mode specified.".to_string()).into_response();
    };

    let result = match mode {
        Mode::ScrapeSinglePage => scrape_single_page(&state, payload).await,
        Mode::ScrapePerformance => scrape_performance(&state, payload).await,
        Mode::Analyze(key) => analyze_expert(state, key, payload),
        Mode::AnalyzeCompetitor => analyze_competitor(state, payload),
        Mode::ContextualRank => rank(&state, payload).await,
        Mode::Finalize => finalize(&state, payload).await,
        Mode::GetAudit => get_audit(&state, payload).await,
        Mode::RunAudit => run_audit(state, payload),
    };
    result.unwrap_or_else(|e| e.into_response())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScrapeBody {
    url: String,
    #[serde(default)]
    is_mobile: bool,
    #[serde(default)]
    is_first_page: bool,
}

/// Capture result with the rule engine output flattened next to the page data.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ScrapeResponse {
    screenshot: Screenshot,
    live_text: String,
    animation_data: Option<Vec<String>>,
    accessibility_data: Option<AccessibilityHeuristics>,
    axe_violations: Option<Vec<Value>>,
    axe_passes: Option<Vec<Value>>,
    axe_incomplete: Option<Vec<Value>>,
    axe_inapplicable: Option<Vec<Value>>,
}

impl From<CapturedEvidence> for ScrapeResponse {
    fn from(evidence: CapturedEvidence) -> Self {
        let rules = evidence.rule_results;
        let (violations, passes, incomplete, inapplicable) = match rules {
            Some(r) => (Some(r.violations), Some(r.passes), Some(r.incomplete), Some(r.inapplicable)),
            None => (None, None, None, None),
        };
        Self {
            screenshot: evidence.screenshot,
            live_text: evidence.live_text,
            animation_data: evidence.animation_data,
            accessibility_data: evidence.accessibility_data,
            axe_violations: violations,
            axe_passes: passes,
            axe_incomplete: incomplete,
            axe_inapplicable: inapplicable,
        }
    }
}

async fn scrape_single_page(state: &AppState, payload: Value) -> Result<Response, ApiError> {
    let req: ScrapeBody = body(payload)?;
    let device = if req.is_mobile {
        DeviceClass::Mobile
    } else {
        DeviceClass::Desktop
    };

    let evidence = state
        .evidence
        .capture(&CaptureRequest::new(req.url, device, req.is_first_page))
        .await
        .map_err(|e| ApiError::failed("Scraping", e))?;
    Ok(Json(ScrapeResponse::from(evidence)).into_response())
}

#[derive(Debug, Deserialize)]
struct UrlBody {
    url: String,
}

async fn scrape_performance(state: &AppState, payload: Value) -> Result<Response, ApiError> {
    let req: UrlBody = body(payload)?;
    let report = match state.coordinator.performance() {
        Some(client) => client.lookup(&req.url).await,
        None => PerformanceReport {
            performance_data: None,
            error: Some("Performance lookups are disabled.".to_string()),
        },
    };
    Ok(Json(report).into_response())
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ExpertBody {
    url: String,
    screenshot_base64: Option<String>,
    mobile_screenshot_base64: Option<String>,
    screenshot_mime_type: Option<String>,
    live_text: String,
    performance_data: Option<PerformanceMetrics>,
    performance_analysis_error: Option<String>,
    animation_data: Option<Vec<String>>,
    accessibility_data: Option<AccessibilityHeuristics>,
    axe_violations: Option<Vec<Value>>,
    axe_passes: Vec<Value>,
    axe_incomplete: Vec<Value>,
    axe_inapplicable: Vec<Value>,
}

impl ExpertBody {
    fn context(&self) -> ExpertContext {
        let performance = (self.performance_data.is_some()
            || self.performance_analysis_error.is_some())
        .then(|| PerformanceReport {
            performance_data: self.performance_data.clone(),
            error: self.performance_analysis_error.clone(),
        });

        ExpertContext {
            url: self.url.clone(),
            performance,
            animation_hints: self.animation_data.clone(),
            heuristics: self.accessibility_data,
            multi_page: self.live_text.matches("--- CONTENT FROM").count() > 1,
            mobile_captured: self.mobile_screenshot_base64.is_some(),
        }
    }

    fn rule_results(&mut self) -> Option<RuleResults> {
        self.axe_violations.take().map(|violations| RuleResults {
            violations,
            passes: std::mem::take(&mut self.axe_passes),
            incomplete: std::mem::take(&mut self.axe_incomplete),
            inapplicable: std::mem::take(&mut self.axe_inapplicable),
        })
    }

    fn images(&self) -> Vec<InlineImage> {
        let desktop = self.screenshot_base64.as_deref().map(|data| {
            match self.screenshot_mime_type.as_deref() {
                Some(mime) if !mime.is_empty() => InlineImage {
                    mime_type: mime.to_string(),
                    data: data.to_string(),
                },
                _ => inline_image(data),
            }
        });
        let mobile = self.mobile_screenshot_base64.as_deref().map(inline_image);
        desktop.into_iter().chain(mobile).collect()
    }
}

fn analyze_expert(state: AppState, key: ExpertKey, payload: Value) -> Result<Response, ApiError> {
    let mut req: ExpertBody = body(payload)?;
    let context = req.context();
    let rules = req.rule_results();
    let images = req.images();

    Ok(spawn_stream(move |sink| async move {
        run_expert_stream(
            &sink,
            key.label(),
            state
                .coordinator
                .analyze_expert(key, &context, rules.as_ref(), &req.live_text, &images),
        )
        .await;
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CompetitorBody {
    primary_url: String,
    primary_screenshot_base64: Option<String>,
    #[serde(default)]
    primary_live_text: String,
    competitor_url: String,
    competitor_screenshot_base64: Option<String>,
    #[serde(default)]
    competitor_live_text: String,
}

fn analyze_competitor(state: AppState, payload: Value) -> Result<Response, ApiError> {
    let req: CompetitorBody = body(payload)?;
    let primary = CompetitorSide {
        url: req.primary_url,
        text: req.primary_live_text,
        screenshot: req.primary_screenshot_base64,
    };
    let competitor = CompetitorSide {
        url: req.competitor_url,
        text: req.competitor_live_text,
        screenshot: req.competitor_screenshot_base64,
    };

    Ok(spawn_stream(move |sink| async move {
        run_expert_stream(
            &sink,
            ExpertKey::Competitor.label(),
            state.coordinator.analyze_competitor(&primary, &competitor),
        )
        .await;
    }))
}

#[derive(Debug, Deserialize)]
struct RankBody {
    report: Map<String, Value>,
}

async fn rank(state: &AppState, payload: Value) -> Result<Response, ApiError> {
    let req: RankBody = body(payload)?;
    let issues = contextual_rank(
        state.coordinator.gateway(),
        state.coordinator.catalog(),
        &req.report,
    )
    .await
    .map_err(|e| ApiError::failed("Contextual ranking", e))?;
    Ok(Json(issues).into_response())
}

#[derive(Debug, Deserialize)]
struct FinalizeBody {
    url: String,
    report: Value,
    #[serde(default)]
    screenshots: Vec<Screenshot>,
}

async fn finalize(state: &AppState, payload: Value) -> Result<Response, ApiError> {
    let req: FinalizeBody = body(payload)?;
    let finalized = state
        .coordinator
        .store()
        .finalize(FinalizeRequest {
            url: req.url,
            report: req.report,
            screenshots: req.screenshots,
        })
        .await
        .map_err(|e| ApiError::failed("Finalization", e))?;

    Ok(Json(json!({
        "auditId": finalized.audit_id.as_str(),
        "screenshotUrl": finalized.screenshot_url,
    }))
    .into_response())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GetAuditBody {
    #[serde(default)]
    audit_id: Option<String>,
}

async fn get_audit(state: &AppState, payload: Value) -> Result<Response, ApiError> {
    let req: GetAuditBody = body(payload)?;
    let audit_id = req
        .audit_id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| ApiError::BadRequest("auditId is required.".to_string()))?;

    let record = state
        .coordinator
        .store()
        .fetch(&audit_id)
        .await
        .map_err(|e| ApiError::failed("Get audit", e))?
        .ok_or_else(|| ApiError::NotFound("Audit not found.".to_string()))?;

    Ok(Json(json!({
        "report": record.report_data,
        "url": record.url,
        "screenshotUrl": record.screenshot_url,
    }))
    .into_response())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RunAuditBody {
    inputs: Vec<AuditInput>,
    #[serde(default)]
    audit_mode: AuditMode,
}

fn run_audit(state: AppState, payload: Value) -> Result<Response, ApiError> {
    let req: RunAuditBody = body(payload)?;
    if req.inputs.is_empty() {
        return Err(ApiError::BadRequest("At least one input is required.".to_string()));
    }
    let request = AuditRequest {
        inputs: req.inputs,
        mode: req.audit_mode,
    };

    Ok(spawn_stream(move |sink| async move {
        // Failures are already on the stream as an error frame.
        let _ = state.coordinator.run(request, &sink).await;
    }))
}
