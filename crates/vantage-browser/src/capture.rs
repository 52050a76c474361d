//! Evidence capture worker.
//!
//! One capture drives a browser page through navigation, layout
//! normalization and a lazy-load scroll pass, then takes a full-page
//! screenshot and extracts page text. The first desktop capture of an audit
//! also collects animation hints, DOM heuristics and rule engine results.
//!
//! A browser slot is held for the whole capture, retries included. Within an
//! attempt the page is closed and the session released exactly once each,
//! whatever happens in between.

use crate::actions::{page_path, BrowserSession, CapturePage, SessionProvider};
use crate::axe::AxeRunner;
use crate::error::{BrowserError, Result};
use crate::profile::DeviceProfile;
use crate::scripts;
use base64::Engine as _;
use std::sync::Arc;
use std::time::Duration;
use vantage_core::{
    AccessibilityHeuristics, BoundedSemaphore, BrowserConfig, CapturedEvidence, DeviceClass,
    NetworkIdleMode, RetryConfig, Screenshot,
};

/// What to capture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureRequest {
    pub url: String,
    pub device: DeviceClass,
    /// First page of the audit; with a desktop device this enables the
    /// accessibility and animation passes.
    pub first_page: bool,
}

impl CaptureRequest {
    pub fn new(url: impl Into<String>, device: DeviceClass, first_page: bool) -> Self {
        Self {
            url: url.into(),
            device,
            first_page,
        }
    }

    fn is_first_desktop(&self) -> bool {
        self.first_page && !self.device.is_mobile()
    }
}

/// Timing and retry knobs for the capture worker.
#[derive(Debug, Clone)]
pub struct CaptureSettings {
    pub user_agent: String,
    pub navigation_timeout: Duration,
    pub network_idle: NetworkIdleMode,
    pub network_idle_timeout: Duration,
    pub scroll_step_px: u32,
    pub scroll_interval: Duration,
    pub max_scrolls: u32,
    pub jpeg_quality: u8,
    pub retries: u32,
    pub retry_delay: Duration,
}

impl CaptureSettings {
    pub fn from_config(browser: &BrowserConfig, retry: &RetryConfig) -> Self {
        Self {
            user_agent: browser.user_agent.clone(),
            navigation_timeout: Duration::from_secs(browser.navigation_timeout_secs),
            network_idle: browser.network_idle,
            network_idle_timeout: Duration::from_millis(browser.network_idle_timeout_ms),
            scroll_step_px: browser.scroll_step_px,
            scroll_interval: Duration::from_millis(browser.scroll_interval_ms),
            max_scrolls: browser.max_scrolls,
            jpeg_quality: browser.jpeg_quality,
            retries: retry.capture_retries,
            retry_delay: Duration::from_millis(retry.capture_retry_delay_ms),
        }
    }
}

/// Captures page evidence under the shared browser-session limit.
#[derive(Clone)]
pub struct EvidenceCapturer {
    provider: Arc<dyn SessionProvider>,
    sessions: BoundedSemaphore,
    axe: Arc<AxeRunner>,
    settings: CaptureSettings,
}

impl EvidenceCapturer {
    pub fn new(
        provider: Arc<dyn SessionProvider>,
        sessions: BoundedSemaphore,
        axe: Arc<AxeRunner>,
        settings: CaptureSettings,
    ) -> Self {
        Self {
            provider,
            sessions,
            axe,
            settings,
        }
    }

    pub fn settings(&self) -> &CaptureSettings {
        &self.settings
    }

    /// Capture one (url, device class) pair.
    ///
    /// Makes up to `retries + 1` attempts with a fixed delay between them.
    pub async fn capture(&self, request: &CaptureRequest) -> Result<CapturedEvidence> {
        let path = page_path(&request.url)?;
        let _ticket = self.sessions.acquire().await;

        let max_attempts = self.settings.retries + 1;
        let mut attempt = 0;
        loop {
            attempt += 1;
            tracing::info!(
                url = %request.url,
                device = request.device.as_str(),
                attempt,
                "capturing page"
            );

            match self.attempt(request, &path).await {
                Ok(evidence) => return Ok(evidence),
                Err(e) if attempt < max_attempts => {
                    tracing::warn!(
                        url = %request.url,
                        attempt,
                        "capture attempt failed, retrying in {:?}: {e}",
                        self.settings.retry_delay
                    );
                    tokio::time::sleep(self.settings.retry_delay).await;
                }
                Err(e) => {
                    tracing::error!(url = %request.url, attempt, "capture failed: {e}");
                    return Err(BrowserError::RetriesExhausted {
                        attempts: attempt,
                        last_error: e.to_string(),
                    });
                }
            }
        }
    }

    async fn attempt(&self, request: &CaptureRequest, path: &str) -> Result<CapturedEvidence> {
        let session = self.provider.connect().await?;

        let page = match session.open_page().await {
            Ok(page) => page,
            Err(e) => {
                release_session(session).await;
                return Err(e);
            }
        };

        let outcome = self.drive(page.as_ref(), request, path).await;

        close_page(page).await;
        release_session(session).await;
        outcome
    }

    async fn drive(
        &self,
        page: &dyn CapturePage,
        request: &CaptureRequest,
        path: &str,
    ) -> Result<CapturedEvidence> {
        let settings = &self.settings;
        let profile = DeviceProfile::for_device(request.device, settings.user_agent.as_str());

        page.set_user_agent(&profile.user_agent).await?;
        page.set_viewport(&profile).await?;

        tokio::time::timeout(settings.navigation_timeout, page.navigate(&request.url))
            .await
            .map_err(|_| {
                BrowserError::Timeout(format!(
                    "navigation to {} exceeded {:?}",
                    request.url, settings.navigation_timeout
                ))
            })??;

        self.wait_for_network_idle(page).await?;

        page.evaluate_json(scripts::NORMALIZE_LAYOUT).await?;
        page.evaluate_json(&scripts::scroll_pass(
            settings.scroll_step_px,
            duration_ms(settings.scroll_interval),
            settings.max_scrolls,
        ))
        .await?;

        let image = page.screenshot_jpeg(settings.jpeg_quality).await?;
        let screenshot = Screenshot {
            path: path.to_string(),
            data: base64::engine::general_purpose::STANDARD.encode(image),
            is_mobile: request.device.is_mobile(),
        };

        let live_text = match page.evaluate_json(scripts::PAGE_TEXT).await? {
            serde_json::Value::String(text) => text,
            _ => String::new(),
        };

        let mut evidence = CapturedEvidence {
            screenshot,
            live_text,
            animation_data: None,
            accessibility_data: None,
            rule_results: None,
        };

        if request.is_first_desktop() {
            evidence.animation_data = Some(animation_hints(page).await?);
            evidence.accessibility_data = Some(heuristics(page).await?);

            // The rule engine is advisory; a failure here never fails capture.
            match self.axe.run(page).await {
                Ok(results) => evidence.rule_results = Some(results),
                Err(e) => tracing::error!(url = %request.url, "accessibility rule engine failed: {e}"),
            }
        }

        Ok(evidence)
    }

    async fn wait_for_network_idle(&self, page: &dyn CapturePage) -> Result<()> {
        let timeout = self.settings.network_idle_timeout;
        match self.settings.network_idle {
            NetworkIdleMode::Skip => Ok(()),
            NetworkIdleMode::BestEffort => {
                match tokio::time::timeout(timeout, page.wait_for_network_idle()).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => tracing::debug!("network idle check failed, continuing: {e}"),
                    Err(_) => tracing::debug!("network not idle after {timeout:?}, continuing"),
                }
                Ok(())
            }
            NetworkIdleMode::Required => tokio::time::timeout(timeout, page.wait_for_network_idle())
                .await
                .map_err(|_| BrowserError::Timeout(format!("network not idle after {timeout:?}")))?,
        }
    }
}

async fn animation_hints(page: &dyn CapturePage) -> Result<Vec<String>> {
    let value = page.evaluate_json(scripts::ANIMATION_HINTS).await?;
    serde_json::from_value(value)
        .map_err(|e| BrowserError::ScriptError(format!("animation hints: {e}")))
}

async fn heuristics(page: &dyn CapturePage) -> Result<AccessibilityHeuristics> {
    let value = page.evaluate_json(scripts::ACCESSIBILITY_HEURISTICS).await?;
    serde_json::from_value(value)
        .map_err(|e| BrowserError::ScriptError(format!("accessibility heuristics: {e}")))
}

async fn close_page(page: Box<dyn CapturePage>) {
    if let Err(e) = page.close().await {
        tracing::warn!("failed to close page: {e}");
    }
}

async fn release_session(session: Box<dyn BrowserSession>) {
    let kind = session.kind();
    if let Err(e) = session.release().await {
        tracing::warn!(?kind, "failed to release browser session: {e}");
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
