//! Evidence acquisition for every input of one audit.
//!
//! Inputs are processed strictly in order. A failing input is reported on
//! the stream and skipped; the caller decides whether what is left is enough.

use crate::error::AuditError;
use crate::stream::FrameSink;
use async_trait::async_trait;
use base64::Engine as _;
use std::time::Duration;
use vantage_browser::{BrowserError, CaptureRequest, EvidenceCapturer};
use vantage_core::{
    AccessibilityHeuristics, AuditInput, CapturedEvidence, DeviceClass, InputKind, InputRole,
    RuleResults, Screenshot,
};

/// Placeholder for inputs that yielded no text.
pub const NO_TEXT: &str = "(No text found)";

/// Path recorded for uploaded screenshots.
pub const UPLOAD_PATH: &str = "upload";

/// Something that can capture a page. Implemented by the browser worker.
#[async_trait]
pub trait EvidenceSource: Send + Sync {
    async fn capture(&self, request: &CaptureRequest) -> Result<CapturedEvidence, BrowserError>;
}

#[async_trait]
impl EvidenceSource for EvidenceCapturer {
    async fn capture(&self, request: &CaptureRequest) -> Result<CapturedEvidence, BrowserError> {
        EvidenceCapturer::capture(self, request).await
    }
}

/// One input that produced evidence.
#[derive(Debug, Clone)]
pub struct AcquiredInput {
    /// URL, or `uploaded image`
    pub label: String,
    pub role: InputRole,
    /// Page text, empty for uploads
    pub text: String,
    /// Index of this input's desktop screenshot in [`Acquisition::screenshots`]
    pub screenshot: usize,
}

/// Everything acquisition produced for one audit.
#[derive(Debug, Clone, Default)]
pub struct Acquisition {
    pub inputs: Vec<AcquiredInput>,
    /// In acquisition order; this order drives storage keys at finalize
    pub screenshots: Vec<Screenshot>,
    pub animation_hints: Option<Vec<String>>,
    pub heuristics: Option<AccessibilityHeuristics>,
    pub rule_results: Option<RuleResults>,
    /// Index of the mobile screenshot, if mobile capture succeeded
    pub mobile_screenshot: Option<usize>,
    /// Number of inputs attempted
    pub attempted: usize,
}

/// The `--- CONTENT FROM <label> ---` block for one input.
#[must_use]
pub fn text_block(label: &str, text: &str) -> String {
    let body = if text.trim().is_empty() { NO_TEXT } else { text };
    format!("\n\n--- CONTENT FROM {label} ---\n{body}\n\n")
}

impl Acquisition {
    /// Whether nothing was acquired.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty()
    }

    /// Tagged text of every acquired input, in order.
    #[must_use]
    pub fn combined_text(&self) -> String {
        self.inputs
            .iter()
            .map(|input| text_block(&input.label, &input.text))
            .collect()
    }

    /// First non-mobile screenshot.
    #[must_use]
    pub fn primary_screenshot(&self) -> Option<&Screenshot> {
        self.screenshots.iter().find(|s| !s.is_mobile)
    }

    #[must_use]
    pub fn mobile_screenshot(&self) -> Option<&Screenshot> {
        self.mobile_screenshot.and_then(|i| self.screenshots.get(i))
    }

    /// First acquired input with `role`.
    #[must_use]
    pub fn first_with_role(&self, role: InputRole) -> Option<&AcquiredInput> {
        self.inputs.iter().find(|input| input.role == role)
    }

    fn push_screenshot(&mut self, screenshot: Screenshot) -> usize {
        self.screenshots.push(screenshot);
        self.screenshots.len() - 1
    }

    fn absorb_first_page(&mut self, evidence: &mut CapturedEvidence) {
        if self.animation_hints.is_none() {
            self.animation_hints = evidence.animation_data.take();
        }
        if self.heuristics.is_none() {
            self.heuristics = evidence.accessibility_data.take();
        }
        if self.rule_results.is_none() {
            self.rule_results = evidence.rule_results.take();
        }
    }
}

/// Sequential acquisition of an audit's inputs.
pub struct Acquirer<'a> {
    source: &'a dyn EvidenceSource,
    sink: &'a FrameSink,
    pause_between_roles: Option<Duration>,
}

impl<'a> Acquirer<'a> {
    pub fn new(source: &'a dyn EvidenceSource, sink: &'a FrameSink) -> Self {
        Self {
            source,
            sink,
            pause_between_roles: None,
        }
    }

    /// Wait this long when the inputs switch from one role to the next.
    #[must_use]
    pub fn with_pause_between_roles(mut self, pause: Duration) -> Self {
        self.pause_between_roles = Some(pause);
        self
    }

    /// Acquire every input in order. The first input also gets a mobile
    /// capture and the first-page accessibility and animation passes.
    pub async fn acquire(&self, inputs: &[(AuditInput, InputRole)]) -> Acquisition {
        let mut acquisition = Acquisition {
            attempted: inputs.len(),
            ..Acquisition::default()
        };
        let mut previous_role = None;

        for (index, (input, role)) in inputs.iter().enumerate() {
            if let (Some(pause), Some(previous)) = (self.pause_between_roles, previous_role) {
                if previous != *role && !pause.is_zero() {
                    tracing::debug!("pausing {:?} before {:?} inputs", pause, role);
                    self.sink
                        .status(format!("Waiting {}s before the next site...", pause.as_secs()));
                    tokio::time::sleep(pause).await;
                }
            }
            previous_role = Some(*role);

            if let Err(e) = self
                .acquire_one(&mut acquisition, index == 0, input, *role)
                .await
            {
                tracing::warn!("{}", e);
                self.sink.status(format!("⚠ Skipping input: {e}"));
            }
        }

        tracing::info!(
            acquired = acquisition.inputs.len(),
            attempted = acquisition.attempted,
            "Acquisition finished"
        );
        acquisition
    }

    async fn acquire_one(
        &self,
        acquisition: &mut Acquisition,
        first: bool,
        input: &AuditInput,
        role: InputRole,
    ) -> Result<(), AuditError> {
        let label = input.label().to_string();
        let failed = |message: String| AuditError::Acquisition {
            input: label.clone(),
            message,
        };

        match input.kind {
            InputKind::Url => {
                let url = input
                    .url
                    .as_deref()
                    .filter(|u| !u.trim().is_empty())
                    .ok_or_else(|| failed("no url given".to_string()))?;

                self.sink.status(format!("Capturing {url}..."));
                let mut evidence = self
                    .source
                    .capture(&CaptureRequest::new(url, DeviceClass::Desktop, first))
                    .await
                    .map_err(|e| failed(e.to_string()))?;

                if first {
                    acquisition.absorb_first_page(&mut evidence);
                }
                let screenshot = acquisition.push_screenshot(evidence.screenshot);
                acquisition.inputs.push(AcquiredInput {
                    label: label.clone(),
                    role,
                    text: evidence.live_text,
                    screenshot,
                });

                if first {
                    self.sink.status(format!("Capturing mobile view of {url}..."));
                    match self
                        .source
                        .capture(&CaptureRequest::new(url, DeviceClass::Mobile, false))
                        .await
                    {
                        Ok(mobile) => {
                            let index = acquisition.push_screenshot(mobile.screenshot);
                            acquisition.mobile_screenshot = Some(index);
                        }
                        Err(e) => {
                            tracing::warn!("Mobile capture failed for {}: {}", url, e);
                            self.sink
                                .status(format!("⚠ Mobile capture failed for {url}: {e}"));
                        }
                    }
                }
            }
            InputKind::Upload => {
                let data = input
                    .file_bytes
                    .as_deref()
                    .map(strip_data_url)
                    .filter(|d| !d.is_empty())
                    .ok_or_else(|| failed("no file data given".to_string()))?;

                base64::engine::general_purpose::STANDARD
                    .decode(data)
                    .map_err(|e| failed(format!("file is not valid base64: {e}")))?;

                let screenshot = acquisition.push_screenshot(Screenshot {
                    path: UPLOAD_PATH.to_string(),
                    data: data.to_string(),
                    is_mobile: false,
                });
                acquisition.inputs.push(AcquiredInput {
                    label,
                    role,
                    text: String::new(),
                    screenshot,
                });
            }
        }
        Ok(())
    }
}

/// Drop a `data:image/...;base64,` prefix if present.
fn strip_data_url(data: &str) -> &str {
    let data = data.trim();
    match data.strip_prefix("data:") {
        Some(rest) => rest.split_once(',').map_or(rest, |(_, payload)| payload),
        None => data,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_block_format() {
        assert_eq!(
            text_block("https://a.com", "Hello"),
            "\n\n--- CONTENT FROM https://a.com ---\nHello\n\n"
        );
        assert_eq!(
            text_block("uploaded image", "  "),
            "\n\n--- CONTENT FROM uploaded image ---\n(No text found)\n\n"
        );
    }

    #[test]
    fn test_strip_data_url() {
        assert_eq!(strip_data_url("data:image/png;base64,iVBORw=="), "iVBORw==");
        assert_eq!(strip_data_url(" /9j/4A== "), "/9j/4A==");
    }
}
