//! axe-core accessibility rule engine runner.
//!
//! The engine script is loaded once per process, from a local file when one is
//! configured and from the configured URL otherwise, then injected into each
//! page that needs auditing.

use crate::actions::CapturePage;
use crate::error::{BrowserError, Result};
use crate::scripts;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::OnceCell;
use vantage_core::{BrowserConfig, RuleResults};

/// Rule tags the engine is restricted to.
pub const RULE_TAGS: &[&str] = &["wcag2a", "wcag2aa", "wcag21a", "wcag21aa", "best-practice"];

#[derive(Debug, Clone)]
enum ScriptSource {
    File(PathBuf),
    Url(String),
    Inline(String),
}

/// Injects axe-core into a page and collects partitioned rule results.
#[derive(Debug)]
pub struct AxeRunner {
    source: ScriptSource,
    settle: Duration,
    script: OnceCell<String>,
}

impl AxeRunner {
    pub fn from_config(config: &BrowserConfig) -> Self {
        let source = match &config.axe_script_path {
            Some(path) => ScriptSource::File(path.clone()),
            None => ScriptSource::Url(config.axe_script_url.clone()),
        };
        Self {
            source,
            settle: Duration::from_millis(config.axe_settle_ms),
            script: OnceCell::new(),
        }
    }

    /// Runner with the engine source supplied directly and no settle delay.
    pub fn with_script(source: impl Into<String>) -> Self {
        Self {
            source: ScriptSource::Inline(source.into()),
            settle: Duration::ZERO,
            script: OnceCell::new(),
        }
    }

    async fn script(&self) -> Result<&str> {
        let script = self
            .script
            .get_or_try_init(|| async {
                match &self.source {
                    ScriptSource::Inline(source) => Ok(source.clone()),
                    ScriptSource::File(path) => {
                        tracing::debug!(path = %path.display(), "loading axe-core from file");
                        tokio::fs::read_to_string(path).await.map_err(|e| {
                            BrowserError::RuleEngine(format!("{}: {e}", path.display()))
                        })
                    }
                    ScriptSource::Url(url) => {
                        tracing::debug!(url = %url, "downloading axe-core");
                        fetch_script(url).await
                    }
                }
            })
            .await?;
        Ok(script.as_str())
    }

    /// Run the rule engine against the page's current document.
    pub async fn run(&self, page: &dyn CapturePage) -> Result<RuleResults> {
        // Let animations and client-side rendering settle first.
        if !self.settle.is_zero() {
            tokio::time::sleep(self.settle).await;
        }

        let present = page.evaluate_json(scripts::AXE_PRESENT).await?;
        if present != serde_json::Value::Bool(true) {
            let source = self.script().await?;
            page.evaluate_json(source).await?;
        }

        let raw = page.evaluate_json(&scripts::axe_run(RULE_TAGS)).await?;
        let results: RuleResults = serde_json::from_value(raw)
            .map_err(|e| BrowserError::RuleEngine(format!("unexpected result shape: {e}")))?;

        tracing::debug!(
            violations = results.violations.len(),
            passes = results.passes.len(),
            incomplete = results.incomplete.len(),
            "accessibility rules evaluated"
        );
        Ok(results)
    }
}

async fn fetch_script(url: &str) -> Result<String> {
    let response = reqwest::get(url)
        .await
        .map_err(|e| BrowserError::RuleEngine(format!("{url}: {e}")))?
        .error_for_status()
        .map_err(|e| BrowserError::RuleEngine(format!("{url}: {e}")))?;
    response
        .text()
        .await
        .map_err(|e| BrowserError::RuleEngine(format!("{url}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn test_script_loaded_from_file_once() {
        let mut file = tempfile::NamedTempFile::new().expect("create temp file");
        write!(file, "window.axe = {{}};").expect("write script");

        let config = BrowserConfig {
            axe_script_path: Some(file.path().to_path_buf()),
            ..BrowserConfig::default()
        };
        let runner = AxeRunner::from_config(&config);

        assert_eq!(runner.script().await.expect("load script"), "window.axe = {};");
        // Second call is served from the cache even if the file is gone.
        let path = file.path().to_path_buf();
        drop(file);
        assert!(!path.exists());
        assert_eq!(runner.script().await.expect("cached script"), "window.axe = {};");
    }

    #[tokio::test]
    async fn test_missing_script_file_is_rule_engine_error() {
        let config = BrowserConfig {
            axe_script_path: Some(PathBuf::from("/nonexistent/axe.min.js")),
            ..BrowserConfig::default()
        };
        let runner = AxeRunner::from_config(&config);
        assert!(matches!(
            runner.script().await,
            Err(BrowserError::RuleEngine(_))
        ));
    }
}
