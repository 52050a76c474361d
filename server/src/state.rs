//! Application state shared by every request.

use anyhow::Context;
use std::sync::Arc;
use vantage_browser::{AxeRunner, CaptureSettings, ChromiumSessionProvider, EvidenceCapturer};
use vantage_core::{AppConfig, BoundedSemaphore, RetryPolicy};
use vantage_db::{AuditStore, SqliteAuditStore};
use vantage_llm::{AnalysisGateway, GeminiProvider};
use vantage_pipeline::{
    BuiltinCatalog, Coordinator, CoordinatorSettings, EvidenceSource, PerformanceClient,
};

/// Process-wide services. Cloning is cheap; every field is shared.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    /// Page captures for the single-page scrape mode
    pub evidence: Arc<dyn EvidenceSource>,
    /// Concurrent browser sessions across all audits
    pub browser_sessions: BoundedSemaphore,
    pub coordinator: Coordinator,
}

impl AppState {
    /// Assemble state from already-built services.
    #[must_use]
    pub fn new(
        config: AppConfig,
        evidence: Arc<dyn EvidenceSource>,
        browser_sessions: BoundedSemaphore,
        coordinator: Coordinator,
    ) -> Self {
        Self {
            config: Arc::new(config),
            evidence,
            browser_sessions,
            coordinator,
        }
    }

    /// Build the production services: Chromium capture, the Gemini gateway,
    /// the `SQLite` store and, when enabled, PageSpeed lookups.
    pub async fn from_config(config: AppConfig) -> anyhow::Result<Self> {
        let browser_sessions =
            BoundedSemaphore::new("browser-sessions", config.limits.browser_sessions);
        let analysis = BoundedSemaphore::new("analysis", config.limits.analysis_calls);

        let capturer = EvidenceCapturer::new(
            Arc::new(ChromiumSessionProvider::from_config(&config.browser)),
            browser_sessions.clone(),
            Arc::new(AxeRunner::from_config(&config.browser)),
            CaptureSettings::from_config(&config.browser, &config.retry),
        );
        let evidence: Arc<dyn EvidenceSource> = Arc::new(capturer);

        let provider =
            GeminiProvider::from_config(&config.llm).context("failed to set up the model client")?;
        let gateway =
            AnalysisGateway::new(Arc::new(provider), analysis, RetryPolicy::from(&config.retry));

        let store = SqliteAuditStore::from_config(&config.storage)
            .await
            .context("failed to open the audit store")?;
        tracing::info!(
            "Audit database: {}",
            config.storage.database_path.display()
        );

        let mut coordinator = Coordinator::new(
            Arc::clone(&evidence),
            gateway,
            Arc::new(BuiltinCatalog),
            Arc::new(store) as Arc<dyn AuditStore>,
            CoordinatorSettings::from(&config.limits),
        );
        if config.performance.enabled {
            let client =
                PerformanceClient::from_config(&config.performance, config.llm.api_key.as_deref())
                    .context("failed to set up the PageSpeed client")?;
            coordinator = coordinator.with_performance(client);
        }

        Ok(Self::new(config, evidence, browser_sessions, coordinator))
    }

    /// The shared analysis pool.
    #[must_use]
    pub fn analysis_pool(&self) -> &BoundedSemaphore {
        self.coordinator.gateway().pool()
    }
}
