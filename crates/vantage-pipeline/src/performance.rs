//! PageSpeed Insights lookup.
//!
//! Lab metrics for the primary URL. A lookup never fails its caller: every
//! problem is reported in [`PerformanceReport::error`].

use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use vantage_core::PerformanceConfig;

const NOT_AVAILABLE: &str = "N/A";

/// Core Web Vitals as display strings (`"1.2 s"`, `"0.05"`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub lcp: String,
    pub cls: String,
    pub tbt: String,
    pub fcp: String,
    pub tti: String,
    pub si: String,
}

/// Outcome of one lookup. Exactly one of the fields is usually set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceReport {
    pub performance_data: Option<PerformanceMetrics>,
    pub error: Option<String>,
}

impl PerformanceReport {
    fn failed(message: impl Into<String>) -> Self {
        Self {
            performance_data: None,
            error: Some(message.into()),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageSpeedResponse {
    lighthouse_result: Option<LighthouseResult>,
    error: Option<ApiErrorBody>,
}

#[derive(Debug, Deserialize)]
struct LighthouseResult {
    #[serde(default)]
    audits: HashMap<String, LighthouseAudit>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LighthouseAudit {
    display_value: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorEnvelope {
    error: Option<ApiErrorBody>,
}

impl LighthouseResult {
    fn metrics(&self) -> PerformanceMetrics {
        let display = |audit: &str| {
            self.audits
                .get(audit)
                .and_then(|a| a.display_value.clone())
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| NOT_AVAILABLE.to_string())
        };
        PerformanceMetrics {
            lcp: display("largest-contentful-paint"),
            cls: display("cumulative-layout-shift"),
            tbt: display("total-blocking-time"),
            fcp: display("first-contentful-paint"),
            tti: display("interactive"),
            si: display("speed-index"),
        }
    }
}

/// PageSpeed Insights v5 client.
#[derive(Debug, Clone)]
pub struct PerformanceClient {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl PerformanceClient {
    /// Build a client. `fallback_key` is used when no PageSpeed key is set.
    ///
    /// # Errors
    /// Returns the reqwest error if the HTTP client cannot be created.
    pub fn from_config(
        config: &PerformanceConfig,
        fallback_key: Option<&str>,
    ) -> reqwest::Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .or_else(|| fallback_key.map(str::to_string))
            .filter(|k| !k.trim().is_empty());

        Ok(Self {
            client: Client::builder().build()?,
            endpoint: config.endpoint.clone(),
            api_key,
            timeout: Duration::from_secs(config.timeout_secs),
        })
    }

    /// Fetch desktop performance metrics for `url`.
    pub async fn lookup(&self, url: &str) -> PerformanceReport {
        tracing::info!("[Performance] Starting audit for: {}", url);
        match tokio::time::timeout(self.timeout, self.fetch(url)).await {
            Ok(report) => report,
            Err(_) => {
                tracing::warn!("[Performance] Lookup for {} timed out", url);
                PerformanceReport::failed(format!(
                    "Google PageSpeed Insights API timed out after {} seconds.",
                    self.timeout.as_secs()
                ))
            }
        }
    }

    async fn fetch(&self, url: &str) -> PerformanceReport {
        let mut query = vec![
            ("url", url),
            ("category", "performance"),
            ("strategy", "desktop"),
        ];
        if let Some(key) = self.api_key.as_deref() {
            query.push(("key", key));
        }

        let response = match self.client.get(&self.endpoint).query(&query).send().await {
            Ok(response) => response,
            Err(e) => return PerformanceReport::failed(e.to_string()),
        };

        let status = response.status();
        tracing::debug!("[Performance] Response status: {}", status);

        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => return PerformanceReport::failed(e.to_string()),
        };

        if !status.is_success() {
            tracing::error!("[Performance] API error body: {}", body);
            let message = serde_json::from_str::<ApiErrorEnvelope>(&body)
                .ok()
                .and_then(|envelope| envelope.error)
                .and_then(|error| error.message);
            return PerformanceReport::failed(match message {
                Some(message) => message,
                None if body.trim().is_empty() => format!("API Error {}", status.as_u16()),
                None => format!("API Error {}: {}", status.as_u16(), body),
            });
        }

        let parsed: PageSpeedResponse = match serde_json::from_str(&body) {
            Ok(parsed) => parsed,
            Err(e) => return PerformanceReport::failed(format!("invalid PageSpeed response: {e}")),
        };

        match parsed.lighthouse_result {
            Some(result) => {
                let metrics = result.metrics();
                tracing::info!("[Performance] Extracted metrics: {:?}", metrics);
                PerformanceReport {
                    performance_data: Some(metrics),
                    error: None,
                }
            }
            None => {
                tracing::warn!("[Performance] No lighthouseResult found in response");
                PerformanceReport::failed(
                    parsed
                        .error
                        .and_then(|e| e.message)
                        .unwrap_or_else(|| "Lighthouse returned an empty result.".to_string()),
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_fall_back_to_na() {
        let parsed: PageSpeedResponse = serde_json::from_str(
            r#"{"lighthouseResult": {"audits": {
                "largest-contentful-paint": {"displayValue": "2.1 s"},
                "cumulative-layout-shift": {"displayValue": "0.02"},
                "interactive": {}
            }}}"#,
        )
        .unwrap();

        let metrics = parsed.lighthouse_result.unwrap().metrics();
        assert_eq!(metrics.lcp, "2.1 s");
        assert_eq!(metrics.cls, "0.02");
        assert_eq!(metrics.tti, "N/A");
        assert_eq!(metrics.si, "N/A");
    }

    #[test]
    fn test_report_wire_format() {
        let report = PerformanceReport::failed("quota");
        assert_eq!(
            serde_json::to_value(&report).unwrap(),
            serde_json::json!({"performanceData": null, "error": "quota"})
        );
    }

    #[test]
    fn test_fallback_key() {
        let config = PerformanceConfig::default();
        let client = PerformanceClient::from_config(&config, Some("model-key")).unwrap();
        assert_eq!(client.api_key.as_deref(), Some("model-key"));

        let config = PerformanceConfig {
            api_key: Some("psi-key".to_string()),
            ..PerformanceConfig::default()
        };
        let client = PerformanceClient::from_config(&config, Some("model-key")).unwrap();
        assert_eq!(client.api_key.as_deref(), Some("psi-key"));
    }
}
