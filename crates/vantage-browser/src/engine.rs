use crate::actions::{BrowserSession, CapturePage, SessionKind, SessionProvider};
use crate::error::{BrowserError, Result};
use crate::profile::DeviceProfile;
use crate::scripts;
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig as ChromiumConfig};
use chromiumoxide::cdp::browser_protocol::emulation::{
    SetDeviceMetricsOverrideParams, SetTouchEmulationEnabledParams, SetUserAgentOverrideParams,
};
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::cdp::js_protocol::runtime::EvaluateParams;
use chromiumoxide::handler::Handler;
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::Page;
use futures::StreamExt;
use std::time::Duration;
use tokio::task::JoinHandle;
use vantage_core::BrowserConfig;

/// Poll interval while waiting for the network to go quiet.
const IDLE_POLL: Duration = Duration::from_millis(500);

/// Launch flags for local headless Chrome. Favors stability in containers.
const LAUNCH_ARGS: &[&str] = &[
    "--disable-setuid-sandbox",
    "--disable-dev-shm-usage",
    "--disable-gpu",
    "--disable-software-rasterizer",
    "--disable-features=IsolateOrigins,site-per-process",
    "--disable-extensions",
    "--disable-infobars",
    "--no-zygote",
    "--mute-audio",
];

/// Chromium sessions, launched locally or attached over CDP.
#[derive(Debug, Clone)]
pub struct ChromiumSessionProvider {
    headless: bool,
    remote_endpoint: Option<String>,
    request_timeout: Duration,
}

impl ChromiumSessionProvider {
    pub fn from_config(config: &BrowserConfig) -> Self {
        Self {
            headless: config.headless,
            remote_endpoint: config.remote_endpoint.clone(),
            request_timeout: Duration::from_secs(config.navigation_timeout_secs),
        }
    }

    async fn launch(&self) -> Result<(Browser, Handler)> {
        let mut builder = ChromiumConfig::builder()
            .no_sandbox()
            .window_size(1920, 1080)
            .request_timeout(self.request_timeout)
            .args(LAUNCH_ARGS.iter().copied());
        if !self.headless {
            builder = builder.with_head();
        }
        let config = builder.build().map_err(BrowserError::ChromiumError)?;

        Browser::launch(config)
            .await
            .map_err(|e| BrowserError::ChromiumError(e.to_string()))
    }
}

#[async_trait]
impl SessionProvider for ChromiumSessionProvider {
    async fn connect(&self) -> Result<Box<dyn BrowserSession>> {
        let (browser, mut handler, kind) = match &self.remote_endpoint {
            Some(endpoint) => {
                tracing::debug!(endpoint = %endpoint, "attaching to remote browser");
                let (browser, handler) = Browser::connect(endpoint.clone())
                    .await
                    .map_err(|e| BrowserError::ChromiumError(e.to_string()))?;
                (browser, handler, SessionKind::Remote)
            }
            None => {
                tracing::debug!(headless = self.headless, "launching local browser");
                let (browser, handler) = self.launch().await?;
                (browser, handler, SessionKind::Local)
            }
        };

        // Spawn browser handler
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        Ok(Box::new(ChromiumSession {
            browser,
            handler_task,
            kind,
        }))
    }
}

/// A live Chromium connection and its CDP event loop.
pub struct ChromiumSession {
    browser: Browser,
    handler_task: JoinHandle<()>,
    kind: SessionKind,
}

#[async_trait]
impl BrowserSession for ChromiumSession {
    fn kind(&self) -> SessionKind {
        self.kind
    }

    async fn open_page(&self) -> Result<Box<dyn CapturePage>> {
        let page = self
            .browser
            .new_page("about:blank")
            .await
            .map_err(|e| BrowserError::ChromiumError(e.to_string()))?;
        Ok(Box::new(ChromiumPage { page }))
    }

    async fn release(self: Box<Self>) -> Result<()> {
        let ChromiumSession {
            mut browser,
            handler_task,
            kind,
        } = *self;

        let result = match kind {
            SessionKind::Local => {
                let closed = browser
                    .close()
                    .await
                    .map(|_| ())
                    .map_err(|e| BrowserError::ChromiumError(e.to_string()));
                if let Err(e) = browser.wait().await {
                    tracing::debug!("browser process wait failed: {e}");
                }
                closed
            }
            // Dropping the handle closes the websocket without killing the
            // remote browser.
            SessionKind::Remote => Ok(()),
        };

        drop(browser);
        handler_task.abort();
        result
    }
}

/// A single Chromium tab.
pub struct ChromiumPage {
    page: Page,
}

#[async_trait]
impl CapturePage for ChromiumPage {
    async fn set_user_agent(&self, user_agent: &str) -> Result<()> {
        self.page
            .execute(SetUserAgentOverrideParams::new(user_agent.to_string()))
            .await
            .map_err(|e| BrowserError::ChromiumError(e.to_string()))?;
        Ok(())
    }

    async fn set_viewport(&self, profile: &DeviceProfile) -> Result<()> {
        self.page
            .execute(SetDeviceMetricsOverrideParams::new(
                i64::from(profile.viewport_width),
                i64::from(profile.viewport_height),
                profile.device_scale_factor,
                profile.mobile,
            ))
            .await
            .map_err(|e| BrowserError::ChromiumError(e.to_string()))?;
        self.page
            .execute(SetTouchEmulationEnabledParams::new(profile.touch))
            .await
            .map_err(|e| BrowserError::ChromiumError(e.to_string()))?;
        Ok(())
    }

    async fn navigate(&self, url: &str) -> Result<()> {
        self.page
            .goto(url)
            .await
            .map_err(|e| BrowserError::NavigationError(format!("{url}: {e}")))?;
        Ok(())
    }

    async fn wait_for_network_idle(&self) -> Result<()> {
        let mut last = self.evaluate_json(scripts::RESOURCE_COUNT).await?;
        loop {
            tokio::time::sleep(IDLE_POLL).await;
            let current = self.evaluate_json(scripts::RESOURCE_COUNT).await?;
            if current == last {
                return Ok(());
            }
            last = current;
        }
    }

    async fn evaluate_json(&self, script: &str) -> Result<serde_json::Value> {
        let params = EvaluateParams::builder()
            .expression(script)
            .await_promise(true)
            .return_by_value(true)
            .build()
            .map_err(BrowserError::ScriptError)?;

        let result = self
            .page
            .evaluate_expression(params)
            .await
            .map_err(|e| BrowserError::ScriptError(e.to_string()))?;

        Ok(result.value().cloned().unwrap_or(serde_json::Value::Null))
    }

    async fn screenshot_jpeg(&self, quality: u8) -> Result<Vec<u8>> {
        let params = ScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Jpeg)
            .quality(i64::from(quality))
            .full_page(true)
            .build();

        self.page
            .screenshot(params)
            .await
            .map_err(|e| BrowserError::ScreenshotError(e.to_string()))
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.page
            .close()
            .await
            .map_err(|e| BrowserError::ChromiumError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_picks_remote_when_endpoint_set() {
        let mut config = BrowserConfig::default();
        config.remote_endpoint = Some("ws://127.0.0.1:9222/devtools/browser/abc".to_string());
        let provider = ChromiumSessionProvider::from_config(&config);
        assert!(provider.remote_endpoint.is_some());
        assert_eq!(provider.request_timeout, Duration::from_secs(300));
    }

    #[test]
    fn test_launch_args_keep_sandbox_flag_out() {
        // `no_sandbox()` on the builder owns that flag.
        assert!(!LAUNCH_ARGS.contains(&"--no-sandbox"));
    }
}
