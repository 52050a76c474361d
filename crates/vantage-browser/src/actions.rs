use crate::error::Result;
use crate::profile::DeviceProfile;
use async_trait::async_trait;

/// How a session was obtained, which decides how it is released.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionKind {
    /// Browser process launched by us; released by closing it
    Local,
    /// Attached to an external browser; released by disconnecting
    Remote,
}

/// Source of browser sessions.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    /// Launch or attach to a browser.
    async fn connect(&self) -> Result<Box<dyn BrowserSession>>;
}

/// One connected browser.
#[async_trait]
pub trait BrowserSession: Send {
    fn kind(&self) -> SessionKind;

    /// Open a fresh blank page.
    async fn open_page(&self) -> Result<Box<dyn CapturePage>>;

    /// Close (local) or disconnect from (remote) the browser.
    async fn release(self: Box<Self>) -> Result<()>;
}

/// Page operations used by the capture worker.
#[async_trait]
pub trait CapturePage: Send + Sync {
    async fn set_user_agent(&self, user_agent: &str) -> Result<()>;

    /// Apply viewport size and mobile/touch emulation.
    async fn set_viewport(&self, profile: &DeviceProfile) -> Result<()>;

    /// Navigate and wait for the document to load.
    async fn navigate(&self, url: &str) -> Result<()>;

    /// Resolve once network activity has settled. Has no timeout of its own.
    async fn wait_for_network_idle(&self) -> Result<()>;

    /// Evaluate a script expression, awaiting promises, and return its value.
    async fn evaluate_json(&self, script: &str) -> Result<serde_json::Value>;

    /// Full-page JPEG screenshot.
    async fn screenshot_jpeg(&self, quality: u8) -> Result<Vec<u8>>;

    async fn close(self: Box<Self>) -> Result<()>;
}

/// Path component of a page URL, used to label screenshots.
pub fn page_path(url: &str) -> Result<String> {
    let parsed = url::Url::parse(url)
        .map_err(|e| crate::error::BrowserError::InvalidUrl(format!("{url}: {e}")))?;
    if parsed.host_str().is_none() {
        return Err(crate::error::BrowserError::InvalidUrl(format!(
            "{url}: no host"
        )));
    }
    Ok(parsed.path().to_string())
}
