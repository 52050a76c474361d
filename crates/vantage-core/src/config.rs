//! Configuration management for Vantage.
//!
//! Provides TOML-based configuration with XDG-compliant paths and
//! environment variable overrides. Secrets (API keys) are never written
//! to the config file; they come from the environment.

use crate::error::{ConfigError, ConfigResult};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Main application configuration.
///
/// This is loaded from `~/.config/vantage/config.toml` (or platform equivalent).
/// If the file doesn't exist, default values are used.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Inbound HTTP server settings
    pub server: ServerConfig,
    /// Concurrency budgets
    pub limits: LimitsConfig,
    /// Retry behaviour for model calls and captures
    pub retry: RetryConfig,
    /// Browser automation settings
    pub browser: BrowserConfig,
    /// Generative model settings
    pub llm: LlmConfig,
    /// Report persistence settings
    pub storage: StorageConfig,
    /// Performance metrics lookup settings
    pub performance: PerformanceConfig,
}

impl AppConfig {
    /// Load configuration from the default path, falling back to defaults if not found.
    ///
    /// # Errors
    /// Returns error if:
    /// - Config directory cannot be determined
    /// - File exists but cannot be read
    /// - File contents are not valid TOML
    pub fn load() -> ConfigResult<Self> {
        let config_path = Self::config_path()?;
        Self::load_from(&config_path)
    }

    /// Load configuration from an explicit path, falling back to defaults if missing.
    pub fn load_from(path: &Path) -> ConfigResult<Self> {
        if path.exists() {
            tracing::debug!("Loading config from {}", path.display());
            let contents = fs::read_to_string(path)?;
            let config: Self = toml::from_str(&contents)?;
            config.validate()?;
            Ok(config)
        } else {
            tracing::debug!("Config file not found at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Load configuration with environment variable overrides.
    ///
    /// Supports the following environment variables:
    /// - `VANTAGE_CONFIG`: Read config from this path instead of the XDG default
    /// - `VANTAGE_GEMINI_API_KEY` (or `GEMINI_API_KEY`): Model API key
    /// - `VANTAGE_BROWSER_ENDPOINT`: Attach to a remote browser instead of launching one
    /// - `VANTAGE_PAGESPEED_API_KEY`: PageSpeed Insights key
    /// - `VANTAGE_PORT`: Override the listening port
    /// - `VANTAGE_HEADLESS`: Override browser headless mode (true/false)
    pub fn load_with_env() -> ConfigResult<Self> {
        let mut config = match std::env::var("VANTAGE_CONFIG") {
            Ok(path) => Self::load_from(Path::new(&path))?,
            Err(_) => Self::load()?,
        };
        config.apply_env(|name| std::env::var(name).ok());
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from an environment lookup function.
    ///
    /// Split out from [`AppConfig::load_with_env`] so the mapping can be
    /// exercised without touching the process environment.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = lookup("VANTAGE_GEMINI_API_KEY").or_else(|| lookup("GEMINI_API_KEY")) {
            self.llm.api_key = Some(key);
            tracing::debug!("Override llm.api_key from env");
        }

        if let Some(endpoint) = lookup("VANTAGE_BROWSER_ENDPOINT") {
            if !endpoint.trim().is_empty() {
                tracing::debug!("Override browser.remote_endpoint from env: {}", endpoint);
                self.browser.remote_endpoint = Some(endpoint);
            }
        }

        if let Some(key) = lookup("VANTAGE_PAGESPEED_API_KEY") {
            self.performance.api_key = Some(key);
            tracing::debug!("Override performance.api_key from env");
        }

        if let Some(val) = lookup("VANTAGE_PORT") {
            if let Ok(port) = val.parse() {
                self.server.port = port;
                tracing::debug!("Override server.port from env: {}", port);
            }
        }

        if let Some(val) = lookup("VANTAGE_HEADLESS") {
            if let Ok(headless) = val.parse() {
                self.browser.headless = headless;
                tracing::debug!("Override browser.headless from env: {}", headless);
            }
        }
    }

    /// Reject values that would make the engine deadlock or spin.
    pub fn validate(&self) -> ConfigResult<()> {
        let positive = [
            ("limits.analysis_calls", self.limits.analysis_calls),
            ("limits.browser_sessions", self.limits.browser_sessions),
            ("limits.experts_per_audit", self.limits.experts_per_audit),
        ];
        for (field, value) in positive {
            if value == 0 {
                return Err(ConfigError::InvalidValue {
                    field: field.to_string(),
                    reason: "must be at least 1".to_string(),
                });
            }
        }

        if self.browser.jpeg_quality == 0 || self.browser.jpeg_quality > 100 {
            return Err(ConfigError::InvalidValue {
                field: "browser.jpeg_quality".to_string(),
                reason: format!("must be in 1..=100, got {}", self.browser.jpeg_quality),
            });
        }

        if self.retry.analysis_base_delay_ms > self.retry.max_delay_ms {
            return Err(ConfigError::InvalidValue {
                field: "retry.analysis_base_delay_ms".to_string(),
                reason: "must not exceed retry.max_delay_ms".to_string(),
            });
        }

        Ok(())
    }

    /// Save configuration to disk.
    ///
    /// Creates the config directory if it doesn't exist.
    pub fn save(&self) -> ConfigResult<()> {
        let config_path = Self::config_path()?;
        let config_dir = config_path
            .parent()
            .ok_or_else(|| ConfigError::InvalidValue {
                field: "config_path".to_string(),
                reason: "no parent directory".to_string(),
            })?;

        fs::create_dir_all(config_dir)?;
        tracing::debug!("Saving config to {}", config_path.display());

        let contents = toml::to_string_pretty(self)?;
        fs::write(config_path, contents)?;
        Ok(())
    }

    /// Get the path to the configuration file.
    ///
    /// Uses XDG base directories: `~/.config/vantage/config.toml`
    pub fn config_path() -> ConfigResult<PathBuf> {
        let dirs = ProjectDirs::from("com", "vantage", "vantage").ok_or(ConfigError::NoConfigDir)?;
        Ok(dirs.config_dir().join("config.toml"))
    }

    /// Get the data directory path.
    ///
    /// Uses XDG base directories: `~/.local/share/vantage`
    pub fn data_dir() -> ConfigResult<PathBuf> {
        let dirs = ProjectDirs::from("com", "vantage", "vantage").ok_or(ConfigError::NoConfigDir)?;
        Ok(dirs.data_dir().to_path_buf())
    }
}

/// Inbound HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address
    pub host: String,
    /// Listening port
    pub port: u16,
    /// Maximum accepted request body in bytes (base64 screenshots are large)
    pub body_limit_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            body_limit_bytes: 50 * 1024 * 1024,
        }
    }
}

/// Concurrency budgets.
///
/// `analysis_calls` and `browser_sessions` are process-wide; `experts_per_audit`
/// bounds how many experts one audit runs at once.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Concurrent generative model calls across all audits
    pub analysis_calls: usize,
    /// Concurrent browser sessions across all audits
    pub browser_sessions: usize,
    /// Concurrent experts within a single audit
    pub experts_per_audit: usize,
    /// Pause between the primary and competitor acquisitions
    pub acquisition_pause_ms: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            analysis_calls: 10,
            browser_sessions: 3,
            experts_per_audit: 2,
            acquisition_pause_ms: 3000,
        }
    }
}

/// Retry behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries (beyond the first attempt) for a model call
    pub analysis_max_retries: u32,
    /// Base backoff delay for model calls
    pub analysis_base_delay_ms: u64,
    /// Upper bound on a computed backoff delay
    pub max_delay_ms: u64,
    /// Retries (beyond the first attempt) for one page capture
    pub capture_retries: u32,
    /// Fixed pause between capture attempts
    pub capture_retry_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            analysis_max_retries: 10,
            analysis_base_delay_ms: 2000,
            max_delay_ms: 60_000,
            capture_retries: 2,
            capture_retry_delay_ms: 2000,
        }
    }
}

/// How to treat the post-navigation network quiescence wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkIdleMode {
    /// Wait up to the timeout, carry on if the network never settles
    BestEffort,
    /// Fail the capture attempt if the network never settles
    Required,
    /// Do not wait at all
    Skip,
}

/// Browser automation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    /// Run a locally launched browser in headless mode
    pub headless: bool,
    /// CDP websocket endpoint of a shared remote browser pool
    pub remote_endpoint: Option<String>,
    /// Identification string sent with every navigation
    pub user_agent: String,
    /// Navigation timeout in seconds
    pub navigation_timeout_secs: u64,
    /// Post-navigation network quiescence handling
    pub network_idle: NetworkIdleMode,
    /// Upper bound on the network quiescence wait
    pub network_idle_timeout_ms: u64,
    /// Distance of one scroll step in pixels
    pub scroll_step_px: u32,
    /// Pause between scroll steps
    pub scroll_interval_ms: u64,
    /// Maximum number of scroll steps
    pub max_scrolls: u32,
    /// JPEG quality of the full-page capture
    pub jpeg_quality: u8,
    /// Local copy of the axe-core script
    pub axe_script_path: Option<PathBuf>,
    /// Where to download axe-core from when no local copy is configured
    pub axe_script_url: String,
    /// Settle time before running the accessibility rules
    pub axe_settle_ms: u64,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: true,
            remote_endpoint: None,
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".to_string(),
            navigation_timeout_secs: 300,
            network_idle: NetworkIdleMode::BestEffort,
            network_idle_timeout_ms: 5000,
            scroll_step_px: 250,
            scroll_interval_ms: 500,
            max_scrolls: 40,
            jpeg_quality: 50,
            axe_script_path: None,
            axe_script_url: "https://cdnjs.cloudflare.com/ajax/libs/axe-core/4.10.2/axe.min.js"
                .to_string(),
            axe_settle_ms: 2000,
        }
    }
}

/// Generative model settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Model API key (from the environment, never persisted)
    #[serde(skip)]
    pub api_key: Option<String>,
    /// Model identifier
    pub model: String,
    /// API base URL
    pub base_url: String,
    /// Output token ceiling per call
    pub max_output_tokens: u32,
    /// Per-request HTTP timeout in seconds
    pub request_timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: "gemini-2.5-flash".to_string(),
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            max_output_tokens: 8192,
            request_timeout_secs: 300,
        }
    }
}

/// Report persistence settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite database holding audit records
    pub database_path: PathBuf,
    /// Directory receiving uploaded screenshots
    pub objects_dir: PathBuf,
    /// Public URL prefix under which `objects_dir` is served
    pub public_base_url: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("vantage.db"),
            objects_dir: PathBuf::from("screenshots"),
            public_base_url: "http://localhost:3000/screenshots".to_string(),
        }
    }
}

/// Performance metrics lookup settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceConfig {
    /// Look up metrics for the primary URL during a coordinated audit
    pub enabled: bool,
    /// PageSpeed Insights API key (falls back to the model key)
    #[serde(skip)]
    pub api_key: Option<String>,
    /// API endpoint
    pub endpoint: String,
    /// Abort the lookup after this many seconds
    pub timeout_secs: u64,
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api_key: None,
            endpoint: "https://www.googleapis.com/pagespeedonline/v5/runPagespeed".to_string(),
            timeout_secs: 60,
        }
    }
}
