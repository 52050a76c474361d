//! Retry policy for calls to rate-limited upstream services.
//!
//! Failures are classified from their message text. Transient failures are
//! retried with capped full-jitter exponential backoff, unless the upstream
//! told us how long to wait, in which case we wait that long plus one second.

use rand::Rng;
use regex::Regex;
use std::fmt::Display;
use std::future::Future;
use std::sync::OnceLock;
use std::time::Duration;

/// Extra wait added on top of a server-suggested delay.
const SERVER_DELAY_PADDING: Duration = Duration::from_millis(1000);

/// Upper bound of the random offset added when a draw falls under the base.
const FLOOR_JITTER_MS: u64 = 1000;

/// Substrings that mark a failure as worth retrying. Matched case-insensitively.
const TRANSIENT_MARKERS: &[&str] = &[
    "429",
    "500",
    "503",
    "overloaded",
    "quota",
    "resource_exhausted",
    "unavailable",
    "timeout",
    "timed out",
    "internal error",
    "fetch failed",
    "econnreset",
    "connection reset",
    "epipe",
    "broken pipe",
];

/// Outcome of classifying a failure message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Rate limits, overloads, timeouts, dropped connections
    Transient,
    /// Everything else; retrying will not help
    Fatal,
}

/// Classify a failure message.
#[must_use]
pub fn classify(message: &str) -> ErrorClass {
    let lower = message.to_ascii_lowercase();
    if TRANSIENT_MARKERS.iter().any(|marker| lower.contains(marker)) {
        ErrorClass::Transient
    } else {
        ErrorClass::Fatal
    }
}

/// Extract an explicit wait the upstream asked for, if the message carries one.
///
/// Recognizes `retry in 12.5s` and `retry-after: 30` (seconds).
#[must_use]
pub fn server_suggested_delay(message: &str) -> Option<Duration> {
    static RETRY_IN: OnceLock<Regex> = OnceLock::new();
    static RETRY_AFTER: OnceLock<Regex> = OnceLock::new();

    let retry_in = RETRY_IN
        .get_or_init(|| Regex::new(r"(?i)retry in (\d+(?:\.\d+)?)s").expect("valid regex"));
    let retry_after =
        RETRY_AFTER.get_or_init(|| Regex::new(r"(?i)retry-after.*?(\d+)").expect("valid regex"));

    let captured = retry_in
        .captures(message)
        .or_else(|| retry_after.captures(message))?;
    let seconds: f64 = captured.get(1)?.as_str().parse().ok()?;
    if seconds.is_finite() && seconds > 0.0 {
        Some(Duration::from_secs_f64(seconds))
    } else {
        None
    }
}

/// Bounded retry with capped full-jitter backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Minimum delay between attempts
    pub base_delay: Duration,
    /// Ceiling for the exponential window
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 10,
            base_delay: Duration::from_millis(2000),
            max_delay: Duration::from_millis(60_000),
        }
    }
}

impl From<&crate::config::RetryConfig> for RetryPolicy {
    fn from(config: &crate::config::RetryConfig) -> Self {
        Self {
            max_retries: config.analysis_max_retries,
            base_delay: Duration::from_millis(config.analysis_base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
        }
    }
}

impl RetryPolicy {
    /// Delay before retrying after failed attempt number `attempt` (1-based).
    pub fn delay_for<R: Rng + ?Sized>(&self, attempt: u32, message: &str, rng: &mut R) -> Duration {
        if let Some(server) = server_suggested_delay(message) {
            return server + SERVER_DELAY_PADDING;
        }

        let base = duration_ms(self.base_delay);
        let max = duration_ms(self.max_delay);
        let slot = 1u64 << attempt.saturating_sub(1).min(32);
        let cap = max.min(base.saturating_mul(slot));

        let mut delay = if cap == 0 { 0 } else { rng.gen_range(0..cap) };
        if delay < base {
            delay = base + rng.gen_range(0..FLOOR_JITTER_MS);
        }

        Duration::from_millis(delay.clamp(base, cap.max(base)))
    }

    /// Run `op` until it succeeds, fails fatally, or retries run out.
    ///
    /// `op` is invoked at most `max_retries + 1` times, strictly one after
    /// another. The last error is returned unchanged.
    pub async fn retry<F, Fut, T, E>(&self, operation: &str, mut op: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let err = match op().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            let message = err.to_string();
            let class = classify(&message);
            if attempt > self.max_retries || class == ErrorClass::Fatal {
                tracing::error!(
                    operation,
                    attempt,
                    ?class,
                    error = %message,
                    "operation failed permanently"
                );
                return Err(err);
            }

            let delay = self.delay_for(attempt, &message, &mut rand::thread_rng());
            tracing::warn!(
                operation,
                attempt,
                max_retries = self.max_retries,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                error = %truncate(&message, 150),
                "transient failure, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn truncate(message: &str, max_chars: usize) -> &str {
    match message.char_indices().nth(max_chars) {
        Some((idx, _)) => &message[..idx],
        None => message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            base_delay: Duration::from_millis(2000),
            max_delay: Duration::from_millis(60_000),
        }
    }

    #[test]
    fn test_classify_transient_markers() {
        for msg in [
            "HTTP 503 Service Unavailable",
            "got status 429",
            "The model is overloaded. Please try again later.",
            "RESOURCE_EXHAUSTED: quota exceeded",
            "operation timed out",
            "Navigation Timeout Exceeded",
            "TypeError: fetch failed",
            "read ECONNRESET",
            "Broken pipe (os error 32)",
        ] {
            assert_eq!(classify(msg), ErrorClass::Transient, "{msg}");
        }
    }

    #[test]
    fn test_classify_fatal() {
        assert_eq!(classify("HTTP 400 invalid argument"), ErrorClass::Fatal);
        assert_eq!(classify("API key not valid"), ErrorClass::Fatal);
        assert_eq!(classify(""), ErrorClass::Fatal);
    }

    #[test]
    fn test_server_suggested_delay() {
        assert_eq!(
            server_suggested_delay("Please retry in 12.5s."),
            Some(Duration::from_millis(12_500))
        );
        assert_eq!(
            server_suggested_delay("429 Too Many Requests; Retry-After: 30"),
            Some(Duration::from_secs(30))
        );
        assert_eq!(server_suggested_delay("503 overloaded"), None);
    }

    #[test]
    fn test_server_delay_wins_exactly() {
        let mut rng = StdRng::seed_from_u64(7);
        for attempt in 1..=10 {
            let delay = policy(10).delay_for(attempt, "429: please retry in 7s", &mut rng);
            assert_eq!(delay, Duration::from_millis(8000));
        }
    }

    #[test]
    fn test_delay_within_bounds() {
        let policy = policy(10);
        let mut rng = StdRng::seed_from_u64(42);
        for attempt in 1..=12 {
            let slot = 1u64 << (attempt - 1);
            let cap = 60_000u64.min(2000 * slot);
            for _ in 0..200 {
                let delay = duration_ms(policy.delay_for(attempt, "503", &mut rng));
                assert!(delay >= 2000, "attempt {attempt}: {delay} below base");
                assert!(delay <= cap.max(2000), "attempt {attempt}: {delay} above cap {cap}");
            }
        }
    }

    #[test]
    fn test_first_retry_uses_base_delay() {
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..50 {
            let delay = policy(3).delay_for(1, "503", &mut rng);
            assert_eq!(delay, Duration::from_millis(2000));
        }
    }

    #[test]
    fn test_delay_never_exceeds_max() {
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..200 {
            let delay = policy(40).delay_for(40, "503", &mut rng);
            assert!(delay <= Duration::from_millis(60_000));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_succeeds_after_transient_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);

        let result: Result<&str, String> = policy(5)
            .retry("flaky", || {
                let counter = Arc::clone(&counter);
                async move {
                    let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                    if n < 3 {
                        Err("503 Service Unavailable".to_string())
                    } else {
                        Ok("done")
                    }
                }
            })
            .await;

        assert_eq!(result, Ok("done"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_bounded_invocations() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);

        let result: Result<(), String> = policy(4)
            .retry("always-busy", || {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err("429 RESOURCE_EXHAUSTED".to_string())
                }
            })
            .await;

        assert_eq!(result, Err("429 RESOURCE_EXHAUSTED".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_error_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);

        let result: Result<(), String> = policy(10)
            .retry("bad-request", || {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err("400 invalid argument".to_string())
                }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_server_delay_is_slept() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let started = tokio::time::Instant::now();

        let _: Result<(), String> = policy(1)
            .retry("rate-limited", || {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err("429 quota; retry in 5s".to_string())
                }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(started.elapsed() >= Duration::from_secs(6));
    }

    #[test]
    fn test_policy_from_config() {
        let config = crate::config::RetryConfig::default();
        let policy = RetryPolicy::from(&config);
        assert_eq!(policy, RetryPolicy::default());
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo", 2), "hé");
        assert_eq!(truncate("ok", 10), "ok");
    }
}
