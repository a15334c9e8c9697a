//! Retry configuration, delay calculation, and the retrying fetcher.
//!
//! Provides [`RetryConfig`] for controlling retry behaviour and
//! [`RetryingFetcher`], a decorator that retries transient outbound
//! failures. Retry logic lives in the shared `with_retry()` helper.

use std::future::Future;
use std::marker::PhantomData;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tracing::warn;

use super::traits::Fetcher;
use crate::telemetry;
use crate::{MuninnError, Result};

/// Configuration for retry behaviour on transient errors.
///
/// Uses exponential backoff with optional jitter:
///
/// ```rust
/// # use muninn::RetryConfig;
/// # use std::time::Duration;
/// let config = RetryConfig::new()
///     .max_attempts(5)
///     .initial_delay(Duration::from_millis(200))
///     .jitter(true);
/// ```
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts (including the initial request).
    /// 1 = no retry. Default: 3.
    pub max_attempts: u32,
    /// Base delay before the first retry. Default: 500ms.
    pub initial_delay: Duration,
    /// Maximum delay between retries (caps exponential growth). Default: 30s.
    pub max_delay: Duration,
    /// Whether to add up to 25% random jitter to delays. Default: true.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// Create a new config with sensible defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a config that disables retries (single attempt).
    pub fn disabled() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Set maximum attempts (including the initial request).
    pub fn max_attempts(mut self, n: u32) -> Self {
        self.max_attempts = n;
        self
    }

    /// Set the base delay before the first retry.
    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Set the maximum delay between retries.
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Enable or disable jitter.
    pub fn jitter(mut self, enabled: bool) -> Self {
        self.jitter = enabled;
        self
    }

    /// Backoff for a given attempt number (0-indexed), without jitter.
    ///
    /// `initial_delay * 2^attempt`, capped at `max_delay`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay = self
            .initial_delay
            .saturating_mul(2u32.saturating_pow(attempt));
        delay.min(self.max_delay)
    }

    /// Delay to sleep before the next attempt.
    ///
    /// A server `retry_after` hint takes precedence over backoff and is
    /// never jittered.
    pub fn effective_delay(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        if let Some(hint) = retry_after {
            return hint;
        }
        let base = self.delay_for_attempt(attempt);
        if !self.jitter {
            return base;
        }
        let spread = base.as_millis() as u64 / 4;
        base + Duration::from_millis(rand::thread_rng().gen_range(0..=spread))
    }
}

/// Execute an async operation with retry logic.
///
/// Retries errors classified transient by [`MuninnError::is_transient()`]
/// up to `config.max_attempts`. Permanent errors are returned immediately.
pub(crate) async fn with_retry<F, Fut, T>(config: &RetryConfig, fetcher_name: &str, f: F) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut last_err = None;
    for attempt in 0..config.max_attempts.max(1) {
        match f().await {
            Ok(result) => return Ok(result),
            Err(e) if e.is_transient() => {
                if attempt + 1 < config.max_attempts {
                    metrics::counter!(telemetry::RETRIES_TOTAL, "fetcher" => fetcher_name.to_owned())
                        .increment(1);
                    let delay = config.effective_delay(attempt, e.retry_after());
                    warn!(
                        fetcher = fetcher_name,
                        attempt = attempt + 1,
                        max_attempts = config.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "retrying after transient error"
                    );
                    tokio::time::sleep(delay).await;
                }
                last_err = Some(e);
            }
            Err(e) => return Err(e),
        }
    }
    Err(last_err.unwrap_or(MuninnError::Timeout))
}

/// Decorator that wraps a [`Fetcher`] with retry logic.
///
/// Transient errors are retried with exponential backoff, respecting
/// `retry_after` hints from `RateLimited` errors. Permanent errors are
/// returned immediately.
pub struct RetryingFetcher<F, V> {
    inner: F,
    config: RetryConfig,
    _value: PhantomData<fn() -> V>,
}

impl<F, V> RetryingFetcher<F, V>
where
    F: Fetcher<V>,
{
    /// Wrap a fetcher with retry logic.
    pub fn new(inner: F, config: RetryConfig) -> Self {
        Self {
            inner,
            config,
            _value: PhantomData,
        }
    }

    pub fn inner(&self) -> &F {
        &self.inner
    }
}

#[async_trait]
impl<F, V> Fetcher<V> for RetryingFetcher<F, V>
where
    F: Fetcher<V>,
    V: Send + 'static,
{
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn fetch(&self, text: &str) -> Result<V> {
        with_retry(&self.config, self.inner.name(), || self.inner.fetch(text)).await
    }
}
