//! The outbound-call seam.
//!
//! A [`Fetcher`] turns request text into a response value. Implementations
//! issue the real call (see [`GeminiClient`](super::GeminiClient)); the
//! decorators in this module tree add caching and retry on top:
//!
//! ```ignore
//! let client = GeminiClient::new(key);
//! let retrying = RetryingFetcher::new(client, RetryConfig::default());
//! let cached = CachedFetcher::new(retrying, Arc::new(RequestCache::new(config)));
//! let value = cached.fetch("Eiffel Tower").await?;
//! ```

use std::sync::Arc;

use async_trait::async_trait;

use crate::Result;

/// Produces a response value for a piece of request text.
#[async_trait]
pub trait Fetcher<V>: Send + Sync {
    /// Fetcher name for logging/metrics.
    fn name(&self) -> &str;

    /// Issue the outbound call for `text`.
    async fn fetch(&self, text: &str) -> Result<V>;
}

#[async_trait]
impl<V, F> Fetcher<V> for Arc<F>
where
    F: Fetcher<V> + ?Sized,
    V: 'static,
{
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn fetch(&self, text: &str) -> Result<V> {
        (**self).fetch(text).await
    }
}
