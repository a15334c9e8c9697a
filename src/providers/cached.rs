//! Caching decorator for fetchers.

use std::sync::Arc;

use async_trait::async_trait;

use super::traits::Fetcher;
use crate::cache::RequestCache;
use crate::{MuninnError, Result};

/// Decorator that routes a [`Fetcher`] through a [`RequestCache`].
///
/// Fresh hits skip the inner fetcher entirely. Concurrent misses for the
/// same text share one inner call, and inner calls are spaced by the
/// cache's throttle. Inner errors pass through unchanged and are not cached.
pub struct CachedFetcher<F, V> {
    inner: F,
    cache: Arc<RequestCache<V>>,
}

impl<F, V> CachedFetcher<F, V>
where
    F: Fetcher<V>,
    V: Clone,
{
    pub fn new(inner: F, cache: Arc<RequestCache<V>>) -> Self {
        Self { inner, cache }
    }

    /// The cache this fetcher reads and populates.
    pub fn cache(&self) -> &Arc<RequestCache<V>> {
        &self.cache
    }

    pub fn inner(&self) -> &F {
        &self.inner
    }
}

#[async_trait]
impl<F, V> Fetcher<V> for CachedFetcher<F, V>
where
    F: Fetcher<V>,
    V: Clone + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn fetch(&self, text: &str) -> Result<V> {
        if text.trim().is_empty() {
            return Err(MuninnError::InvalidInput(
                "request text must not be empty".to_string(),
            ));
        }
        self.cache
            .get_or_fetch(text, || self.inner.fetch(text))
            .await
    }
}
