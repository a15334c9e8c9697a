//! Periodic expiry sweep.
//!
//! [`RequestCache`] only drops expired entries lazily, when they are read.
//! Hosts that want stale entries gone even if nobody asks for them again run
//! [`spawn_sweeper`], which calls [`RequestCache::purge_expired`] on a fixed
//! period. The cache never owns this task; the host starts it and aborts the
//! returned handle on shutdown.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;

use super::RequestCache;

/// Default sweep period: one hour.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(3600);

/// Spawn a task that purges expired entries every `period`.
///
/// The first sweep runs one full `period` after spawning.
///
/// # Panics
///
/// Requires a tokio runtime context. Panics if `period` is zero.
pub fn spawn_sweeper<V>(cache: Arc<RequestCache<V>>, period: Duration) -> JoinHandle<()>
where
    V: Clone + Send + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let removed = cache.purge_expired();
            debug!(
                removed,
                remaining = cache.len(),
                "swept expired cache entries"
            );
        }
    })
}
