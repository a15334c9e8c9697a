//! Request cache with TTL freshness, outbound throttling, and single-flight
//! de-duplication.
//!
//! [`RequestCache`] fronts an expensive outbound call (an AI inference
//! request). It answers from a bounded store when a fresh response exists,
//! makes concurrent callers for the same request wait on the one call
//! already in flight, and spaces outbound calls process-wide by
//! [`CacheConfig::min_interval`].
//!
//! # Protocol
//!
//! [`RequestCache::get_or_fetch`] runs the whole protocol around a caller
//! supplied future:
//!
//! 1. [`lookup`](RequestCache::lookup): a fresh hit returns immediately.
//! 2. If another caller holds the pending marker,
//!    [`await_pending`](RequestCache::await_pending) until it settles; a
//!    stored result is returned. If the holder failed, waiters race for the
//!    marker again and one of them becomes the new holder. A timeout falls
//!    through and issues a call alongside the one still in flight.
//! 3. [`claim`](RequestCache::claim) the marker. The returned
//!    [`PendingGuard`] unmarks on drop, so errors, panics and cancellation
//!    all release it.
//! 4. [`throttle_wait`](RequestCache::throttle_wait).
//! 5. Run the outbound call.
//! 6. [`store`](RequestCache::store) a successful result.
//! 7. Return the result or the outbound error, unchanged.
//!
//! The primitives are public for hosts that need a different composition.
//!
//! # Eviction
//!
//! Capacity eviction is by insertion order, not recency of reads. Replacing
//! an existing entry refreshes its timestamp but keeps its position.
//! Expired entries are removed lazily on read, or in bulk by
//! [`purge_expired`](RequestCache::purge_expired), which the host is
//! expected to run periodically (see [`spawn_sweeper`](super::spawn_sweeper)).

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::key::{CacheKey, normalize};
use crate::telemetry;

/// Configuration for a [`RequestCache`].
///
/// ```rust
/// # use muninn::CacheConfig;
/// # use std::time::Duration;
/// let config = CacheConfig::new()
///     .max_entries(200)
///     .ttl(Duration::from_secs(3600))
///     .min_interval(Duration::from_millis(500));
/// ```
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum resident entries. Clamped to at least 1. Default: 50.
    pub max_entries: usize,
    /// Freshness window per entry. Default: 24 hours.
    pub ttl: Duration,
    /// Minimum spacing between any two outbound calls. Default: 2s.
    pub min_interval: Duration,
    /// How long a caller waits on another caller's in-flight request.
    /// Default: 30s.
    pub max_wait: Duration,
    /// Prefix for derived keys. Default: `"gemini"`.
    pub namespace: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 50,
            ttl: Duration::from_secs(24 * 3600),
            min_interval: Duration::from_secs(2),
            max_wait: Duration::from_secs(30),
            namespace: "gemini".to_string(),
        }
    }
}

impl CacheConfig {
    /// Create a new config with sensible defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum number of resident entries.
    pub fn max_entries(mut self, n: usize) -> Self {
        self.max_entries = n;
        self
    }

    /// Set the time-to-live for entries.
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Set the minimum spacing between outbound calls.
    pub fn min_interval(mut self, interval: Duration) -> Self {
        self.min_interval = interval;
        self
    }

    /// Set how long waiters block on a pending request.
    pub fn max_wait(mut self, wait: Duration) -> Self {
        self.max_wait = wait;
        self
    }

    /// Set the key namespace tag.
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }
}

struct Entry<V> {
    /// Normalized text the entry was stored under; guards against key collisions.
    text: String,
    value: V,
    stored_at: Instant,
    /// Insertion sequence number, index into `State::order`.
    seq: u64,
}

struct PendingSlot {
    since: Instant,
    generation: u64,
    owners: usize,
    /// Dropped with the slot, which wakes every subscribed waiter.
    wake: watch::Sender<()>,
}

struct State<V> {
    entries: HashMap<CacheKey, Entry<V>>,
    order: BTreeMap<u64, CacheKey>,
    next_seq: u64,
    pending: HashMap<CacheKey, PendingSlot>,
    next_generation: u64,
    last_request_at: Option<Instant>,
}

impl<V> State<V> {
    fn new() -> Self {
        Self {
            entries: HashMap::new(),
            order: BTreeMap::new(),
            next_seq: 0,
            pending: HashMap::new(),
            next_generation: 0,
            last_request_at: None,
        }
    }

    fn remove(&mut self, key: &CacheKey) -> Option<Entry<V>> {
        let entry = self.entries.remove(key)?;
        self.order.remove(&entry.seq);
        Some(entry)
    }

    fn evict_oldest(&mut self) -> Option<CacheKey> {
        let (_, key) = self.order.pop_first()?;
        self.entries.remove(&key);
        Some(key)
    }
}

/// In-memory request cache. See the module docs for the protocol.
///
/// Thread-safe; share it as `Arc<RequestCache<V>>`. Every operation that
/// does not suspend runs inside one short critical section, so it is atomic
/// with respect to other callers. The lock is never held across `.await`.
pub struct RequestCache<V> {
    config: CacheConfig,
    state: Mutex<State<V>>,
}

impl<V: Clone> RequestCache<V> {
    /// Create an empty cache with the given configuration.
    pub fn new(config: CacheConfig) -> Self {
        let config = CacheConfig {
            max_entries: config.max_entries.max(1),
            ..config
        };
        Self {
            config,
            state: Mutex::new(State::new()),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Derive the key `text` is cached under.
    pub fn key(&self, text: &str) -> CacheKey {
        CacheKey::derive(&self.config.namespace, text)
    }

    /// Return the cached value for `text` if it is still fresh.
    ///
    /// An expired entry is removed on the way out.
    pub fn lookup(&self, text: &str) -> Option<V> {
        let normalized = normalize(text);
        let key = CacheKey::from_normalized(&self.config.namespace, &normalized);
        let mut state = self.lock();
        let now = Instant::now();

        let expired = match state.entries.get(&key) {
            Some(entry) if entry.text != normalized => {
                debug!(key = %key, "cache key collision, treating as miss");
                false
            }
            Some(entry) if now.saturating_duration_since(entry.stored_at) < self.config.ttl => {
                metrics::counter!(telemetry::CACHE_HITS_TOTAL, "namespace" => self.config.namespace.clone())
                    .increment(1);
                return Some(entry.value.clone());
            }
            Some(_) => true,
            None => false,
        };

        if expired {
            state.remove(&key);
            metrics::counter!(telemetry::CACHE_EXPIRED_TOTAL, "namespace" => self.config.namespace.clone())
                .increment(1);
            debug!(key = %key, "cache entry expired");
        }
        metrics::counter!(telemetry::CACHE_MISSES_TOTAL, "namespace" => self.config.namespace.clone())
            .increment(1);
        None
    }

    /// Insert or replace the value for `text`.
    ///
    /// When the cache is full and `text` is new, the oldest-inserted entry
    /// is evicted first.
    pub fn store(&self, text: &str, value: V) {
        let normalized = normalize(text);
        let key = CacheKey::from_normalized(&self.config.namespace, &normalized);
        let mut state = self.lock();
        let now = Instant::now();

        if let Some(entry) = state.entries.get_mut(&key) {
            entry.text = normalized;
            entry.value = value;
            entry.stored_at = now;
            debug!(key = %key, "cache entry replaced");
            return;
        }

        while state.entries.len() >= self.config.max_entries {
            let Some(evicted) = state.evict_oldest() else {
                break;
            };
            metrics::counter!(telemetry::CACHE_EVICTIONS_TOTAL, "namespace" => self.config.namespace.clone())
                .increment(1);
            debug!(key = %evicted, "cache full, evicted oldest entry");
        }

        let seq = state.next_seq;
        state.next_seq += 1;
        state.order.insert(seq, key.clone());
        state.entries.insert(
            key,
            Entry {
                text: normalized,
                value,
                stored_at: now,
                seq,
            },
        );
    }

    /// Remove every entry whose TTL has elapsed. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let mut state = self.lock();
        let now = Instant::now();
        let ttl = self.config.ttl;

        let expired: Vec<CacheKey> = state
            .entries
            .iter()
            .filter(|(_, e)| now.saturating_duration_since(e.stored_at) >= ttl)
            .map(|(k, _)| k.clone())
            .collect();
        for key in &expired {
            state.remove(key);
        }

        if !expired.is_empty() {
            metrics::counter!(telemetry::CACHE_EXPIRED_TOTAL, "namespace" => self.config.namespace.clone())
                .increment(expired.len() as u64);
        }
        expired.len()
    }

    /// Drop all entries and pending markers. Waiters wake and see a miss.
    pub fn clear(&self) {
        let mut state = self.lock();
        state.entries.clear();
        state.order.clear();
        state.pending.clear();
    }

    /// Number of resident entries, including expired ones not yet purged.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of keys with an outbound call in flight.
    pub fn pending_count(&self) -> usize {
        self.lock().pending.len()
    }

    // ------------------------------------------------------------------
    // Pending markers
    // ------------------------------------------------------------------

    /// Whether an outbound call for `text` is in flight.
    pub fn is_pending(&self, text: &str) -> bool {
        let key = self.key(text);
        self.lock().pending.contains_key(&key)
    }

    /// How long the current pending marker for `text` has been held.
    pub fn pending_for(&self, text: &str) -> Option<Duration> {
        let key = self.key(text);
        let state = self.lock();
        state
            .pending
            .get(&key)
            .map(|slot| Instant::now().saturating_duration_since(slot.since))
    }

    /// Mark `text` as having an outbound call in flight.
    ///
    /// Must be paired with [`unmark_pending`](Self::unmark_pending). Prefer
    /// [`claim`](Self::claim), which pairs them automatically.
    pub fn mark_pending(&self, text: &str) {
        let key = self.key(text);
        self.mark(key);
    }

    /// Remove the pending marker for `text`, waking any waiters. No-op if
    /// there is none.
    pub fn unmark_pending(&self, text: &str) {
        let key = self.key(text);
        if self.lock().pending.remove(&key).is_some() {
            debug!(key = %key, "pending marker removed");
        }
    }

    /// Mark `text` pending and return a guard that unmarks it on drop.
    ///
    /// If the marker is already held (a waiter that timed out and decided
    /// to issue its own call), the guard joins it: the marker stays until
    /// every holder has dropped its guard.
    pub fn claim(&self, text: &str) -> PendingGuard<'_, V> {
        let key = self.key(text);
        let generation = self.mark(key.clone());
        PendingGuard {
            cache: self,
            key,
            generation,
        }
    }

    /// Claim `text` only if no outbound call for it is in flight.
    ///
    /// The check and the mark happen under one lock, so of two racing
    /// callers exactly one gets the guard.
    pub fn try_claim(&self, text: &str) -> Option<PendingGuard<'_, V>> {
        let key = self.key(text);
        let generation = {
            let mut state = self.lock();
            if state.pending.contains_key(&key) {
                return None;
            }
            Self::mark_locked(&mut state, key.clone())
        };
        Some(PendingGuard {
            cache: self,
            key,
            generation,
        })
    }

    /// Wait for another caller's in-flight request for `text` to settle.
    ///
    /// Returns `None` immediately when nothing is pending. Otherwise waits
    /// until the marker is released and returns whatever
    /// [`lookup`](Self::lookup) then finds. After
    /// [`CacheConfig::max_wait`] it gives up and returns `None`; the
    /// in-flight request is left running and will still populate the cache.
    pub async fn await_pending(&self, text: &str) -> Option<V> {
        match self.wait_settled(text).await {
            Wait::Settled(value) => value,
            Wait::TimedOut => None,
        }
    }

    async fn wait_settled(&self, text: &str) -> Wait<V> {
        let key = self.key(text);
        let mut wake = {
            let state = self.lock();
            match state.pending.get(&key) {
                Some(slot) => slot.wake.subscribe(),
                None => return Wait::Settled(None),
            }
        };
        metrics::counter!(telemetry::PENDING_WAITS_TOTAL, "namespace" => self.config.namespace.clone())
            .increment(1);

        let deadline = deadline_after(Instant::now(), self.config.max_wait);
        loop {
            match tokio::time::timeout_at(deadline, wake.changed()).await {
                // Marker gone: the request settled (or the cache was cleared).
                Ok(Err(_)) => return Wait::Settled(self.lookup(text)),
                // One holder settled while others remain; take its result if stored.
                Ok(Ok(())) => {
                    if let Some(value) = self.lookup(text) {
                        return Wait::Settled(Some(value));
                    }
                }
                Err(_) => {
                    metrics::counter!(telemetry::PENDING_WAIT_TIMEOUTS_TOTAL, "namespace" => self.config.namespace.clone())
                        .increment(1);
                    warn!(
                        key = %key,
                        max_wait_ms = self.config.max_wait.as_millis() as u64,
                        "gave up waiting for pending request"
                    );
                    return Wait::TimedOut;
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Throttle
    // ------------------------------------------------------------------

    /// Wait until the next outbound call is permitted, then record it.
    ///
    /// The next slot is `last + min_interval` (or now, if that has passed).
    /// It is reserved before sleeping, so concurrent callers are handed
    /// successive slots instead of all observing "no wait needed".
    pub async fn throttle_wait(&self) {
        let now = Instant::now();
        let slot = {
            let mut state = self.lock();
            let slot = match state.last_request_at {
                Some(last) => deadline_after(last, self.config.min_interval).max(now),
                None => now,
            };
            state.last_request_at = Some(slot);
            slot
        };

        let wait = slot.saturating_duration_since(now);
        if !wait.is_zero() {
            debug!(wait_ms = wait.as_millis() as u64, "throttling outbound request");
            metrics::histogram!(telemetry::THROTTLE_WAIT_SECONDS, "namespace" => self.config.namespace.clone())
                .record(wait.as_secs_f64());
            tokio::time::sleep_until(slot).await;
        }
    }

    // ------------------------------------------------------------------
    // Composed protocol
    // ------------------------------------------------------------------

    /// Return the cached value for `text`, or run `fetch` to produce it.
    ///
    /// At most one `fetch` per key runs at a time while other callers are
    /// waiting; they share its result. Errors from `fetch` are returned
    /// unchanged and nothing is stored.
    pub async fn get_or_fetch<F, Fut, E>(&self, text: &str, fetch: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        if let Some(value) = self.lookup(text) {
            return Ok(value);
        }

        let _guard = loop {
            if let Some(guard) = self.try_claim(text) {
                break guard;
            }
            match self.wait_settled(text).await {
                Wait::Settled(Some(value)) => return Ok(value),
                // The owner failed or the cache was cleared. Compete for the
                // marker again so only one waiter takes over.
                Wait::Settled(None) => continue,
                // The owner is still running; issue our own call alongside it.
                Wait::TimedOut => break self.claim(text),
            }
        };

        self.throttle_wait().await;

        match fetch().await {
            Ok(value) => {
                metrics::counter!(telemetry::FETCHES_TOTAL,
                    "namespace" => self.config.namespace.clone(),
                    "status" => "ok",
                )
                .increment(1);
                self.store(text, value.clone());
                Ok(value)
            }
            Err(e) => {
                metrics::counter!(telemetry::FETCHES_TOTAL,
                    "namespace" => self.config.namespace.clone(),
                    "status" => "error",
                )
                .increment(1);
                Err(e)
            }
        }
    }

    fn mark(&self, key: CacheKey) -> u64 {
        let mut state = self.lock();
        Self::mark_locked(&mut state, key)
    }

    fn mark_locked(state: &mut State<V>, key: CacheKey) -> u64 {
        let now = Instant::now();
        if let Some(slot) = state.pending.get_mut(&key) {
            slot.owners += 1;
            slot.since = now;
            return slot.generation;
        }

        let generation = state.next_generation;
        state.next_generation += 1;
        debug!(key = %key, "pending marker set");
        let (wake, _) = watch::channel(());
        state.pending.insert(
            key,
            PendingSlot {
                since: now,
                generation,
                owners: 1,
                wake,
            },
        );
        generation
    }

    fn release(&self, key: &CacheKey, generation: u64) {
        let mut state = self.lock();
        let Some(slot) = state.pending.get_mut(key) else {
            return;
        };
        // A newer marker replaced ours after an explicit unmark.
        if slot.generation != generation {
            return;
        }
        slot.owners = slot.owners.saturating_sub(1);
        if slot.owners == 0 {
            state.pending.remove(key);
            debug!(key = %key, "pending marker released");
        } else {
            slot.wake.send_replace(());
        }
    }
}

/// Outcome of waiting on another caller's pending marker.
enum Wait<V> {
    /// The marker was released; carries whatever the cache then held.
    Settled(Option<V>),
    /// `max_wait` elapsed with the marker still held.
    TimedOut,
}

/// Thirty years: a deadline that never fires in practice.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// `start + after`, saturating to a far-future instant instead of
/// overflowing on huge configured durations.
fn deadline_after(start: Instant, after: Duration) -> Instant {
    start
        .checked_add(after)
        .unwrap_or_else(|| start + FAR_FUTURE)
}

impl<V> RequestCache<V> {
    fn lock(&self) -> MutexGuard<'_, State<V>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Scoped ownership of a pending marker. Dropping it releases the marker.
#[must_use = "the pending marker is released as soon as the guard is dropped"]
pub struct PendingGuard<'a, V: Clone> {
    cache: &'a RequestCache<V>,
    key: CacheKey,
    generation: u64,
}

impl<V: Clone> PendingGuard<'_, V> {
    pub fn key(&self) -> &CacheKey {
        &self.key
    }
}

impl<V: Clone> Drop for PendingGuard<'_, V> {
    fn drop(&mut self) {
        self.cache.release(&self.key, self.generation);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config() -> CacheConfig {
        CacheConfig::new()
            .max_entries(3)
            .min_interval(Duration::ZERO)
    }

    #[test]
    fn config_defaults() {
        let config = CacheConfig::default();
        assert_eq!(config.max_entries, 50);
        assert_eq!(config.ttl, Duration::from_secs(86_400));
        assert_eq!(config.min_interval, Duration::from_millis(2000));
        assert_eq!(config.max_wait, Duration::from_millis(30_000));
        assert_eq!(config.namespace, "gemini");
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let cache: RequestCache<u32> = RequestCache::new(CacheConfig::new().max_entries(0));
        assert_eq!(cache.config().max_entries, 1);
        cache.store("a", 1);
        cache.store("b", 2);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.lookup("b"), Some(2));
    }

    #[test]
    fn replacement_keeps_insertion_position() {
        let cache = RequestCache::new(small_config());
        cache.store("a", 1);
        cache.store("b", 2);
        cache.store("c", 3);
        cache.store("a", 10);
        cache.store("d", 4);

        // "a" was inserted first, so it is still the oldest.
        assert_eq!(cache.lookup("a"), None);
        assert_eq!(cache.lookup("b"), Some(2));
        assert_eq!(cache.lookup("d"), Some(4));
    }

    #[test]
    fn order_index_tracks_entries() {
        let cache = RequestCache::new(small_config());
        for i in 0..10u32 {
            cache.store(&format!("k{i}"), i);
        }
        let state = cache.lock();
        assert_eq!(state.entries.len(), 3);
        assert_eq!(state.order.len(), 3);
        assert!(state.order.values().all(|k| state.entries.contains_key(k)));
    }

    #[test]
    fn collision_is_a_miss_not_a_wrong_value() {
        let cache = RequestCache::new(small_config());
        cache.store("real", 1);

        // Forge a colliding entry: same key, different stored text.
        {
            let key = cache.key("real");
            let mut state = cache.lock();
            let entry = state.entries.get_mut(&key).unwrap();
            entry.text = "something else".to_string();
        }
        assert_eq!(cache.lookup("real"), None);
    }

    #[test]
    fn guard_releases_on_drop() {
        let cache: RequestCache<u32> = RequestCache::new(small_config());
        {
            let guard = cache.claim("q");
            assert_eq!(guard.key(), &cache.key("q"));
            assert!(cache.is_pending("Q "));
        }
        assert!(!cache.is_pending("q"));
    }

    #[test]
    fn joined_claim_holds_until_last_guard() {
        let cache: RequestCache<u32> = RequestCache::new(small_config());
        let first = cache.claim("q");
        let second = cache.claim("q");
        drop(first);
        assert!(cache.is_pending("q"));
        drop(second);
        assert!(!cache.is_pending("q"));
    }

    #[test]
    fn stale_guard_does_not_release_newer_marker() {
        let cache: RequestCache<u32> = RequestCache::new(small_config());
        let stale = cache.claim("q");
        cache.unmark_pending("q");
        cache.mark_pending("q");
        drop(stale);
        assert!(cache.is_pending("q"));
    }

    #[test]
    fn try_claim_refuses_held_marker() {
        let cache: RequestCache<u32> = RequestCache::new(small_config());
        let held = cache.try_claim("q");
        assert!(held.is_some());
        assert!(cache.try_claim("q").is_none());
        drop(held);
        assert!(cache.try_claim("q").is_some());
    }

    #[test]
    fn deadline_saturates_instead_of_overflowing() {
        let start = Instant::now();
        assert_eq!(
            deadline_after(start, Duration::from_secs(1)),
            start + Duration::from_secs(1)
        );
        assert_eq!(deadline_after(start, Duration::MAX), start + FAR_FUTURE);
    }

    #[tokio::test(start_paused = true)]
    async fn huge_max_wait_does_not_panic() {
        let cache: RequestCache<u32> =
            RequestCache::new(small_config().max_wait(Duration::MAX));
        cache.mark_pending("q");

        let waited =
            tokio::time::timeout(Duration::from_secs(1), cache.await_pending("q")).await;
        assert!(waited.is_err(), "still waiting on the held marker");
    }

    #[tokio::test(start_paused = true)]
    async fn huge_min_interval_does_not_panic() {
        let cache: RequestCache<u32> =
            RequestCache::new(small_config().min_interval(Duration::MAX));
        cache.throttle_wait().await;

        let second =
            tokio::time::timeout(Duration::from_secs(1), cache.throttle_wait()).await;
        assert!(second.is_err(), "second call is held back");
    }

    #[tokio::test(start_paused = true)]
    async fn pending_for_reports_age() {
        let cache: RequestCache<u32> = RequestCache::new(small_config());
        assert_eq!(cache.pending_for("q"), None);
        cache.mark_pending("q");
        tokio::time::advance(Duration::from_millis(250)).await;
        assert_eq!(cache.pending_for("q"), Some(Duration::from_millis(250)));
    }
}
