//! Telemetry metric name constants.
//!
//! Centralised metric names for muninn operations. Consumers install their
//! own `metrics` recorder (e.g. prometheus, statsd); without a recorder
//! installed, all metric calls are no-ops.
//!
//! # Metric naming conventions
//!
//! All metrics are prefixed with `muninn_`. Counters end in `_total`,
//! histograms use meaningful units (e.g. `_seconds`).
//!
//! # Common labels
//!
//! - `namespace` — key namespace of the cache (e.g. "gemini")
//! - `fetcher` — fetcher name (e.g. "gemini")
//! - `status` — outcome: "ok" or "error"

/// Total fresh cache hits.
///
/// Labels: `namespace`.
pub const CACHE_HITS_TOTAL: &str = "muninn_cache_hits_total";

/// Total cache misses (absent or expired).
///
/// Labels: `namespace`.
pub const CACHE_MISSES_TOTAL: &str = "muninn_cache_misses_total";

/// Total entries evicted to stay within capacity.
///
/// Labels: `namespace`.
pub const CACHE_EVICTIONS_TOTAL: &str = "muninn_cache_evictions_total";

/// Total entries removed because their TTL elapsed (lazy or swept).
///
/// Labels: `namespace`.
pub const CACHE_EXPIRED_TOTAL: &str = "muninn_cache_expired_total";

/// Total callers that waited on another caller's in-flight request.
///
/// Labels: `namespace`.
pub const PENDING_WAITS_TOTAL: &str = "muninn_pending_waits_total";

/// Total pending waits that gave up after `max_wait`.
///
/// Labels: `namespace`.
pub const PENDING_WAIT_TIMEOUTS_TOTAL: &str = "muninn_pending_wait_timeouts_total";

/// Time spent sleeping in the outbound throttle, in seconds.
///
/// Labels: `namespace`.
pub const THROTTLE_WAIT_SECONDS: &str = "muninn_throttle_wait_seconds";

/// Total outbound calls issued through the cache.
///
/// Labels: `namespace`, `status` ("ok" | "error").
pub const FETCHES_TOTAL: &str = "muninn_fetches_total";

/// Total retry attempts (not counting the initial request).
///
/// Labels: `fetcher`.
pub const RETRIES_TOTAL: &str = "muninn_retries_total";
