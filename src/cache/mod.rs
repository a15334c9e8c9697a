//! Caching subsystem.
//!
//! - [`RequestCache`] — bounded TTL cache with single-flight
//!   de-duplication and a process-wide outbound throttle. Fronts the
//!   outbound call; see the [`request`] module docs for the protocol.
//!
//! - [`CacheKey`] — deterministic key derived from normalized request text.
//!
//! - [`spawn_sweeper`] — host-driven periodic purge of expired entries.

pub mod key;
pub mod request;
pub mod sweep;

pub use key::{CacheKey, normalize};
pub use request::{CacheConfig, PendingGuard, RequestCache};
pub use sweep::{DEFAULT_SWEEP_INTERVAL, spawn_sweeper};
