//! Muninn - single-flight request cache for AI inference calls
//!
//! This crate fronts an expensive outbound request (typically a model
//! inference call) with a [`RequestCache`] that:
//!
//! - answers repeated requests from a bounded, TTL-checked store,
//! - lets at most one outbound call per distinct request run while other
//!   callers wait for its result,
//! - spaces outbound calls process-wide by a minimum interval.
//!
//! The cached payload is opaque to the cache: it is generic over the
//! response type and never inspects it.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use muninn::{CacheConfig, CachedFetcher, Fetcher, GeminiClient, RequestCache};
//!
//! #[tokio::main]
//! async fn main() -> muninn::Result<()> {
//!     let cache = Arc::new(RequestCache::new(CacheConfig::default()));
//!     let client = GeminiClient::new("your-api-key")
//!         .prompt_template("List the places mentioned in: {text}. Answer as JSON.");
//!     let fetcher = CachedFetcher::new(client, cache);
//!
//!     let places = fetcher.fetch("Trip from Lyon to Geneva").await?;
//!     println!("{places}");
//!
//!     // Served from the cache; no second request is sent.
//!     let again = fetcher.fetch("  trip from lyon to geneva ").await?;
//!     assert_eq!(places, again);
//!     Ok(())
//! }
//! ```
//!
//! # Using the primitives directly
//!
//! ```rust
//! use muninn::{CacheConfig, RequestCache};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let cache: RequestCache<u32> = RequestCache::new(CacheConfig::default());
//! let value: Result<u32, std::io::Error> = cache
//!     .get_or_fetch("question", || async { Ok(42) })
//!     .await;
//! assert_eq!(value.unwrap(), 42);
//! assert_eq!(cache.lookup("QUESTION"), Some(42));
//! # }
//! ```

pub mod cache;
#[cfg(feature = "cli")]
pub mod config;
pub mod error;
pub mod providers;
pub mod telemetry;

// Re-export main types at crate root
pub use cache::{CacheConfig, CacheKey, PendingGuard, RequestCache, spawn_sweeper};
pub use error::{MuninnError, Result};
#[cfg(feature = "gemini")]
pub use providers::GeminiClient;
pub use providers::{CachedFetcher, Fetcher, RetryConfig, RetryingFetcher};
