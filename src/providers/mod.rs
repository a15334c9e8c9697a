//! Fetchers for the outbound call and the decorators layered on them.
//!
//! - [`Fetcher`]: request text in, response value out.
//! - [`CachedFetcher`]: single-flight, throttled, TTL-cached access.
//! - [`RetryingFetcher`]: retries transient failures with backoff.
//! - [`GeminiClient`]: Gemini `generateContent` over HTTP (feature `gemini`).

pub mod cached;
#[cfg(feature = "gemini")]
pub mod gemini;
pub mod retry;
pub mod traits;

pub use cached::CachedFetcher;
#[cfg(feature = "gemini")]
pub use gemini::GeminiClient;
pub use retry::{RetryConfig, RetryingFetcher};
pub use traits::Fetcher;
