//! Cache key derivation.
//!
//! Request text is normalized (trimmed, lowercased) and hashed with a
//! 31-multiplier polynomial rolling hash over UTF-16 code units, folded into
//! the signed 32-bit range. The absolute value is prefixed with the cache's
//! namespace tag, so `"Hello World"` under namespace `gemini` becomes
//! something like `gemini_1794106052`.
//!
//! The hash is stable across processes and platforms. It is not collision
//! free: [`RequestCache`](super::RequestCache) keeps the normalized text next
//! to each entry and treats a text mismatch as a miss.

use std::fmt;

/// Derived key for a request. Cheap to clone and compare.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    /// Derive the key for `text` under `namespace`.
    pub fn derive(namespace: &str, text: &str) -> Self {
        Self::from_normalized(namespace, &normalize(text))
    }

    pub(crate) fn from_normalized(namespace: &str, normalized: &str) -> Self {
        CacheKey(format!("{namespace}_{}", rolling_hash(normalized)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Trim surrounding whitespace and case-fold.
pub fn normalize(text: &str) -> String {
    text.trim().to_lowercase()
}

fn rolling_hash(text: &str) -> u32 {
    let hash = text
        .encode_utf16()
        .fold(0i32, |h, unit| h.wrapping_mul(31).wrapping_add(i32::from(unit)));
    hash.unsigned_abs()
}
