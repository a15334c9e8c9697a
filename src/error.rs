//! Muninn error types
//!
//! The cache itself never fails. Every variant here comes from the outbound
//! call the cache brackets, or from loading host configuration.

use std::time::Duration;

/// Muninn error types
#[derive(Debug, thiserror::Error)]
pub enum MuninnError {
    // Provider/network errors
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    #[error("authentication failed")]
    AuthenticationFailed,

    #[error("model not found: {0}")]
    ModelNotFound(String),

    #[error("request timed out")]
    Timeout,

    // Data errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("empty response from model")]
    EmptyResponse,

    // Configuration errors
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl MuninnError {
    /// Whether a retry has a reasonable chance of succeeding.
    ///
    /// Network failures, rate limits, timeouts and 5xx/408 API responses are
    /// transient. Everything else is permanent.
    pub fn is_transient(&self) -> bool {
        match self {
            MuninnError::Http(_) | MuninnError::RateLimited { .. } | MuninnError::Timeout => true,
            MuninnError::Api { status, .. } => *status >= 500 || *status == 408,
            _ => false,
        }
    }

    /// Server-provided retry hint, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            MuninnError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

/// Result type alias for Muninn operations
pub type Result<T> = std::result::Result<T, MuninnError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(MuninnError::Http("reset".into()).is_transient());
        assert!(MuninnError::Timeout.is_transient());
        assert!(MuninnError::RateLimited { retry_after: None }.is_transient());
        assert!(
            MuninnError::Api {
                status: 503,
                message: "overloaded".into()
            }
            .is_transient()
        );
        assert!(
            MuninnError::Api {
                status: 408,
                message: "slow".into()
            }
            .is_transient()
        );
    }

    #[test]
    fn permanent_classification() {
        assert!(!MuninnError::AuthenticationFailed.is_transient());
        assert!(!MuninnError::EmptyResponse.is_transient());
        assert!(!MuninnError::InvalidInput("".into()).is_transient());
        assert!(
            !MuninnError::Api {
                status: 400,
                message: "bad".into()
            }
            .is_transient()
        );
    }

    #[test]
    fn retry_after_only_from_rate_limit() {
        let hinted = MuninnError::RateLimited {
            retry_after: Some(Duration::from_secs(7)),
        };
        assert_eq!(hinted.retry_after(), Some(Duration::from_secs(7)));
        assert_eq!(MuninnError::Timeout.retry_after(), None);
    }
}
