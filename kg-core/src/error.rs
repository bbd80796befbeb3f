//! The shared error taxonomy (§7), implemented once here and reused (via
//! `#[from]`) by every crate's own error enum, wrapping `sqlx::Error` and
//! friends rather than redefining them per module.

use std::time::Duration;

/// Cross-cutting error classes shared by the acquisition, extraction, and
/// canonicalization crates. Crate-local error enums wrap this type alongside
/// their own crate-specific variants (e.g. `MatcherError`, `AutoLinkerError`,
/// `PipelineError` live in `kg-graph`/`kg-extraction`, not here, since only
/// those crates can construct them meaningfully).
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// Record absent at the source or in the graph. Never recorded as a
    /// circuit-breaker failure.
    #[error("not found")]
    NotFound,

    /// Honored by the retry layer (C3); does not count against the retry
    /// budget.
    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    /// HTTP 4xx (not 404/429) or a malformed response body. Retried up to
    /// `max_retries`, then surfaced.
    #[error("API error (status {status}): {body}")]
    ApiError { status: u16, body: String },

    /// Timeouts, 5xx, or graph-store transient errors. Retried with backoff.
    #[error("transient error: {0}")]
    Transient(String),

    /// The circuit is open; fast-fail. The caller may try a fallback source.
    #[error("circuit open")]
    CircuitOpen,

    /// Reported to the caller, never retried.
    #[error("duplicate record")]
    Duplicate,

    /// Reported to the caller, never retried.
    #[error("validation error: {0}")]
    ValidationError(String),
}

impl CoreError {
    /// Whether this error class should count as a circuit-breaker failure
    /// (§4.2/§7: `NotFound` never does; `RateLimited` is honored separately
    /// by the retry layer and also does not trip the breaker).
    pub fn counts_as_breaker_failure(&self) -> bool {
        !matches!(
            self,
            CoreError::NotFound | CoreError::RateLimited { .. } | CoreError::CircuitOpen
        )
    }

    /// Whether the retry-with-backoff layer (C3) should retry this error.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CoreError::RateLimited { .. } | CoreError::Transient(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_and_rate_limited_do_not_count_as_breaker_failures() {
        assert!(!CoreError::NotFound.counts_as_breaker_failure());
        assert!(
            !CoreError::RateLimited {
                retry_after: Duration::from_secs(1)
            }
            .counts_as_breaker_failure()
        );
        assert!(CoreError::Transient("timeout".into()).counts_as_breaker_failure());
    }

    #[test]
    fn only_rate_limited_and_transient_are_retryable() {
        assert!(CoreError::Transient("x".into()).is_retryable());
        assert!(
            CoreError::RateLimited {
                retry_after: Duration::from_secs(1)
            }
            .is_retryable()
        );
        assert!(!CoreError::NotFound.is_retryable());
        assert!(!CoreError::Duplicate.is_retryable());
    }
}
