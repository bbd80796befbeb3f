//! Acquisition-specific error type, wrapping the shared taxonomy (§7).

use kg_core::CoreError;

#[derive(Debug, thiserror::Error)]
pub enum AcquisitionError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("http transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("response body did not parse: {0}")]
    Parse(String),

    #[error(transparent)]
    Db(#[from] kg_db::DbError),

    #[error("cannot merge an empty list of papers")]
    EmptyMerge,
}

pub type AcquisitionResult<T> = Result<T, AcquisitionError>;

impl AcquisitionError {
    /// Whether this error should count as a circuit-breaker failure (§4.2).
    pub fn counts_as_breaker_failure(&self) -> bool {
        match self {
            AcquisitionError::Core(e) => e.counts_as_breaker_failure(),
            AcquisitionError::Http(_) => true,
            _ => false,
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            AcquisitionError::Core(e) => e.is_retryable(),
            AcquisitionError::Http(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }
}
