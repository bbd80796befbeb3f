//! Canonicalization-core error taxonomy (§7), wrapping the shared
//! [`CoreError`] the way `kg-extraction::ExtractionError` does.

use kg_core::CoreError;

#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("graph store error: {0}")]
    Db(#[from] sqlx::Error),

    #[error("sqlite-vec initialization failed: {0}")]
    SqliteVec(String),

    #[error("{0}")]
    Matcher(String),

    #[error("{0}")]
    AutoLinker(String),

    #[error("embedding request failed: {0}")]
    Embedding(String),
}

pub type GraphResult<T> = Result<T, GraphError>;

impl GraphError {
    /// Build a `MatcherError` with the trace-id context every C16/C17/C18
    /// failure must carry (§7).
    pub fn matcher(trace_id: &str, message: impl std::fmt::Display) -> Self {
        GraphError::Matcher(format!("[{trace_id}] {message}"))
    }

    pub fn auto_linker(trace_id: &str, message: impl std::fmt::Display) -> Self {
        GraphError::AutoLinker(format!("[{trace_id}] {message}"))
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            GraphError::Core(e) => e.is_retryable(),
            GraphError::Db(e) => matches!(
                e,
                sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed
            ),
            _ => false,
        }
    }
}
