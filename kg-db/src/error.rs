//! Database error types.

/// Database operation errors, shared by the PDF cache store (C6) and the
/// batch job queue store (C14).
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("SQL error: {0}")]
    Sql(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("migration error: {0}")]
    Migration(String),
}

/// Result type alias for database operations.
pub type DbResult<T> = Result<T, DbError>;
