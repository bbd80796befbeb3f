//! Extraction-specific error type, wrapping the shared taxonomy (§7).

use kg_core::CoreError;

#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("pdf extraction failed: {0}")]
    Pdf(String),

    #[error("llm call failed: {0}")]
    Llm(String),

    #[error(transparent)]
    Db(#[from] kg_db::DbError),

    #[error("pipeline error at stage '{stage}': {message}")]
    Pipeline { stage: String, message: String },
}

pub type ExtractionResult<T> = Result<T, ExtractionError>;

impl ExtractionError {
    pub fn is_retryable(&self) -> bool {
        match self {
            ExtractionError::Core(e) => e.is_retryable(),
            ExtractionError::Llm(_) => true,
            _ => false,
        }
    }
}
