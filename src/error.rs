use thiserror::Error;

/// Domain-level error taxonomy. Lookup misses are `None` results, never errors.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Malformed input to a core operation; the caller can correct and retry.
    #[error("validation error: {0}")]
    Validation(String),

    /// Referenced meal or food item does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Vision response is missing required structure.
    #[error("parsing error: {0}")]
    Parsing(String),

    /// External collaborator failure (vision, catalog, storage, database).
    #[error("external service error: {0}")]
    External(#[from] anyhow::Error),
}

impl CoreError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn parsing(msg: impl Into<String>) -> Self {
        Self::Parsing(msg.into())
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
