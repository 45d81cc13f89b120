//! Error types for agora-catalog

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Duplicate identifier: {0}")]
    DuplicateIdentifier(String),

    #[error("Missing required field: {0}")]
    MissingRequiredField(String),

    #[error("Invalid ordering: {0}")]
    InvalidOrdering(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] sled::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CatalogError {
    /// Whether this error is a validation failure that aborted before any write.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            CatalogError::DuplicateIdentifier(_)
                | CatalogError::MissingRequiredField(_)
                | CatalogError::InvalidOrdering(_)
                | CatalogError::NotFound(_)
                | CatalogError::InvalidInput(_)
        )
    }
}
