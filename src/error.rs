use thiserror::Error;

/// Errors surfaced by the rental engine and its stores.
///
/// `NotFound` and `Conflict` are expected outcomes that callers handle; an
/// operation failing with either of them never leaves a partial write behind.
#[derive(Error, Debug)]
pub enum RentalError {
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
    #[cfg(feature = "storage-rocksdb")]
    #[error("Storage error: {0}")]
    StorageError(#[from] rocksdb::Error),
    #[error("Internal error: {0}")]
    InternalError(Box<dyn std::error::Error + Send + Sync>),
}

impl RentalError {
    pub fn not_found(what: impl std::fmt::Display) -> Self {
        Self::NotFound(what.to_string())
    }

    pub fn conflict(what: impl std::fmt::Display) -> Self {
        Self::Conflict(what.to_string())
    }

    pub fn validation(what: impl std::fmt::Display) -> Self {
        Self::ValidationError(what.to_string())
    }
}

pub type Result<T> = std::result::Result<T, RentalError>;
