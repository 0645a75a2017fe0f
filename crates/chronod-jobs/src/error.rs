use thiserror::Error;

/// Errors raised by the job repository.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying SQLite / rusqlite error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// No job with the given ID exists in the store.
    #[error("Job not found: {id}")]
    JobNotFound { id: String },
}

pub type Result<T> = std::result::Result<T, StoreError>;
