use thiserror::Error;

/// Service-facing error taxonomy.
///
/// Execution failures and timeouts never appear here: they are recorded
/// as `JobExecution` rows and job status, not raised to callers.
#[derive(Debug, Error)]
pub enum ChronodError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation failed for {field}: {message}")]
    Validation { field: String, message: String },

    #[error("Invalid recurrence spec: {0}")]
    InvalidRecurrenceSpec(String),

    #[error("Job not found: {id}")]
    JobNotFound { id: String },

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ChronodError {
    /// Short error code string for API-layer response mapping.
    pub fn code(&self) -> &'static str {
        match self {
            ChronodError::Config(_) => "CONFIG_ERROR",
            ChronodError::Validation { .. } => "VALIDATION_ERROR",
            ChronodError::InvalidRecurrenceSpec(_) => "INVALID_RECURRENCE",
            ChronodError::JobNotFound { .. } => "JOB_NOT_FOUND",
            ChronodError::Database(_) => "DATABASE_ERROR",
            ChronodError::Serialization(_) => "SERIALIZATION_ERROR",
            ChronodError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Convenience constructor for field-level validation failures.
    pub fn validation(field: &str, message: impl Into<String>) -> Self {
        ChronodError::Validation {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ChronodError>;
