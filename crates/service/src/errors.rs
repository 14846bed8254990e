use thiserror::Error;

use ksm_core::errors::{ApplicationError, DomainError};
use ksm_db::RepositoryError;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error(transparent)]
    Validation(#[from] DomainError),
    #[error("persistence failure during {operation}: {message}")]
    Persistence { operation: &'static str, message: String },
    #[error("report rendering failure: {0}")]
    Report(String),
}

impl ServiceError {
    /// Classifies a repository failure raised while running `operation`.
    pub fn from_repository(operation: &'static str, error: RepositoryError) -> Self {
        match error {
            RepositoryError::NotFound(what) => Self::NotFound(what),
            RepositoryError::Domain(error) => Self::Validation(error),
            RepositoryError::Database(error) => {
                Self::Persistence { operation, message: error.to_string() }
            }
            RepositoryError::Decode(message) => Self::Persistence { operation, message },
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_) | Self::Validation(DomainError::LineItemNotFound { .. }))
    }
}

impl From<ServiceError> for ApplicationError {
    fn from(value: ServiceError) -> Self {
        match value {
            ServiceError::NotFound(message) => Self::NotFound(message),
            ServiceError::Validation(error) => Self::Domain(error),
            ServiceError::Persistence { operation, message } => {
                Self::Persistence { operation: operation.to_string(), message }
            }
            ServiceError::Report(message) => Self::Report(message),
        }
    }
}
