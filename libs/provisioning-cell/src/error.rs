use thiserror::Error;
use uuid::Uuid;

use calendar_sync_cell::error::{CalendarSyncError, ProviderError};
use shared_database::DatabaseError;
use shared_models::error::AppError;

#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("Practitioner {0} not found")]
    PractitionerNotFound(Uuid),

    #[error("User {0} is not a practitioner")]
    NotAPractitioner(Uuid),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Calendar provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Calendar store error: {0}")]
    Calendar(#[from] CalendarSyncError),

    #[error("Practitioner directory error: {0}")]
    Directory(#[from] DatabaseError),

    #[error("Notification failed: {0}")]
    Notification(String),
}

impl ProvisionError {
    /// Only transient failures are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            ProvisionError::Provider(e) => e.is_retryable(),
            ProvisionError::Calendar(e) => e.is_retryable(),
            ProvisionError::Directory(e) => e.is_retryable(),
            _ => false,
        }
    }
}

impl From<ProvisionError> for AppError {
    fn from(err: ProvisionError) -> Self {
        match err {
            ProvisionError::PractitionerNotFound(_) => AppError::NotFound(err.to_string()),
            ProvisionError::NotAPractitioner(_) | ProvisionError::Validation(_) => {
                AppError::ValidationError(err.to_string())
            }
            ProvisionError::Provider(_) | ProvisionError::Notification(_) => {
                AppError::ExternalService(err.to_string())
            }
            ProvisionError::Calendar(e) => e.into(),
            ProvisionError::Directory(e) => AppError::Database(e.to_string()),
        }
    }
}
