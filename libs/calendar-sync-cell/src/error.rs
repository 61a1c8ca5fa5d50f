use thiserror::Error;

use appointment_cell::models::AppointmentError;
use shared_database::DatabaseError;
use shared_models::error::AppError;

/// Failures reported by the external calendar provider.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ProviderError {
    #[error("Provider rate limit reached: {0}")]
    RateLimited(String),

    #[error("Provider quota exhausted: {0}")]
    QuotaExceeded(String),

    #[error("Provider request timed out: {0}")]
    Timeout(String),

    #[error("Provider connection failed: {0}")]
    Connection(String),

    #[error("Provider server error ({status}): {message}")]
    Server { status: u16, message: String },

    /// The continuation token is no longer accepted; a full resync is required.
    #[error("Sync token is no longer valid")]
    TokenGone,

    #[error("Provider resource not found: {0}")]
    NotFound(String),

    #[error("Provider rejected credentials: {0}")]
    Unauthorized(String),

    #[error("Provider rejected request: {0}")]
    InvalidRequest(String),

    #[error("Provider resource already exists: {0}")]
    Duplicate(String),

    #[error("Unexpected provider response: {0}")]
    Unexpected(String),
}

impl ProviderError {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ProviderError::RateLimited(_)
                | ProviderError::QuotaExceeded(_)
                | ProviderError::Timeout(_)
                | ProviderError::Connection(_)
                | ProviderError::Server { .. }
                | ProviderError::TokenGone
        )
    }

    /// Errors after which the calendar cannot be synced until someone intervenes.
    pub fn requires_attention(&self) -> bool {
        matches!(self, ProviderError::NotFound(_) | ProviderError::Unauthorized(_))
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ProviderError::Timeout(err.to_string())
        } else if err.is_connect() || err.is_request() {
            ProviderError::Connection(err.to_string())
        } else {
            ProviderError::Unexpected(err.to_string())
        }
    }
}

#[derive(Debug, Error)]
pub enum CalendarSyncError {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("Calendar store error: {0}")]
    Store(#[from] DatabaseError),

    #[error("Appointment store error: {0}")]
    Appointment(#[from] AppointmentError),

    #[error("Calendar not found: {0}")]
    NotFound(String),

    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Validation error: {0}")]
    Validation(String),
}

impl CalendarSyncError {
    pub fn is_retryable(&self) -> bool {
        match self {
            CalendarSyncError::Provider(e) => e.is_retryable(),
            CalendarSyncError::Store(e) => e.is_retryable(),
            CalendarSyncError::Appointment(e) => e.is_retryable(),
            _ => false,
        }
    }
}

impl From<CalendarSyncError> for AppError {
    fn from(err: CalendarSyncError) -> Self {
        match err {
            CalendarSyncError::NotFound(msg) => AppError::NotFound(msg),
            CalendarSyncError::MissingField(field) => {
                AppError::BadRequest(format!("Missing required field: {}", field))
            }
            CalendarSyncError::Validation(msg) => AppError::ValidationError(msg),
            CalendarSyncError::Provider(ProviderError::NotFound(msg)) => AppError::NotFound(msg),
            CalendarSyncError::Provider(e) => AppError::ExternalService(e.to_string()),
            CalendarSyncError::Appointment(AppointmentError::NotFound) => {
                AppError::NotFound("Appointment not found".to_string())
            }
            other => AppError::Database(other.to_string()),
        }
    }
}
