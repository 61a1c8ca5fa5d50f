use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DatabaseError {
    #[error("Authentication error: {0}")]
    Unauthorized(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Duplicate key: {0}")]
    Duplicate(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Request rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Failed to decode response: {0}")]
    Decode(String),
}

impl DatabaseError {
    /// Timeouts, connection failures and 5xx responses are worth retrying;
    /// everything else is a property of the request itself.
    pub fn is_retryable(&self) -> bool {
        matches!(self, DatabaseError::Unavailable(_))
    }

    pub fn from_status(status: u16, body: String) -> Self {
        // PostgREST reports unique violations as 409 with Postgres code 23505
        if status == 409 || body.contains("23505") {
            return DatabaseError::Duplicate(body);
        }

        match status {
            401 | 403 => DatabaseError::Unauthorized(body),
            404 => DatabaseError::NotFound(body),
            500..=599 => DatabaseError::Unavailable(format!("API error ({}): {}", status, body)),
            _ => DatabaseError::Rejected { status, message: body },
        }
    }
}

impl From<reqwest::Error> for DatabaseError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            DatabaseError::Decode(err.to_string())
        } else {
            DatabaseError::Unavailable(err.to_string())
        }
    }
}

impl From<serde_json::Error> for DatabaseError {
    fn from(err: serde_json::Error) -> Self {
        DatabaseError::Decode(err.to_string())
    }
}
