//! Error taxonomy for console operations.

use reqwest::StatusCode;
use thiserror::Error;

/// Result type for console operations.
pub type HacResult<T> = Result<T, HacError>;

#[derive(Error, Debug)]
pub enum HacError {
    /// Login failed, or an authenticated call was rejected and the session evicted.
    /// Callers are expected to call `login()` again.
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// Network failure or timeout.
    #[error("{operation}: {source}")]
    Request {
        operation: &'static str,
        #[source]
        source: reqwest::Error,
    },

    /// Non-2xx status that is not an authentication failure.
    #[error("{operation}: HTTP {status}")]
    Status {
        operation: &'static str,
        status: StatusCode,
    },

    /// Body could not be decoded into the expected structure.
    #[error("Invalid response from HAC ({operation}): {message}")]
    InvalidResponse {
        operation: &'static str,
        message: String,
    },

    #[error("Configuration error: {0}")]
    Config(String),
}

impl HacError {
    pub fn auth(message: impl Into<String>) -> Self {
        Self::Authentication(message.into())
    }

    pub fn request(operation: &'static str, source: reqwest::Error) -> Self {
        Self::Request { operation, source }
    }

    pub fn invalid_response(operation: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidResponse {
            operation,
            message: message.into(),
        }
    }

    /// True for failures that require a fresh login.
    pub fn is_authentication(&self) -> bool {
        matches!(self, Self::Authentication(_))
    }

    /// Timeouts surface as request errors; this lets callers tell them apart.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Request { source, .. } if source.is_timeout())
    }
}

/// Statuses that mean the console no longer accepts the session.
pub fn is_auth_status(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN | StatusCode::METHOD_NOT_ALLOWED
    )
}
