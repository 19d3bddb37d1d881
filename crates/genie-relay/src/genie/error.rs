//! Backend error types.

use std::time::Duration;

use thiserror::Error;

use crate::retry::{RetryClass, is_non_retryable_message};

/// Errors that can occur when calling the Genie backend.
#[derive(Debug, Error)]
pub enum GenieError {
    /// HTTP request failed
    #[error("http request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// 401 or 403
    #[error("unauthorized (status {status}): {message}")]
    Unauthorized { status: u16, message: String },

    /// 400
    #[error("bad request (status {status}): {message}")]
    BadRequest { status: u16, message: String },

    /// Any other non-success response
    #[error("api error (status {status}): {message}")]
    Api { status: u16, message: String },

    /// The backend reported that the pending message failed
    #[error("operation failed: {0}")]
    OperationFailed(String),

    #[error("timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    /// Response body did not have the expected shape
    #[error("unexpected response: {0}")]
    Decode(String),
}

impl GenieError {
    /// Map a non-success HTTP status to the matching variant.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            401 | 403 => GenieError::Unauthorized { status, message },
            400 => GenieError::BadRequest { status, message },
            _ => GenieError::Api { status, message },
        }
    }

    /// Short, user-safe name of the error category.
    pub fn kind(&self) -> &'static str {
        match self {
            GenieError::Request(_) => "RequestError",
            GenieError::Unauthorized { .. } => "Unauthorized",
            GenieError::BadRequest { .. } => "BadRequest",
            GenieError::Api { .. } => "ApiError",
            GenieError::OperationFailed(_) => "OperationFailed",
            GenieError::Timeout(_) => "Timeout",
            GenieError::Decode(_) => "DecodeError",
        }
    }

    pub fn is_timeout(&self) -> bool {
        match self {
            GenieError::Timeout(_) => true,
            GenieError::Request(e) => e.is_timeout(),
            _ => false,
        }
    }
}

impl RetryClass for GenieError {
    fn is_retryable(&self) -> bool {
        match self {
            GenieError::Unauthorized { .. } | GenieError::BadRequest { .. } => false,
            GenieError::Timeout(_) => true,
            // Display text includes the URL; classify by status only.
            GenieError::Request(e) => !matches!(
                e.status().map(|s| s.as_u16()),
                Some(400 | 401 | 403)
            ),
            other => !is_non_retryable_message(&other.to_string()),
        }
    }

    fn attempt_timed_out(timeout: Duration) -> Self {
        GenieError::Timeout(timeout)
    }
}
