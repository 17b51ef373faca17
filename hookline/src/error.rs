//! Error types and HTTP response conversion

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Failure reported by the upstream Graph API
///
/// Raised for non-2xx responses and transport faults alike. `status` is
/// `None` when the request never produced a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamError {
    /// HTTP status returned by the upstream, if any
    pub status: Option<u16>,
    /// Human-readable message, preferring the upstream's own error text
    pub message: String,
}

impl UpstreamError {
    /// Create an error for a response that came back with a non-success status
    pub fn status(status: u16, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            message: message.into(),
        }
    }

    /// Create an error for a request that failed before a response arrived
    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            status: None,
            message: message.into(),
        }
    }
}

impl fmt::Display for UpstreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "upstream returned {}: {}", status, self.message),
            None => write!(f, "upstream unreachable: {}", self.message),
        }
    }
}

impl std::error::Error for UpstreamError {}

/// Result type alias using the crate error
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for hookline
///
/// Large error variants are boxed to reduce stack size
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(Box<figment::Error>),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Graph API call failed
    #[error("Upstream error: {0}")]
    Upstream(UpstreamError),

    /// Event store could not be written
    #[error("Event store unwritable: {0}")]
    StoreUnwritable(String),

    /// Event failed shape validation
    #[error("Malformed log entry: {0}")]
    MalformedEntry(String),

    /// Bad request
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Authorization error
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Internal server error
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl Error {
    /// Upstream message, if this is an upstream failure
    pub fn upstream_message(&self) -> Option<&str> {
        match self {
            Error::Upstream(e) => Some(e.message.as_str()),
            _ => None,
        }
    }
}

/// Error response body
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error message
    pub error: String,

    /// Machine-readable error code
    pub code: String,

    /// HTTP status code
    pub status: u16,
}

impl ErrorResponse {
    /// Create error response with a code
    pub fn with_code(
        status: StatusCode,
        code: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            error: error.into(),
            code: code.into(),
            status: status.as_u16(),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, error_response) = match self {
            Error::Config(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorResponse::with_code(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "CONFIG_ERROR",
                    e.to_string(),
                ),
            ),

            Error::Io(e) => {
                tracing::error!("I/O error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse::with_code(
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "IO_ERROR",
                        "I/O operation failed",
                    ),
                )
            }

            Error::Serialization(e) => {
                tracing::error!("Serialization error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse::with_code(
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "SERIALIZATION_ERROR",
                        "Failed to encode or decode data",
                    ),
                )
            }

            Error::Upstream(e) => {
                tracing::error!(status = ?e.status, "Graph API error: {}", e.message);
                (
                    StatusCode::BAD_GATEWAY,
                    ErrorResponse::with_code(StatusCode::BAD_GATEWAY, "UPSTREAM_ERROR", e.message),
                )
            }

            Error::StoreUnwritable(msg) => {
                tracing::error!("Event store unwritable: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse::with_code(
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "STORE_UNWRITABLE",
                        "Event store is not writable",
                    ),
                )
            }

            Error::MalformedEntry(msg) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                ErrorResponse::with_code(
                    StatusCode::UNPROCESSABLE_ENTITY,
                    "MALFORMED_ENTRY",
                    msg,
                ),
            ),

            Error::BadRequest(msg) => (
                StatusCode::BAD_REQUEST,
                ErrorResponse::with_code(StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ),

            Error::Forbidden(msg) => (
                StatusCode::FORBIDDEN,
                ErrorResponse::with_code(StatusCode::FORBIDDEN, "FORBIDDEN", msg),
            ),

            Error::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse::with_code(
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "INTERNAL_ERROR",
                        "Internal server error",
                    ),
                )
            }
        };

        (status, Json(error_response)).into_response()
    }
}

// Manual From implementations for boxed errors
impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Error::Config(Box::new(err))
    }
}

impl From<UpstreamError> for Error {
    fn from(err: UpstreamError) -> Self {
        Error::Upstream(err)
    }
}
