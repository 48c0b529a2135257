//! Error types for the Dropbox OAuth broker

use std::fmt;
use std::io;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::{error, warn};

/// Result type alias for the broker
pub type Result<T> = std::result::Result<T, Error>;

/// Rejection returned by the provider's token or authorize endpoint.
///
/// `message` carries the provider's `error` code and `description` its
/// human-readable `error_description`, when one was sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationError {
    /// Provider error code (e.g. `invalid_grant`)
    pub message: String,
    /// Optional human-readable detail
    pub description: Option<String>,
}

impl AuthorizationError {
    /// Create an authorization error
    pub fn new(message: impl Into<String>, description: Option<String>) -> Self {
        Self {
            message: message.into(),
            description,
        }
    }
}

impl fmt::Display for AuthorizationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.description {
            Some(description) if description != &self.message => {
                write!(f, "{}: {description}", self.message)
            }
            _ => f.write_str(&self.message),
        }
    }
}

impl std::error::Error for AuthorizationError {}

/// Broker errors
#[derive(Error, Debug)]
pub enum Error {
    /// A required request field was absent or empty
    #[error("Missing required parameter: {0}")]
    MissingParameter(&'static str),

    /// A request field was present but unusable
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The provider rejected the request
    #[error("Authorization failed: {0}")]
    Authorization(#[from] AuthorizationError),

    /// The loopback redirect arrived without a `code` parameter
    #[error("Authorization redirect did not carry a code")]
    MissingCode,

    /// A deadline expired (outbound call or redirect wait)
    #[error("Timed out: {0}")]
    Timeout(String),

    /// The provider answered 2xx with an unusable body
    #[error("Invalid provider response: {0}")]
    InvalidResponse(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether this error was caused by the caller's input
    #[must_use]
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::MissingParameter(_) | Self::InvalidArgument(_))
    }

    /// HTTP status the API surface answers with
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        if self.is_validation() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

/// Plain-text error body with the mapped status
impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!(error = %self, "Request failed");
        } else {
            warn!(error = %self, "Request rejected");
        }
        (status, self.to_string()).into_response()
    }
}
