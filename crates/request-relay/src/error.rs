//! Relay error types.

use thiserror::Error;

/// Relay error type.
#[derive(Error, Debug)]
pub enum RelayError {
    /// The target answered with a non-success status
    #[error("Request failed with status {status} {status_text}: {body}")]
    UnexpectedStatus {
        status: u16,
        status_text: String,
        /// First 200 characters of the response body.
        body: String,
    },

    /// Method name is not a valid HTTP method
    #[error("Invalid HTTP method: {0}")]
    InvalidMethod(String),

    /// Header name or value cannot be sent
    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    /// URL parse error
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// HTTP transport error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl RelayError {
    /// HTTP status of the failed response, if the server answered.
    pub fn status(&self) -> Option<u16> {
        match self {
            RelayError::UnexpectedStatus { status, .. } => Some(*status),
            RelayError::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

/// Result type alias using RelayError.
pub type RelayResult<T> = Result<T, RelayError>;
