//! Connect-flow error types.

use thiserror::Error;

/// Connect-flow error type.
#[derive(Error, Debug)]
pub enum ConnectError {
    /// Invalid state transition in the connect FSM
    #[error("Invalid connect state transition: {0}")]
    InvalidStateTransition(String),

    /// The install page could not be opened
    #[error("Failed to open install page: {0}")]
    TabOpen(String),

    /// The OS random source failed
    #[error("Failed to generate session id: {0}")]
    Entropy(String),

    /// Storage error
    #[error("Storage error: {0}")]
    Storage(#[from] bridge_storage::StorageError),

    /// HTTP request error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// URL parse error
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl ConnectError {
    /// Returns true if this error is a network hiccup rather than a
    /// definitive answer from the server.
    ///
    /// Transient errors include:
    /// - Connection failures and timeouts
    /// - HTTP errors with 5xx status codes
    pub fn is_transient(&self) -> bool {
        match self {
            ConnectError::Http(e) => {
                if e.is_connect() || e.is_timeout() {
                    return true;
                }
                if let Some(status) = e.status() {
                    return status.is_server_error();
                }
                false
            }
            _ => false,
        }
    }
}

/// Result type alias using ConnectError.
pub type ConnectResult<T> = Result<T, ConnectError>;
