//! Errors raised while locating and loading host configuration.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    /// A config value failed validation
    #[error("Invalid host configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// `config.json` is not valid JSON for [`crate::Config`]
    #[error("Malformed config file: {0}")]
    Json(#[from] serde_json::Error),

    /// No home directory to put `~/.docbridge` under; pass `--base-dir`.
    #[error("Could not determine home directory, pass --base-dir")]
    NoHomeDir,
}

pub type CoreResult<T> = Result<T, CoreError>;
