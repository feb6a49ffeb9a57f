//! Configuration, paths, logging and shared error types for the DocBridge
//! background host.

mod config;
mod error;
mod logging;
mod paths;

pub use config::{
    Config, DEFAULT_APP_SLUG, DEFAULT_HANDSHAKE_URL, DEFAULT_LOG_LEVEL, DEFAULT_POLL_INTERVAL_MS,
    DEFAULT_POLL_MAX_ATTEMPT, DEFAULT_PROVIDER_URL,
};
pub use error::{CoreError, CoreResult};
pub use logging::{init_logging, parse_level};
pub use paths::Paths;
