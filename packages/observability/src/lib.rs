//! # Observability
//!
//! Structured logging for the DocBridge background host.
//!
//! The host is a **log producer**. It calls `observability::init_with_config()`
//! once at startup and uses the standard `tracing` macros everywhere else.
//! Nothing in the connect flow or the request relay knows where logs end up.
//!
//! ## Sinks
//!
//! Every event is written as one JSON object per line to
//! `~/.docbridge/logs/background.jsonl` (or `LogConfig::log_path`).
//! A compact human-readable copy can additionally go to stderr.
//!
//! stdout is never used: the host speaks its message protocol there.
//!
//! Fields whose name mentions a token, cookie or authorization header are
//! redacted before they are written.
//!
//! ## Usage
//!
//! ```rust,ignore
//! observability::init_with_config(observability::LogConfig {
//!     service_name: "background-host".into(),
//!     default_level: "debug".into(),
//!     also_stderr: true,
//!     ..Default::default()
//! });
//! tracing::info!("host started");
//! ```

mod file_sink;
mod json_layer;

use std::path::PathBuf;

pub use file_sink::{default_log_path, CentralLogWriter};
pub use json_layer::{JsonLayer, LogEntry};

/// Configuration for the logging system.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Name of the service, included in every log line.
    pub service_name: String,

    /// Default log level filter (e.g., "debug", "info", "warn").
    /// Can be overridden by `RUST_LOG` environment variable.
    pub default_level: String,

    /// Optional custom log file path.
    /// Defaults to `~/.docbridge/logs/background.jsonl`.
    pub log_path: Option<PathBuf>,

    /// Also emit compact logs to stderr.
    pub also_stderr: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            service_name: "unknown".into(),
            default_level: "info".into(),
            log_path: None,
            also_stderr: false,
        }
    }
}

/// Initialize the observability layer with custom configuration.
///
/// If the log file cannot be opened the host keeps running with stderr
/// logging only; losing the JSONL sink must never take the host down.
pub fn init_with_config(config: LogConfig) {
    file_sink::init_subscriber(&config);
}
