//! Logging initialization for the background host.
//!
//! Events go to `<base_dir>/logs/background.jsonl` as JSON lines. Setting
//! `DOCBRIDGE_LOG_STDERR` additionally mirrors them to stderr, which is
//! handy when running the host by hand.

use crate::Paths;

const SERVICE_NAME: &str = "background-host";

/// Initialize the logging system for the background host.
///
/// `level` is the default filter; `RUST_LOG` still wins when set.
pub fn init_logging(level: &str, paths: &Paths) {
    let also_stderr = std::env::var("DOCBRIDGE_LOG_STDERR")
        .ok()
        .map(|raw| env_flag(&raw))
        .unwrap_or(false);

    observability::init_with_config(observability::LogConfig {
        service_name: SERVICE_NAME.into(),
        default_level: parse_level(level).to_string().to_ascii_lowercase(),
        log_path: Some(paths.log_file()),
        also_stderr,
    });
}

fn env_flag(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// Parse a log level string into a tracing Level.
pub fn parse_level(level: &str) -> tracing::Level {
    match level.to_lowercase().as_str() {
        "trace" => tracing::Level::TRACE,
        "debug" => tracing::Level::DEBUG,
        "info" => tracing::Level::INFO,
        "warn" | "warning" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        _ => tracing::Level::INFO,
    }
}
