//! Logging bootstrap for binaries embedding the webhook server
//!
//! The library itself only emits `tracing` events. Applications pick how those
//! are rendered by calling [`init_logging`] once at startup.

use tracing_subscriber::{fmt, EnvFilter, Registry};

/// Logging mode for different deployments
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoggingMode {
    /// No subscriber installed
    Silent,
    /// Compact human-readable stderr output
    Development,
    /// One JSON object per line, for log shippers
    Json,
    /// Verbose output with source locations
    Debug,
}

/// Logging configuration error
#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("Failed to initialize tracing subscriber: {0}")]
    TracingInit(String),

    #[error("Invalid log mode: {0}")]
    InvalidMode(String),
}

/// Initialize logging with the specified mode
///
/// # Environment Variables
///
/// - `RECURLY_HOOK_LOG_LEVEL`: filter directive (e.g. `debug`,
///   `hook_server=trace`); falls back to `RUST_LOG`, then to the mode's default
pub fn init_logging(mode: LoggingMode) -> Result<(), LoggingError> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    match mode {
        LoggingMode::Silent => Ok(()),
        LoggingMode::Development => Registry::default()
            .with(fmt::layer().with_target(false).compact())
            .with(create_env_filter("info"))
            .try_init()
            .map_err(|e| LoggingError::TracingInit(e.to_string())),
        LoggingMode::Json => Registry::default()
            .with(fmt::layer().json().with_current_span(true))
            .with(create_env_filter("info"))
            .try_init()
            .map_err(|e| LoggingError::TracingInit(e.to_string())),
        LoggingMode::Debug => Registry::default()
            .with(
                fmt::layer()
                    .pretty()
                    .with_thread_ids(true)
                    .with_file(true)
                    .with_line_number(true),
            )
            .with(create_env_filter("debug"))
            .try_init()
            .map_err(|e| LoggingError::TracingInit(e.to_string())),
    }
}

/// Initialize logging from `RECURLY_HOOK_LOG_MODE`
///
/// Accepts `silent`, `development`, `json` and `debug`; unset means
/// development.
pub fn init_logging_from_env() -> Result<(), LoggingError> {
    let mode = match std::env::var("RECURLY_HOOK_LOG_MODE") {
        Ok(value) => parse_mode(&value)?,
        Err(_) => LoggingMode::Development,
    };

    init_logging(mode)
}

fn parse_mode(value: &str) -> Result<LoggingMode, LoggingError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "silent" => Ok(LoggingMode::Silent),
        "development" | "dev" => Ok(LoggingMode::Development),
        "json" => Ok(LoggingMode::Json),
        "debug" => Ok(LoggingMode::Debug),
        other => Err(LoggingError::InvalidMode(other.to_string())),
    }
}

/// Environment filter: `RECURLY_HOOK_LOG_LEVEL`, then `RUST_LOG`, then the default
fn create_env_filter(default_level: &str) -> EnvFilter {
    if let Ok(level) = std::env::var("RECURLY_HOOK_LOG_LEVEL") {
        EnvFilter::new(level)
    } else if let Ok(rust_log) = std::env::var("RUST_LOG") {
        EnvFilter::new(rust_log)
    } else {
        EnvFilter::new(default_level)
    }
}

/// Check if a global subscriber has already been installed
pub fn is_initialized() -> bool {
    tracing::dispatcher::has_been_set()
}
