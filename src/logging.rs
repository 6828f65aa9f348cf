use thiserror::Error;
use tracing_subscriber::EnvFilter;

/// Filter used when neither a directive nor `RUST_LOG` is available.
pub const DEFAULT_DIRECTIVE: &str = "warn";

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("invalid log filter '{directive}': {reason}")]
    InvalidFilter { directive: String, reason: String },
    #[error("failed to install log subscriber: {0}")]
    Install(String),
}

/// Explicit directive first, then `RUST_LOG`, then [`DEFAULT_DIRECTIVE`].
pub fn build_filter(directive: Option<&str>) -> Result<EnvFilter, LoggingError> {
    match directive {
        Some(d) => EnvFilter::try_new(d).map_err(|e| LoggingError::InvalidFilter {
            directive: d.to_string(),
            reason: e.to_string(),
        }),
        None => Ok(EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE))),
    }
}

/// Install the global subscriber. Logs go to stderr; stdout carries the report.
pub fn init(directive: Option<&str>) -> Result<(), LoggingError> {
    let filter = build_filter(directive)?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .map_err(|e| LoggingError::Install(e.to_string()))
}
