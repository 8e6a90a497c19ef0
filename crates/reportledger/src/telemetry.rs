//! Logging setup.
//!
//! Events go to stderr and, when a log directory is configured, are also
//! appended to `email-runner.log` there.

use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;

use thiserror::Error;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::ParseError;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};

/// File name of the persistent runner log.
pub const RUNNER_LOG_FILE: &str = "email-runner.log";

/// Errors while installing the subscriber.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// The filter directive is invalid.
    #[error("invalid log filter '{value}': {source}")]
    EnvFilter {
        /// Offending directive.
        value: String,
        /// Parse error.
        source: ParseError,
    },

    /// The runner log could not be opened.
    #[error("cannot open runner log: {0}")]
    LogFile(#[from] std::io::Error),

    /// A global subscriber is already installed.
    #[error("telemetry error: {0}")]
    Subscriber(#[from] TryInitError),
}

/// Installs the global subscriber.
///
/// # Errors
///
/// Returns an error if the filter is invalid, the log file cannot be
/// opened, or a subscriber is already set.
pub fn init(filter: &str, log_dir: Option<&Path>) -> Result<(), TelemetryError> {
    let env_filter = EnvFilter::try_new(filter).map_err(|source| TelemetryError::EnvFilter {
        value: filter.to_string(),
        source,
    })?;

    let file_layer = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(dir.join(RUNNER_LOG_FILE))?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_target(false)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .with(file_layer)
        .try_init()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_filter_is_rejected() {
        assert!(matches!(
            init("reportledger=notalevel", None),
            Err(TelemetryError::EnvFilter { .. })
        ));
    }
}
