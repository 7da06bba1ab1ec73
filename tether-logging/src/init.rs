use std::path::Path;

use anyhow::Result;
use tether_config::{LogFormat, LoggingConfig};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::session::session_subscriber;

fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_new(level)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Initialize simple tracing for basic console output
pub fn init_simple_tracing(log_level: &str) -> Result<()> {
    // Use try_init to avoid panic if global subscriber already set
    if tracing_subscriber::fmt()
        .with_env_filter(env_filter(log_level))
        .with_writer(std::io::stderr)
        .try_init()
        .is_err()
    {
        tracing::debug!("Global tracing subscriber already initialized, skipping");
    }

    Ok(())
}

/// Initialize logging from configuration
pub fn init_logging_from_config(config: &LoggingConfig) -> Result<()> {
    let filter = env_filter(&config.level.to_string());
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_file(config.include_location)
        .with_line_number(config.include_location);

    let installed = match config.format {
        LogFormat::Json => builder.json().finish().try_init(),
        LogFormat::Compact => builder.compact().finish().try_init(),
        LogFormat::Text => builder.finish().try_init(),
    };

    if installed.is_err() {
        tracing::debug!("Global tracing subscriber already initialized, skipping");
    }

    Ok(())
}

/// Initialize logging for the worker running inside the engine process.
///
/// Events are appended to the session log; lines that cannot be written
/// there go to stderr.
pub fn init_session_logging(path: &Path, log_level: &str) -> Result<()> {
    if session_subscriber(path, log_level).try_init().is_err() {
        tracing::debug!("Global tracing subscriber already initialized, skipping");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_double_init_does_not_fail() {
        assert!(init_simple_tracing("debug").is_ok());
        assert!(init_simple_tracing("info").is_ok());
        assert!(init_logging_from_config(&LoggingConfig::default()).is_ok());
    }

    #[test]
    fn test_invalid_filter_falls_back() {
        // A nonsense directive must not panic
        let _ = env_filter("[[[");
    }
}
