//! Tracing subscriber setup.
//!
//! Console output always; a daily rolling file as well when
//! `logging.log_dir` is configured. `RUST_LOG` takes precedence over the
//! configured filter.

use crate::config::LoggingConfig;
use crate::error::{NeurochainError, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Build the filter: `RUST_LOG` if set and valid, else the configured directives.
pub fn env_filter(config: &LoggingConfig) -> Result<EnvFilter> {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.filter))
        .map_err(|e| NeurochainError::Logging(format!("invalid filter '{}': {}", config.filter, e)))
}

/// Install the global subscriber.
///
/// The returned guard flushes the file writer on drop; keep it alive for as
/// long as logging is needed. Fails instead of panicking when a global
/// subscriber is already installed.
pub fn init(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let filter = env_filter(config)?;

    let (file_layer, guard) = match &config.log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let appender = tracing_appender::rolling::daily(dir, &config.file_prefix);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_writer(writer).with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(file_layer)
        .try_init()
        .map_err(|e| NeurochainError::Logging(e.to_string()))?;

    Ok(guard)
}
