//! Tracing subscriber setup
//!
//! Environment variables take precedence over `[logging]`:
//!
//! - `REASONFLOW_LOG` - filter directives (`info`, `reasonflow=debug`, ...)
//! - `REASONFLOW_LOG_JSON` - `1` for JSON lines, `0` for compact text
//! - `REASONFLOW_LOG_FILE` - append to this file instead of stderr

use std::env;
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::OnceLock;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;
use crate::error::{EngineError, Result};

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Resolved logging settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSettings {
    pub filter: String,
    pub json: bool,
    pub file: Option<PathBuf>,
}

impl LogSettings {
    /// Merge the config with environment overrides
    pub fn resolve(config: &LoggingConfig) -> Self {
        LogSettings::resolve_with(config, |key| env::var(key).ok())
    }

    fn resolve_with(config: &LoggingConfig, var: impl Fn(&str) -> Option<String>) -> Self {
        let filter = var("REASONFLOW_LOG").unwrap_or_else(|| config.level.clone());
        let json = var("REASONFLOW_LOG_JSON").map_or_else(|| config.format == "json", |v| v != "0");
        let file = var("REASONFLOW_LOG_FILE")
            .map(PathBuf::from)
            .or_else(|| config.file.clone());
        LogSettings { filter, json, file }
    }
}

/// Install the global tracing subscriber.
///
/// Only the first call in a process takes effect; later calls return `Ok`.
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    let settings = LogSettings::resolve(config);

    let (writer, guard) = match &settings.file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| {
                    EngineError::Configuration(format!(
                        "unable to open log file '{}': {e}",
                        path.display()
                    ))
                })?;
            tracing_appender::non_blocking(file)
        }
        None => tracing_appender::non_blocking(std::io::stderr()),
    };

    let filter = EnvFilter::try_new(&settings.filter).map_err(|e| {
        EngineError::Configuration(format!("invalid log filter '{}': {e}", settings.filter))
    })?;

    let base = || {
        tracing_subscriber::fmt()
            .with_env_filter(filter.clone())
            .with_ansi(false)
            .with_thread_names(true)
            .with_writer(writer.clone())
    };
    let subscriber: Box<dyn tracing::Subscriber + Send + Sync> = if settings.json {
        Box::new(base().json().finish())
    } else {
        Box::new(base().compact().finish())
    };

    if tracing::subscriber::set_global_default(subscriber).is_ok() {
        let _ = LOG_GUARD.set(guard);
    }
    Ok(())
}
