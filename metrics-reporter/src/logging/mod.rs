//! Logging setup with a reloadable filter.
//!
//! - Console output with local timezone timestamps
//! - Optional daily-rolling log file written off the calling thread
//! - Runtime filter changes via `tracing_subscriber::reload`

use std::path::{Path, PathBuf};

use chrono::Local;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::Writer, time::FormatTime},
    layer::SubscriberExt,
    reload::{self, Handle},
    util::SubscriberInitExt,
};

use crate::{Error, Result};

/// Default log filter directive.
pub const DEFAULT_LOG_FILTER: &str = "metrics_reporter=info";

/// Prefix of rolling log file names.
pub const LOG_FILE_PREFIX: &str = "metrics-reporter.log";

/// Timestamps in the local timezone.
#[derive(Debug, Clone, Copy)]
struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        let now = Local::now();
        write!(w, "{}", now.format("%Y-%m-%dT%H:%M:%S%.3f%:z"))
    }
}

/// Type alias for the reload handle.
pub type FilterHandle = Handle<EnvFilter, tracing_subscriber::Registry>;

/// Handle to the installed subscriber.
pub struct LoggingConfig {
    handle: FilterHandle,
    log_dir: Option<PathBuf>,
}

impl LoggingConfig {
    /// Get the current filter directive string.
    pub fn get_filter(&self) -> String {
        self.handle
            .with_current(|filter| filter.to_string())
            .unwrap_or_default()
    }

    /// Set a new filter directive, e.g. `metrics_reporter=debug`.
    pub fn set_filter(&self, directive: &str) -> Result<()> {
        let new_filter = parse_filter(directive)?;

        self.handle
            .reload(new_filter)
            .map_err(|e| Error::Other(format!("Failed to reload filter: {}", e)))?;

        info!(directive = %directive, "Log filter updated");
        Ok(())
    }

    /// Directory log files are written to, if file logging is enabled.
    pub fn log_dir(&self) -> Option<&Path> {
        self.log_dir.as_deref()
    }
}

fn parse_filter(directive: &str) -> Result<EnvFilter> {
    EnvFilter::try_new(directive)
        .map_err(|e| Error::config(format!("Invalid filter directive: {}", e)))
}

/// Pick the initial filter: `RUST_LOG`, then `configured`, then the default.
fn initial_filter(configured: Option<&str>) -> Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    match configured {
        Some(directive) if !directive.trim().is_empty() => parse_filter(directive),
        _ => Ok(EnvFilter::new(DEFAULT_LOG_FILTER)),
    }
}

/// Install the global subscriber.
///
/// Keep the returned guard alive for the lifetime of the process, or buffered
/// file output is lost.
pub fn init_logging(
    filter: Option<&str>,
    log_dir: Option<&Path>,
) -> Result<(LoggingConfig, Option<WorkerGuard>)> {
    let (filter_layer, filter_handle) = reload::Layer::new(initial_filter(filter)?);

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_timer(LocalTimer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt::layer().with_ansi(true).with_timer(LocalTimer))
        .with(file_layer)
        .try_init()
        .map_err(|e| Error::Other(format!("Failed to set global default subscriber: {}", e)))?;

    let config = LoggingConfig {
        handle: filter_handle,
        log_dir: log_dir.map(Path::to_path_buf),
    };

    Ok((config, guard))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter() {
        assert!(DEFAULT_LOG_FILTER.contains("metrics_reporter=info"));
        assert!(parse_filter(DEFAULT_LOG_FILTER).is_ok());
    }

    #[test]
    fn test_invalid_directive_is_config_error() {
        let result = parse_filter("metrics_reporter=loud");
        assert!(matches!(result, Err(Error::Configuration(_))));
    }

    #[test]
    fn test_reload_handle_updates_filter() {
        let (layer, handle): (_, FilterHandle) =
            reload::Layer::new(EnvFilter::new(DEFAULT_LOG_FILTER));
        let _subscriber = tracing_subscriber::registry().with(layer);
        let config = LoggingConfig {
            handle,
            log_dir: None,
        };

        config.set_filter("metrics_reporter=debug").unwrap();
        assert_eq!(config.get_filter(), "metrics_reporter=debug");
        assert!(config.set_filter("metrics_reporter=loud").is_err());
        assert_eq!(config.log_dir(), None);
    }
}
