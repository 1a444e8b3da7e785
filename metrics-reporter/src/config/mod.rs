//! Application and scheduler configuration.
//!
//! Configuration is a JSON document:
//!
//! ```json
//! {
//!   "log_filter": "metrics_reporter=debug",
//!   "log_dir": "logs",
//!   "instances": [
//!     { "instance": "node", "reporter": "log", "report_interval_ms": 60000 },
//!     { "instance": "edge", "reporter": ["jsonl", { "path": "out/edge.jsonl" }] }
//!   ]
//! }
//! ```

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::reporter::ReporterSpec;
use crate::{Error, Result};

/// Environment variable naming the configuration file.
pub const CONFIG_PATH_ENV: &str = "METRICS_REPORTER_CONFIG";

/// Configuration file used when `METRICS_REPORTER_CONFIG` is unset.
pub const DEFAULT_CONFIG_PATH: &str = "metrics-reporter.json";

/// Environment variable overriding `log_dir`.
pub const LOG_DIR_ENV: &str = "METRICS_REPORTER_LOG_DIR";

/// Configuration of a single report scheduler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Metric-store namespace this scheduler serves.
    pub instance: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reporter: Option<ReporterSpec>,
    /// Report cadence; absent means manual-only reporting.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report_interval_ms: Option<u64>,
}

impl SchedulerConfig {
    pub fn new(instance: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
            reporter: None,
            report_interval_ms: None,
        }
    }

    pub fn with_reporter(mut self, reporter: ReporterSpec) -> Self {
        self.reporter = Some(reporter);
        self
    }

    pub fn with_interval_ms(mut self, interval_ms: u64) -> Self {
        self.report_interval_ms = Some(interval_ms);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.instance.trim().is_empty() {
            return Err(Error::validation("instance name must not be empty"));
        }
        if self.report_interval_ms == Some(0) {
            return Err(Error::validation(format!(
                "instance {}: report_interval_ms must be positive",
                self.instance
            )));
        }
        if let Some(spec) = &self.reporter
            && spec.id().trim().is_empty()
        {
            return Err(Error::validation(format!(
                "instance {}: reporter identifier must not be empty",
                self.instance
            )));
        }
        Ok(())
    }
}

/// Top-level configuration of the `metrics-reporter` binary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Filter directive for logging; `RUST_LOG` wins when set.
    pub log_filter: Option<String>,
    /// Directory for rolling log files. Console only when absent.
    pub log_dir: Option<PathBuf>,
    pub instances: Vec<SchedulerConfig>,
}

impl AppConfig {
    /// Parse and validate a JSON document.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a file. A missing file yields the default configuration.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(json) => {
                let config = Self::from_json(&json).map_err(|e| match e {
                    Error::Serialization(e) => {
                        Error::config(format!("{}: {}", path.display(), e))
                    }
                    other => other,
                })?;
                info!(
                    path = %path.display(),
                    instances = config.instances.len(),
                    "Configuration loaded"
                );
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No configuration file, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Load from the path in `METRICS_REPORTER_CONFIG` (or the default path),
    /// then apply environment overrides.
    ///
    /// Supported env vars:
    /// - `METRICS_REPORTER_CONFIG` (e.g. "/etc/metrics-reporter.json")
    /// - `METRICS_REPORTER_LOG_DIR` (e.g. "/var/log/metrics-reporter")
    pub fn from_env() -> Result<Self> {
        let path = std::env::var(CONFIG_PATH_ENV)
            .ok()
            .filter(|p| !p.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());

        let mut config = Self::load(path)?;

        if let Ok(log_dir) = std::env::var(LOG_DIR_ENV)
            && !log_dir.trim().is_empty()
        {
            config.log_dir = Some(PathBuf::from(log_dir));
        }

        Ok(config)
    }

    /// Validate every scheduler and require unique instance names.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for scheduler in &self.instances {
            scheduler.validate()?;
            if !seen.insert(scheduler.instance.as_str()) {
                return Err(Error::validation(format!(
                    "duplicate instance: {}",
                    scheduler.instance
                )));
            }
        }
        Ok(())
    }
}
