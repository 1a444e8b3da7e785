//! Application-wide error types.

use thiserror::Error;

use crate::reporter::ReporterError;
use crate::scheduler::{RegistryError, SendError};
use crate::store::StoreError;

/// Application-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Application-wide error type.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unknown reporter: {0}")]
    UnknownReporter(String),

    #[error("Reporter {reporter} failed to initialize: {source}")]
    ReporterInit {
        reporter: String,
        #[source]
        source: ReporterError,
    },

    #[error("Metric store error: {0}")]
    Store(#[from] StoreError),

    #[error("Scheduler unavailable: {0}")]
    Unavailable(#[from] SendError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn reporter_init(reporter: impl Into<String>, source: ReporterError) -> Self {
        Self::ReporterInit {
            reporter: reporter.into(),
            source,
        }
    }
}
