//! Metric store boundary.
//!
//! The scheduler never writes samples; it only asks the store for the samples
//! recorded inside a window. Anything that can answer an inclusive
//! `[from, to]` range query for an instance can act as the store.

mod memory;

pub use memory::InMemoryMetricStore;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Seconds since the Unix epoch, the store's timestamp domain.
pub type Timestamp = i64;

/// A recorded metric sample.
///
/// The scheduler treats the payload as opaque and hands whole batches to
/// the reporter without looking inside.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// When the sample was recorded.
    pub timestamp: Timestamp,
    /// The recorded values.
    pub payload: serde_json::Value,
}

impl Sample {
    pub fn new(timestamp: Timestamp, payload: serde_json::Value) -> Self {
        Self { timestamp, payload }
    }
}

/// Errors surfaced by a metric store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("unknown instance: {0}")]
    UnknownInstance(String),

    #[error("{0}")]
    Other(String),
}

/// Time-series store queried by the scheduler.
#[async_trait]
pub trait MetricStore: Send + Sync + 'static {
    /// Return the samples of `instance` with `from <= timestamp <= to`,
    /// ordered by timestamp ascending.
    ///
    /// An empty result is a valid answer, not an error.
    async fn query(
        &self,
        instance: &str,
        from: Timestamp,
        to: Timestamp,
    ) -> Result<Vec<Sample>, StoreError>;
}
