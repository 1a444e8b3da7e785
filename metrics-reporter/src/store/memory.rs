use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use parking_lot::RwLock;

use super::{MetricStore, Sample, StoreError, Timestamp};

type Series = BTreeMap<Timestamp, Vec<Sample>>;

/// In-process metric store keyed by instance.
///
/// Samples sharing a timestamp keep their insertion order.
#[derive(Debug, Default)]
pub struct InMemoryMetricStore {
    series: RwLock<HashMap<String, Series>>,
}

impl InMemoryMetricStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a sample for an instance.
    pub fn record(&self, instance: &str, sample: Sample) {
        self.series
            .write()
            .entry(instance.to_string())
            .or_default()
            .entry(sample.timestamp)
            .or_default()
            .push(sample);
    }

    /// Record a payload at the given timestamp.
    pub fn record_at(&self, instance: &str, timestamp: Timestamp, payload: serde_json::Value) {
        self.record(instance, Sample::new(timestamp, payload));
    }

    /// Number of samples held for an instance.
    pub fn len(&self, instance: &str) -> usize {
        self.series
            .read()
            .get(instance)
            .map(|series| series.values().map(Vec::len).sum())
            .unwrap_or(0)
    }

    pub fn is_empty(&self, instance: &str) -> bool {
        self.len(instance) == 0
    }

    /// Drop every sample older than `cutoff`. Returns how many were removed.
    pub fn prune_before(&self, instance: &str, cutoff: Timestamp) -> usize {
        let mut guard = self.series.write();
        let Some(series) = guard.get_mut(instance) else {
            return 0;
        };
        let kept = series.split_off(&cutoff);
        let removed = series.values().map(Vec::len).sum();
        *series = kept;
        removed
    }
}

#[async_trait]
impl MetricStore for InMemoryMetricStore {
    async fn query(
        &self,
        instance: &str,
        from: Timestamp,
        to: Timestamp,
    ) -> Result<Vec<Sample>, StoreError> {
        if from > to {
            return Ok(Vec::new());
        }

        let guard = self.series.read();
        let Some(series) = guard.get(instance) else {
            return Ok(Vec::new());
        };

        Ok(series
            .range(from..=to)
            .flat_map(|(_, samples)| samples.iter().cloned())
            .collect())
    }
}
