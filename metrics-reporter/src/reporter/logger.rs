//! Reporter that writes batches to the tracing log.

use async_trait::async_trait;
use tracing::{debug, info};

use super::{ReportOutcome, Reporter, ReporterArgs, ReporterError};
use crate::store::Sample;

/// Emits every batch as a tracing event. Never fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogReporter;

/// State kept by [`LogReporter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogReporterState {
    /// Label attached to every event (`label` init argument).
    pub label: String,
    /// Batches written so far.
    pub batches: u64,
    /// Samples written so far.
    pub samples: u64,
}

#[async_trait]
impl Reporter for LogReporter {
    type State = LogReporterState;

    async fn init(&self, args: &ReporterArgs) -> Result<Self::State, ReporterError> {
        let label = match args.get("label") {
            None => "metrics".to_string(),
            Some(serde_json::Value::String(label)) => label.clone(),
            Some(other) => {
                return Err(ReporterError::invalid_args(format!(
                    "label must be a string, got {}",
                    other
                )));
            }
        };

        Ok(LogReporterState {
            label,
            batches: 0,
            samples: 0,
        })
    }

    async fn handle(
        &self,
        samples: Vec<Sample>,
        mut state: Self::State,
    ) -> ReportOutcome<Self::State> {
        info!(
            label = %state.label,
            batch = state.batches + 1,
            samples = samples.len(),
            first = samples.first().map(|s| s.timestamp),
            last = samples.last().map(|s| s.timestamp),
            "Metrics report"
        );

        for sample in &samples {
            debug!(
                label = %state.label,
                timestamp = sample.timestamp,
                payload = %sample.payload,
                "Sample"
            );
        }

        state.batches += 1;
        state.samples += samples.len() as u64;
        ReportOutcome::Delivered(state)
    }
}
