//! Reporter that appends each batch to a JSON Lines file.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tracing::warn;

use super::{ReportOutcome, Reporter, ReporterArgs, ReporterError};
use crate::store::Sample;

/// Appends one JSON object per batch to the file named by the `path`
/// init argument.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonLinesReporter;

/// State kept by [`JsonLinesReporter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonLinesState {
    /// Output file.
    pub path: PathBuf,
    /// Batches appended so far.
    pub batches_written: u64,
    /// Failed appends since the last success.
    pub consecutive_failures: u32,
}

#[derive(Serialize)]
struct BatchLine<'a> {
    written_at: String,
    count: usize,
    samples: &'a [Sample],
}

impl JsonLinesReporter {
    async fn append(path: &Path, samples: &[Sample]) -> std::io::Result<()> {
        let line = BatchLine {
            written_at: Utc::now().to_rfc3339(),
            count: samples.len(),
            samples,
        };
        let mut json = serde_json::to_vec(&line)?;
        json.push(b'\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;
        file.write_all(&json).await?;
        file.flush().await
    }
}

#[async_trait]
impl Reporter for JsonLinesReporter {
    type State = JsonLinesState;

    async fn init(&self, args: &ReporterArgs) -> Result<Self::State, ReporterError> {
        let path = args
            .get("path")
            .and_then(|v| v.as_str())
            .filter(|p| !p.is_empty())
            .map(PathBuf::from)
            .ok_or_else(|| ReporterError::invalid_args("jsonl reporter requires a `path`"))?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        Ok(JsonLinesState {
            path,
            batches_written: 0,
            consecutive_failures: 0,
        })
    }

    async fn handle(
        &self,
        samples: Vec<Sample>,
        mut state: Self::State,
    ) -> ReportOutcome<Self::State> {
        match Self::append(&state.path, &samples).await {
            Ok(()) => {
                state.batches_written += 1;
                state.consecutive_failures = 0;
                ReportOutcome::Delivered(state)
            }
            Err(e) => {
                state.consecutive_failures += 1;
                warn!(
                    path = %state.path.display(),
                    failures = state.consecutive_failures,
                    error = %e,
                    "Failed to append metrics batch"
                );
                ReportOutcome::Failed {
                    reason: e.to_string(),
                    state,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_jsonl_appends_one_line_per_batch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("report.jsonl");
        let reporter = JsonLinesReporter;

        let state = reporter
            .init(&json!({"path": path.to_str().unwrap()}))
            .await
            .unwrap();

        let state = reporter
            .handle(vec![Sample::new(10, json!({"rss": 42}))], state)
            .await;
        assert!(state.is_delivered());
        let state = reporter.handle(Vec::new(), state.into_state()).await;
        let state = state.into_state();
        assert_eq!(state.batches_written, 2);

        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        let lines: Vec<serde_json::Value> = contents
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["count"], 1);
        assert_eq!(lines[0]["samples"][0]["timestamp"], 10);
        assert_eq!(lines[1]["count"], 0);
    }

    #[tokio::test]
    async fn test_jsonl_failure_records_state() {
        let dir = tempfile::tempdir().unwrap();
        let reporter = JsonLinesReporter;
        // A directory cannot be opened for appending.
        let state = JsonLinesState {
            path: dir.path().to_path_buf(),
            batches_written: 3,
            consecutive_failures: 0,
        };

        let outcome = reporter.handle(Vec::new(), state).await;
        match outcome {
            ReportOutcome::Failed { state, .. } => {
                assert_eq!(state.consecutive_failures, 1);
                assert_eq!(state.batches_written, 3);
            }
            ReportOutcome::Delivered(_) => panic!("append to a directory should fail"),
        }
    }

    #[tokio::test]
    async fn test_jsonl_requires_path() {
        let result = JsonLinesReporter.init(&json!({})).await;
        assert!(matches!(result, Err(ReporterError::InvalidArgs(_))));
    }
}
