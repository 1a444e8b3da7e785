//! Reporter that forwards batches over a tokio channel.
//!
//! Lets an embedding application consume reports in-process.

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{ReportOutcome, Reporter, ReporterArgs, ReporterError};
use crate::store::Sample;

/// Sends every batch to the receiver returned by [`ChannelReporter::new`].
///
/// Delivery fails once the receiver has been dropped.
#[derive(Debug, Clone)]
pub struct ChannelReporter {
    tx: mpsc::Sender<Vec<Sample>>,
}

impl ChannelReporter {
    /// Create a reporter and the receiving end of its channel.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<Vec<Sample>>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }
}

#[async_trait]
impl Reporter for ChannelReporter {
    /// Number of batches forwarded.
    type State = u64;

    async fn init(&self, _args: &ReporterArgs) -> Result<Self::State, ReporterError> {
        if self.tx.is_closed() {
            return Err(ReporterError::Other("receiver dropped".to_string()));
        }
        Ok(0)
    }

    async fn handle(&self, samples: Vec<Sample>, state: Self::State) -> ReportOutcome<u64> {
        match self.tx.send(samples).await {
            Ok(()) => ReportOutcome::Delivered(state + 1),
            Err(_) => ReportOutcome::Failed {
                reason: "receiver dropped".to_string(),
                state,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_channel_reporter_forwards_batches() {
        let (reporter, mut rx) = ChannelReporter::new(4);
        let state = reporter.init(&json!({})).await.unwrap();

        let outcome = reporter
            .handle(vec![Sample::new(1, json!("a"))], state)
            .await;
        assert_eq!(outcome, ReportOutcome::Delivered(1));

        let batch = rx.recv().await.unwrap();
        assert_eq!(batch, vec![Sample::new(1, json!("a"))]);
    }

    #[tokio::test]
    async fn test_channel_reporter_fails_without_receiver() {
        let (reporter, rx) = ChannelReporter::new(4);
        let state = reporter.init(&json!({})).await.unwrap();
        drop(rx);

        let outcome = reporter.handle(Vec::new(), state).await;
        assert!(!outcome.is_delivered());
        assert_eq!(outcome.into_state(), 0);
        assert!(reporter.init(&json!({})).await.is_err());
    }
}
