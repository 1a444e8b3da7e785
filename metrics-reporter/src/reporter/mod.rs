//! Pluggable reporters.
//!
//! A reporter ships batches of samples somewhere off the scheduler. Each
//! reporter owns a piece of state that it receives by value on every call and
//! hands back with the result, so whatever it needs to remember between
//! batches (counters, back-off bookkeeping, open handles) travels through
//! that state and nowhere else.
//!
//! - [`Reporter`]: the typed capability (`init`, `handle`)
//! - [`ActiveReporter`]: an initialized reporter bound to its state, object safe
//! - [`ReporterCatalog`]: resolves configured identifiers to implementations

mod catalog;
mod channel;
mod jsonl;
mod logger;

pub use catalog::ReporterCatalog;
pub use channel::ChannelReporter;
pub use jsonl::{JsonLinesReporter, JsonLinesState};
pub use logger::{LogReporter, LogReporterState};

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::store::Sample;

/// Arguments handed to [`Reporter::init`].
pub type ReporterArgs = serde_json::Value;

/// Error raised when a reporter cannot be initialized.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReporterError {
    #[error("invalid arguments: {0}")]
    InvalidArgs(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("{0}")]
    Other(String),
}

impl ReporterError {
    pub fn invalid_args(msg: impl Into<String>) -> Self {
        Self::InvalidArgs(msg.into())
    }
}

impl From<std::io::Error> for ReporterError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

/// Result of handing one batch to a reporter.
///
/// Both variants carry the reporter's state forward; a failed batch may
/// still have changed it.
#[derive(Debug, Clone, PartialEq)]
pub enum ReportOutcome<S> {
    /// The batch was accepted.
    Delivered(S),
    /// The batch was rejected and should be offered again later.
    Failed { reason: String, state: S },
}

impl<S> ReportOutcome<S> {
    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered(_))
    }

    /// Take the state, discarding the outcome.
    pub fn into_state(self) -> S {
        match self {
            Self::Delivered(state) | Self::Failed { state, .. } => state,
        }
    }
}

/// A pluggable sink for sample batches.
#[async_trait]
pub trait Reporter: Send + Sync + 'static {
    /// State threaded through every [`handle`](Reporter::handle) call.
    type State: Send + 'static;

    /// Prepare the initial state. Called once when the reporter is bound to
    /// a scheduler.
    async fn init(&self, args: &ReporterArgs) -> Result<Self::State, ReporterError>;

    /// Deliver one batch. `samples` may be empty.
    async fn handle(&self, samples: Vec<Sample>, state: Self::State)
    -> ReportOutcome<Self::State>;
}

/// How a reporter is named in configuration: a bare identifier, or an
/// identifier with init arguments (`"log"` or `["jsonl", {"path": "..."}]`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ReporterSpec {
    Bare(String),
    WithArgs(String, ReporterArgs),
}

impl ReporterSpec {
    pub fn new(id: impl Into<String>) -> Self {
        Self::Bare(id.into())
    }

    pub fn with_args(id: impl Into<String>, args: ReporterArgs) -> Self {
        Self::WithArgs(id.into(), args)
    }

    pub fn id(&self) -> &str {
        match self {
            Self::Bare(id) | Self::WithArgs(id, _) => id,
        }
    }

    /// Init arguments; a bare identifier gets an empty object.
    pub fn args(&self) -> ReporterArgs {
        match self {
            Self::Bare(_) => ReporterArgs::Object(serde_json::Map::new()),
            Self::WithArgs(_, args) => args.clone(),
        }
    }
}

/// An initialized reporter together with the state it owns.
#[async_trait]
pub trait ActiveReporter: Send {
    /// Identifier the reporter was resolved from.
    fn id(&self) -> &str;

    /// Deliver a batch, threading the owned state through the reporter.
    /// `Err` carries the reporter's failure reason.
    async fn deliver(&mut self, samples: Vec<Sample>) -> Result<(), String>;
}

/// Binds a [`Reporter`] to its state.
pub struct BoundReporter<R: Reporter> {
    id: String,
    reporter: Arc<R>,
    state: Option<R::State>,
}

impl<R: Reporter> BoundReporter<R> {
    /// Run `init` and bind the resulting state.
    pub async fn start(
        id: impl Into<String>,
        reporter: Arc<R>,
        args: &ReporterArgs,
    ) -> Result<Self, ReporterError> {
        let state = reporter.init(args).await?;
        Ok(Self {
            id: id.into(),
            reporter,
            state: Some(state),
        })
    }

    pub fn state(&self) -> Option<&R::State> {
        self.state.as_ref()
    }
}

#[async_trait]
impl<R: Reporter> ActiveReporter for BoundReporter<R> {
    fn id(&self) -> &str {
        &self.id
    }

    async fn deliver(&mut self, samples: Vec<Sample>) -> Result<(), String> {
        // Only empty if a previous delivery was dropped mid-flight.
        let Some(state) = self.state.take() else {
            return Err(format!("reporter {} lost its state", self.id));
        };

        match self.reporter.handle(samples, state).await {
            ReportOutcome::Delivered(state) => {
                self.state = Some(state);
                Ok(())
            }
            ReportOutcome::Failed { reason, state } => {
                self.state = Some(state);
                Err(reason)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// Counts deliveries and fails every other batch.
    struct Alternating;

    #[async_trait]
    impl Reporter for Alternating {
        type State = u32;

        async fn init(&self, args: &ReporterArgs) -> Result<u32, ReporterError> {
            args.get("start")
                .and_then(|v| v.as_u64())
                .map(|v| v as u32)
                .ok_or_else(|| ReporterError::invalid_args("missing start"))
        }

        async fn handle(&self, _samples: Vec<Sample>, state: u32) -> ReportOutcome<u32> {
            if state % 2 == 0 {
                ReportOutcome::Delivered(state + 1)
            } else {
                ReportOutcome::Failed {
                    reason: "odd".to_string(),
                    state: state + 1,
                }
            }
        }
    }

    #[test]
    fn test_spec_deserialize_bare() {
        let spec: ReporterSpec = serde_json::from_value(json!("log")).unwrap();
        assert_eq!(spec, ReporterSpec::new("log"));
        assert_eq!(spec.id(), "log");
        assert_eq!(spec.args(), json!({}));
    }

    #[test]
    fn test_spec_deserialize_with_args() {
        let spec: ReporterSpec =
            serde_json::from_value(json!(["jsonl", {"path": "/tmp/out.jsonl"}])).unwrap();
        assert_eq!(spec.id(), "jsonl");
        assert_eq!(spec.args(), json!({"path": "/tmp/out.jsonl"}));
    }

    #[test]
    fn test_outcome_into_state() {
        assert_eq!(ReportOutcome::Delivered(3).into_state(), 3);
        let failed = ReportOutcome::Failed {
            reason: "x".to_string(),
            state: 4,
        };
        assert!(!failed.is_delivered());
        assert_eq!(failed.into_state(), 4);
    }

    #[tokio::test]
    async fn test_bound_reporter_threads_state_through_failures() {
        let mut bound = BoundReporter::start("alt", Arc::new(Alternating), &json!({"start": 0}))
            .await
            .unwrap();

        assert_eq!(bound.deliver(Vec::new()).await, Ok(()));
        assert_eq!(bound.state(), Some(&1));

        assert_eq!(bound.deliver(Vec::new()).await, Err("odd".to_string()));
        // A failed batch still updates the state.
        assert_eq!(bound.state(), Some(&2));
        assert_eq!(bound.id(), "alt");
    }

    #[tokio::test]
    async fn test_bound_reporter_init_failure() {
        let result = BoundReporter::start("alt", Arc::new(Alternating), &json!({})).await;
        assert!(matches!(result, Err(ReporterError::InvalidArgs(_))));
    }
}
