//! Scheduler handle for type-safe message passing with backpressure support.
//!
//! The `SchedulerHandle` is the only way to talk to a running
//! `ReportScheduler`. It provides:
//! - Backpressure awareness (try_send with timeout fallback)
//! - Typed request/reply wrappers for every scheduler operation
//! - Mailbox capacity monitoring

use std::fmt;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use super::messages::{SchedulerMessage, SchedulerSnapshot};
use super::metrics::{MetricsSnapshot, SharedCycleMetrics};
use crate::reporter::ReporterSpec;
use crate::store::Sample;
use crate::{Error, Result};

/// Default mailbox capacity for schedulers.
pub const DEFAULT_MAILBOX_CAPACITY: usize = 64;

/// Default timeout for send operations when mailbox is full.
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_millis(100);

/// Error type for send operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendError {
    /// The scheduler has stopped and is no longer accepting messages.
    ActorStopped,
    /// The mailbox is full.
    MailboxFull,
    /// The send operation timed out.
    Timeout,
}

impl fmt::Display for SendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SendError::ActorStopped => write!(f, "Scheduler has stopped"),
            SendError::MailboxFull => write!(f, "Mailbox is full"),
            SendError::Timeout => write!(f, "Send operation timed out"),
        }
    }
}

impl std::error::Error for SendError {}

/// A handle to a running report scheduler.
pub struct SchedulerHandle {
    instance: String,
    sender: mpsc::Sender<SchedulerMessage>,
    cancellation_token: CancellationToken,
    metrics: SharedCycleMetrics,
    max_capacity: usize,
}

impl SchedulerHandle {
    /// Create a new scheduler handle.
    pub fn new(
        instance: impl Into<String>,
        sender: mpsc::Sender<SchedulerMessage>,
        cancellation_token: CancellationToken,
        metrics: SharedCycleMetrics,
    ) -> Self {
        let max_capacity = sender.max_capacity();
        Self {
            instance: instance.into(),
            sender,
            cancellation_token,
            metrics,
            max_capacity,
        }
    }

    /// Send a message with backpressure awareness.
    ///
    /// This method first attempts a non-blocking send. If the mailbox is full,
    /// it falls back to a blocking send with a timeout.
    ///
    /// # Errors
    ///
    /// Returns `SendError::ActorStopped` if the scheduler has stopped.
    /// Returns `SendError::Timeout` if the send times out.
    pub async fn send(&self, msg: SchedulerMessage) -> std::result::Result<(), SendError> {
        self.send_with_timeout(msg, DEFAULT_SEND_TIMEOUT).await
    }

    /// Send a message with a custom timeout.
    pub async fn send_with_timeout(
        &self,
        msg: SchedulerMessage,
        timeout: Duration,
    ) -> std::result::Result<(), SendError> {
        // Fast path: try non-blocking send first
        match self.sender.try_send(msg) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(msg)) => {
                // Slow path: wait for permit with timeout
                match tokio::time::timeout(timeout, self.sender.reserve()).await {
                    Ok(Ok(permit)) => {
                        permit.send(msg);
                        Ok(())
                    }
                    Ok(Err(_)) => Err(SendError::ActorStopped),
                    Err(_) => Err(SendError::Timeout),
                }
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(SendError::ActorStopped),
        }
    }

    /// Try to send a message without blocking.
    pub fn try_send(&self, msg: SchedulerMessage) -> std::result::Result<(), SendError> {
        match self.sender.try_send(msg) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => Err(SendError::MailboxFull),
            Err(mpsc::error::TrySendError::Closed(_)) => Err(SendError::ActorStopped),
        }
    }

    /// Read every sample not yet delivered and advance the cursor past them.
    ///
    /// The reporter is not involved and the report timer is untouched.
    pub async fn get_latest_metrics(&self) -> Result<Vec<Sample>> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(SchedulerMessage::GetLatestMetrics(reply_tx))
            .await?;
        let samples = reply_rx.await.map_err(|_| SendError::ActorStopped)??;
        Ok(samples)
    }

    /// Ask for a report cycle. Returns once the request is queued; the cycle
    /// itself runs asynchronously.
    pub async fn report_metrics(&self) -> Result<()> {
        self.send(SchedulerMessage::ReportMetrics).await?;
        Ok(())
    }

    /// Replace the active reporter.
    ///
    /// The new reporter is initialized inside the scheduler. If that fails the
    /// previous reporter stays active and the error is returned.
    pub async fn set_reporter(&self, spec: Option<ReporterSpec>) -> Result<()> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(SchedulerMessage::SetReporter {
            spec,
            reply: reply_tx,
        })
        .await?;
        reply_rx.await.map_err(|_| SendError::ActorStopped)?
    }

    /// Change the report interval. `None` switches to manual-only reporting.
    pub async fn set_report_interval(&self, interval_ms: Option<u64>) -> Result<()> {
        if interval_ms == Some(0) {
            return Err(Error::validation("report interval must be positive"));
        }
        self.send(SchedulerMessage::SetReportInterval(interval_ms))
            .await?;
        Ok(())
    }

    /// Query the scheduler's current state.
    pub async fn state(&self) -> Result<SchedulerSnapshot> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(SchedulerMessage::GetState(reply_tx)).await?;
        Ok(reply_rx.await.map_err(|_| SendError::ActorStopped)?)
    }

    /// Request graceful shutdown.
    pub async fn stop(&self) -> Result<()> {
        self.send(SchedulerMessage::Stop).await?;
        Ok(())
    }

    /// Current metrics, read without going through the mailbox.
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Get the current and maximum mailbox capacity.
    ///
    /// Returns `(current_available, max_capacity)`.
    pub fn mailbox_capacity(&self) -> (usize, usize) {
        (self.sender.capacity(), self.max_capacity)
    }

    /// Check if the mailbox is full.
    pub fn is_mailbox_full(&self) -> bool {
        self.sender.capacity() == 0
    }

    /// Cancel this scheduler.
    pub fn cancel(&self) {
        self.cancellation_token.cancel();
    }

    /// Check if this scheduler has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancellation_token.is_cancelled()
    }

    /// Check if the scheduler task has exited.
    pub fn is_stopped(&self) -> bool {
        self.sender.is_closed()
    }

    /// Get the scheduler's instance name.
    pub fn instance(&self) -> &str {
        &self.instance
    }
}

impl Clone for SchedulerHandle {
    fn clone(&self) -> Self {
        Self {
            instance: self.instance.clone(),
            sender: self.sender.clone(),
            cancellation_token: self.cancellation_token.clone(),
            metrics: self.metrics.clone(),
            max_capacity: self.max_capacity,
        }
    }
}

impl fmt::Debug for SchedulerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchedulerHandle")
            .field("instance", &self.instance)
            .field("capacity", &self.mailbox_capacity())
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
