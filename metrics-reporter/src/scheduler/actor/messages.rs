//! Message types for the report scheduler actor.
//!
//! - `SchedulerMessage`: requests handled by a `ReportScheduler`
//! - `SchedulerSnapshot`: point-in-time view of a scheduler's state
//! - `CycleOutcome`: what a single report cycle did

use std::fmt;

use tokio::sync::oneshot;

use super::metrics::MetricsSnapshot;
use crate::reporter::ReporterSpec;
use crate::scheduler::window::Window;
use crate::store::{Sample, StoreError, Timestamp};

/// Messages that can be sent to a ReportScheduler.
#[derive(Debug)]
pub enum SchedulerMessage {
    /// Read everything not yet delivered and advance the cursor, bypassing
    /// the reporter.
    GetLatestMetrics(oneshot::Sender<Result<Vec<Sample>, StoreError>>),
    /// Run a report cycle now.
    ReportMetrics,
    /// Swap the active reporter (`None` removes it).
    SetReporter {
        spec: Option<ReporterSpec>,
        reply: oneshot::Sender<crate::Result<()>>,
    },
    /// Change the report cadence (`None` switches to manual-only).
    SetReportInterval(Option<u64>),
    /// Query current state (response sent via oneshot channel).
    GetState(oneshot::Sender<SchedulerSnapshot>),
    /// Request graceful shutdown.
    Stop,
}

/// What started a report cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// The report timer expired.
    Timer,
    /// A caller asked for a report.
    Manual,
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trigger::Timer => write!(f, "timer"),
            Trigger::Manual => write!(f, "manual"),
        }
    }
}

/// Result of a single report cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// No reporter is configured; nothing was queried.
    Skipped,
    /// The reporter accepted the batch and the cursor moved past `window`.
    Delivered { window: Window, samples: usize },
    /// The reporter rejected the batch; `window` will be offered again.
    Failed { window: Window, reason: String },
    /// The store query failed; the cycle was abandoned.
    StoreFailed { window: Window, error: StoreError },
}

impl CycleOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered { .. })
    }

    /// The window this cycle worked on, if it got that far.
    pub fn window(&self) -> Option<Window> {
        match self {
            Self::Skipped => None,
            Self::Delivered { window, .. }
            | Self::Failed { window, .. }
            | Self::StoreFailed { window, .. } => Some(*window),
        }
    }
}

/// Lifecycle phase of a scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerPhase {
    /// Nothing delivered yet.
    Idle,
    /// A cycle is running.
    Reporting,
    /// The cursor is set: a window was delivered, or an undelivered one is
    /// pinned for retry.
    IdleWithCursor,
}

/// The currently armed report timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerSnapshot {
    /// Arm count at the time this timer was armed; strictly increasing.
    pub generation: u64,
    /// Delay the timer was armed with.
    pub period_ms: u64,
}

/// State of a ReportScheduler for monitoring.
#[derive(Debug, Clone)]
pub struct SchedulerSnapshot {
    pub instance: String,
    /// Identifier of the active reporter.
    pub reporter: Option<String>,
    pub report_interval_ms: Option<u64>,
    /// First unreported timestamp.
    pub next_query_from: Option<Timestamp>,
    /// Monotonic seconds at scheduler creation.
    pub start_time: i64,
    pub phase: SchedulerPhase,
    pub timer: Option<TimerSnapshot>,
    pub metrics: MetricsSnapshot,
}

impl SchedulerSnapshot {
    pub fn has_reporter(&self) -> bool {
        self.reporter.is_some()
    }

    pub fn is_timer_armed(&self) -> bool {
        self.timer.is_some()
    }
}
