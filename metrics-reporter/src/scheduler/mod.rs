//! Periodic report scheduling.
//!
//! A scheduler reads a metric-store instance in consecutive, non-overlapping
//! windows and hands each window's samples to a reporter, either on a timer
//! or on demand.

pub mod actor;
pub mod clock;
pub mod window;

pub use actor::{
    ActorOutcome, CycleOutcome, MetricsSnapshot, RegistryError, ReportScheduler,
    SchedulerContext, SchedulerHandle, SchedulerPhase, SchedulerRegistry, SchedulerSnapshot,
    SendError, ShutdownReport,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use window::{ReportCursor, Window, compute_window};
