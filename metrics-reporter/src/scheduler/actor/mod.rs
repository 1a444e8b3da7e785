//! Actor-based report scheduling.
//!
//! # Architecture
//!
//! - `ReportScheduler`: self-scheduling actor owning one instance's cursor
//! - `SchedulerHandle`: type-safe handle for sending messages to a scheduler
//! - `CycleMetrics`: per-scheduler counters
//! - `SchedulerRegistry`: instance name to scheduler, with task management

mod handle;
mod messages;
mod metrics;
mod registry;
mod report_actor;

pub use handle::{DEFAULT_MAILBOX_CAPACITY, DEFAULT_SEND_TIMEOUT, SchedulerHandle, SendError};
pub use messages::{
    CycleOutcome, SchedulerMessage, SchedulerPhase, SchedulerSnapshot, TimerSnapshot, Trigger,
};
pub use metrics::{CycleMetrics, MetricsSnapshot, SharedCycleMetrics};
pub use registry::{
    DEFAULT_SHUTDOWN_TIMEOUT, RegistryError, SchedulerRegistry, SchedulerTaskResult,
    ShutdownReport,
};
pub use report_actor::{ActorOutcome, ReportScheduler, SchedulerContext};
