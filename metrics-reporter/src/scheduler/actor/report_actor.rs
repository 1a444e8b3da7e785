//! ReportScheduler implementation.
//!
//! The ReportScheduler is a self-managing actor that owns the report cursor
//! for one metric-store instance. Every request, and the report timer
//! itself, is handled inside a single `select!` loop, so report cycles never
//! overlap and the cursor is only ever read and advanced by one task.
//!
//! # Responsibilities
//!
//! - Self-scheduling: arms a one-shot report timer after every cycle when an
//!   interval is configured
//! - Message handling: GetLatestMetrics, ReportMetrics, SetReporter,
//!   SetReportInterval, GetState, Stop
//! - Delivery tracking: advances the cursor only past windows the reporter
//!   accepted

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::handle::{DEFAULT_MAILBOX_CAPACITY, SchedulerHandle};
use super::messages::{
    CycleOutcome, SchedulerMessage, SchedulerPhase, SchedulerSnapshot, TimerSnapshot, Trigger,
};
use super::metrics::{CycleMetrics, SharedCycleMetrics};
use crate::Result;
use crate::config::SchedulerConfig;
use crate::reporter::{ActiveReporter, ReporterCatalog, ReporterSpec};
use crate::scheduler::clock::{Clock, SystemClock};
use crate::scheduler::window::{ReportCursor, Window};
use crate::store::{MetricStore, Sample, StoreError};

/// Outcome of a scheduler's run loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActorOutcome {
    /// Scheduler stopped gracefully (Stop message or all handles dropped).
    Stopped,
    /// Scheduler was cancelled.
    Cancelled,
}

/// Collaborators shared by every scheduler in a process.
#[derive(Clone)]
pub struct SchedulerContext {
    pub store: Arc<dyn MetricStore>,
    pub clock: Arc<dyn Clock>,
    pub catalog: Arc<ReporterCatalog>,
}

impl SchedulerContext {
    /// Context using the system clock.
    pub fn new(store: Arc<dyn MetricStore>, catalog: ReporterCatalog) -> Self {
        Self {
            store,
            clock: Arc::new(SystemClock::new()),
            catalog: Arc::new(catalog),
        }
    }

    /// Replace the clock.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

/// The report timer currently armed.
#[derive(Debug, Clone, Copy)]
struct ArmedTimer {
    generation: u64,
    period: Duration,
    deadline: tokio::time::Instant,
}

/// Periodic reporting scheduler for a single metric-store instance.
pub struct ReportScheduler {
    /// Instance name; also the store namespace queried.
    instance: String,
    mailbox: mpsc::Receiver<SchedulerMessage>,
    store: Arc<dyn MetricStore>,
    clock: Arc<dyn Clock>,
    catalog: Arc<ReporterCatalog>,
    /// Active reporter, bound to its own state.
    reporter: Option<Box<dyn ActiveReporter>>,
    report_interval_ms: Option<u64>,
    cursor: ReportCursor,
    timer: Option<ArmedTimer>,
    /// Number of times a timer has been armed.
    timer_generation: u64,
    phase: SchedulerPhase,
    cancellation_token: CancellationToken,
    metrics: SharedCycleMetrics,
}

impl ReportScheduler {
    /// Create a scheduler from its configuration.
    ///
    /// Runs the configured reporter's `init` and arms the first report timer
    /// when both a reporter and an interval are configured.
    ///
    /// # Errors
    ///
    /// Fails if the configuration is invalid, the reporter is unknown, or the
    /// reporter's `init` fails. No scheduler is created in that case.
    pub async fn start(
        config: &SchedulerConfig,
        context: SchedulerContext,
        cancellation_token: CancellationToken,
    ) -> Result<(Self, SchedulerHandle)> {
        config.validate()?;

        let reporter = match &config.reporter {
            Some(spec) => Some(context.catalog.start(spec).await?),
            None => None,
        };

        let (tx, rx) = mpsc::channel(DEFAULT_MAILBOX_CAPACITY);
        let metrics = Arc::new(CycleMetrics::new(&config.instance));
        let handle = SchedulerHandle::new(
            &config.instance,
            tx,
            cancellation_token.clone(),
            metrics.clone(),
        );

        let start_time = context.clock.monotonic_secs();

        let mut scheduler = Self {
            instance: config.instance.clone(),
            mailbox: rx,
            store: context.store,
            clock: context.clock,
            catalog: context.catalog,
            reporter,
            report_interval_ms: config.report_interval_ms,
            cursor: ReportCursor::new(start_time),
            timer: None,
            timer_generation: 0,
            phase: SchedulerPhase::Idle,
            cancellation_token,
            metrics,
        };
        scheduler.reschedule();

        debug!(
            instance = %scheduler.instance,
            reporter = ?scheduler.reporter_id(),
            interval_ms = ?scheduler.report_interval_ms,
            start_time,
            "ReportScheduler created"
        );

        Ok((scheduler, handle))
    }

    /// Get the instance name.
    pub fn instance(&self) -> &str {
        &self.instance
    }

    /// Identifier of the active reporter.
    pub fn reporter_id(&self) -> Option<&str> {
        self.reporter.as_deref().map(|r| r.id())
    }

    /// Run the scheduler's event loop.
    ///
    /// Runs until a Stop message arrives, every handle is dropped, or the
    /// cancellation token is triggered. The report timer dies with the loop.
    pub async fn run(mut self) -> ActorOutcome {
        info!(instance = %self.instance, "ReportScheduler starting");

        loop {
            // Rebuilt every iteration, so a superseded timer can never fire.
            let deadline = self.timer.map(|t| t.deadline);

            tokio::select! {
                // Timer first: an expired deadline is served before queued requests.
                biased;

                _ = Self::timer_expired(deadline) => {
                    if let Some(timer) = self.timer.take() {
                        debug!(
                            instance = %self.instance,
                            generation = timer.generation,
                            "Report timer fired"
                        );
                        self.report_cycle(Trigger::Timer).await;
                    }
                }

                msg = self.mailbox.recv() => {
                    let Some(msg) = msg else {
                        debug!(instance = %self.instance, "All handles dropped");
                        break;
                    };

                    self.metrics.record_message();
                    if self.handle_message(msg).await {
                        debug!(instance = %self.instance, "ReportScheduler received stop signal");
                        break;
                    }
                }

                _ = self.cancellation_token.cancelled() => {
                    info!(instance = %self.instance, "ReportScheduler cancelled");
                    self.disarm_timer();
                    return ActorOutcome::Cancelled;
                }
            }
        }

        self.disarm_timer();
        info!(instance = %self.instance, "ReportScheduler stopped gracefully");
        ActorOutcome::Stopped
    }

    /// Completes at `deadline`, or never if no timer is armed.
    async fn timer_expired(deadline: Option<tokio::time::Instant>) {
        match deadline {
            Some(deadline) => tokio::time::sleep_until(deadline).await,
            None => std::future::pending().await,
        }
    }

    /// Handle an incoming message.
    ///
    /// Returns `true` if the scheduler should stop.
    async fn handle_message(&mut self, msg: SchedulerMessage) -> bool {
        match msg {
            SchedulerMessage::GetLatestMetrics(reply) => {
                let result = self.get_latest_metrics().await;
                // Ignore if the caller went away.
                let _ = reply.send(result);
                false
            }
            SchedulerMessage::ReportMetrics => {
                self.report_cycle(Trigger::Manual).await;
                false
            }
            SchedulerMessage::SetReporter { spec, reply } => {
                let result = self.set_reporter(spec).await;
                let _ = reply.send(result);
                false
            }
            SchedulerMessage::SetReportInterval(interval_ms) => {
                self.set_report_interval(interval_ms);
                false
            }
            SchedulerMessage::GetState(reply) => {
                let _ = reply.send(self.snapshot());
                false
            }
            SchedulerMessage::Stop => {
                info!(instance = %self.instance, "ReportScheduler received Stop");
                true
            }
        }
    }

    /// Read everything since the cursor and advance it, without involving the
    /// reporter or the timer.
    async fn get_latest_metrics(&mut self) -> std::result::Result<Vec<Sample>, StoreError> {
        let window = self.current_window();
        let store = Arc::clone(&self.store);
        let instance = self.instance.clone();

        let samples = match Self::fetch(store, instance, window).await {
            Ok(samples) => samples,
            Err(e) => {
                self.cursor.hold(&window);
                self.refresh_phase();
                return Err(e);
            }
        };
        self.cursor.advance(&window);
        self.refresh_phase();

        debug!(
            instance = %self.instance,
            %window,
            samples = samples.len(),
            "Latest metrics read"
        );
        Ok(samples)
    }

    /// Run one report cycle: window, query, deliver, advance, re-arm.
    async fn report_cycle(&mut self, trigger: Trigger) -> CycleOutcome {
        let Some(mut reporter) = self.reporter.take() else {
            warn!(instance = %self.instance, %trigger, "No reporter configured, skipping report");
            self.metrics.record_skipped();
            return CycleOutcome::Skipped;
        };

        self.phase = SchedulerPhase::Reporting;
        let window = self.current_window();
        let started = Instant::now();
        let store = Arc::clone(&self.store);
        let instance = self.instance.clone();

        let outcome = match Self::fetch(store, instance, window).await {
            Ok(samples) => {
                let count = samples.len();
                match reporter.deliver(samples).await {
                    Ok(()) => {
                        self.cursor.advance(&window);
                        self.metrics.record_delivered(count, started.elapsed());
                        debug!(
                            instance = %self.instance,
                            reporter = reporter.id(),
                            %trigger,
                            %window,
                            samples = count,
                            "Metrics reported"
                        );
                        CycleOutcome::Delivered {
                            window,
                            samples: count,
                        }
                    }
                    Err(reason) => {
                        self.cursor.hold(&window);
                        self.metrics.record_failed(started.elapsed());
                        warn!(
                            instance = %self.instance,
                            reporter = reporter.id(),
                            %trigger,
                            %window,
                            reason = %reason,
                            "Reporter failed, window will be retried"
                        );
                        CycleOutcome::Failed { window, reason }
                    }
                }
            }
            Err(error) => {
                self.cursor.hold(&window);
                self.metrics.record_store_error();
                warn!(
                    instance = %self.instance,
                    %trigger,
                    %window,
                    error = %error,
                    "Metric store query failed, report deferred"
                );
                CycleOutcome::StoreFailed { window, error }
            }
        };

        self.reporter = Some(reporter);
        self.refresh_phase();
        if let Some(interval_ms) = self.report_interval_ms {
            self.arm_timer(interval_ms);
        }

        outcome
    }

    /// Query the store for `window`.
    ///
    /// Takes owned handles: the scheduler is `Send` but not `Sync`, so no
    /// borrow of it may be held across the query.
    async fn fetch(
        store: Arc<dyn MetricStore>,
        instance: String,
        window: Window,
    ) -> std::result::Result<Vec<Sample>, StoreError> {
        if window.is_empty() {
            debug!(instance = %instance, %window, "Empty window, skipping query");
            return Ok(Vec::new());
        }
        store.query(&instance, window.from, window.to).await
    }

    fn current_window(&self) -> Window {
        self.cursor
            .window(self.report_interval_ms, self.clock.as_ref())
    }

    /// Replace the reporter. On init failure the current reporter is kept.
    async fn set_reporter(&mut self, spec: Option<ReporterSpec>) -> Result<()> {
        let reporter = match spec {
            Some(spec) => Some(self.catalog.start(&spec).await?),
            None => None,
        };

        let previous = std::mem::replace(&mut self.reporter, reporter);
        info!(
            instance = %self.instance,
            previous = ?previous.as_deref().map(|r| r.id()),
            current = ?self.reporter_id(),
            "Reporter replaced"
        );

        self.reschedule();
        Ok(())
    }

    fn set_report_interval(&mut self, interval_ms: Option<u64>) {
        let interval_ms = interval_ms.filter(|ms| *ms > 0);
        if interval_ms != self.report_interval_ms {
            info!(
                instance = %self.instance,
                previous = ?self.report_interval_ms,
                current = ?interval_ms,
                "Report interval changed"
            );
        }
        self.report_interval_ms = interval_ms;
        self.reschedule();
    }

    /// Arm a fresh timer if there is both a cadence and a reporter,
    /// otherwise make sure none is armed.
    fn reschedule(&mut self) {
        match (self.report_interval_ms, self.reporter.is_some()) {
            (Some(interval_ms), true) => self.arm_timer(interval_ms),
            _ => self.disarm_timer(),
        }
    }

    /// Cancel any armed timer, then arm a new one `interval_ms` from now.
    fn arm_timer(&mut self, interval_ms: u64) {
        self.disarm_timer();

        self.timer_generation += 1;
        let period = Duration::from_millis(interval_ms);
        self.timer = Some(ArmedTimer {
            generation: self.timer_generation,
            period,
            deadline: tokio::time::Instant::now() + period,
        });
        self.metrics.record_timer_armed();

        debug!(
            instance = %self.instance,
            generation = self.timer_generation,
            interval_ms,
            "Report timer armed"
        );
    }

    fn disarm_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            debug!(
                instance = %self.instance,
                generation = timer.generation,
                "Report timer disarmed"
            );
        }
    }

    fn refresh_phase(&mut self) {
        self.phase = if self.cursor.next_query_from().is_some() {
            SchedulerPhase::IdleWithCursor
        } else {
            SchedulerPhase::Idle
        };
    }

    fn snapshot(&self) -> SchedulerSnapshot {
        SchedulerSnapshot {
            instance: self.instance.clone(),
            reporter: self.reporter_id().map(str::to_string),
            report_interval_ms: self.report_interval_ms,
            next_query_from: self.cursor.next_query_from(),
            start_time: self.cursor.start_time(),
            phase: self.phase,
            timer: self.timer.map(|t| TimerSnapshot {
                generation: t.generation,
                period_ms: t.period.as_millis() as u64,
            }),
            metrics: self.metrics.snapshot(),
        }
    }
}
