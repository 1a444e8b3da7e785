//! Scheduler registry for tracking and managing report schedulers.
//!
//! The `SchedulerRegistry` is the process-wide map from instance name to
//! scheduler:
//! - Starts schedulers and owns their tasks in a `JoinSet`
//! - Routes caller-facing operations by instance name
//! - Shuts every scheduler down with a bounded wait

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::handle::SchedulerHandle;
use super::report_actor::{ActorOutcome, ReportScheduler, SchedulerContext};
use crate::Result;
use crate::config::SchedulerConfig;
use crate::store::Sample;

/// Default time schedulers get to stop before they are aborted.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Result of a scheduler task completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerTaskResult {
    pub instance: String,
    pub outcome: ActorOutcome,
}

/// Registry for tracking and managing report schedulers.
pub struct SchedulerRegistry {
    context: SchedulerContext,
    schedulers: HashMap<String, SchedulerHandle>,
    task_set: JoinSet<SchedulerTaskResult>,
    /// Parent of every scheduler's token.
    cancellation_token: CancellationToken,
    shutdown_timeout: Duration,
}

impl SchedulerRegistry {
    /// Create a new empty registry.
    pub fn new(context: SchedulerContext, cancellation_token: CancellationToken) -> Self {
        Self {
            context,
            schedulers: HashMap::new(),
            task_set: JoinSet::new(),
            cancellation_token,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }

    /// Set how long [`shutdown`](Self::shutdown) waits before aborting tasks.
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Start a scheduler and register it under its instance name.
    ///
    /// # Errors
    ///
    /// Fails with `RegistryError::InstanceExists` if the name is taken, or
    /// with the scheduler's initialization error. Nothing is registered in
    /// either case.
    pub async fn spawn(&mut self, config: &SchedulerConfig) -> Result<SchedulerHandle> {
        if self.schedulers.contains_key(&config.instance) {
            return Err(RegistryError::InstanceExists(config.instance.clone()).into());
        }

        let (scheduler, handle) = ReportScheduler::start(
            config,
            self.context.clone(),
            self.cancellation_token.child_token(),
        )
        .await?;

        let instance = config.instance.clone();
        info!(instance = %instance, "Spawning report scheduler");

        self.schedulers.insert(instance.clone(), handle.clone());
        self.task_set.spawn(async move {
            let outcome = scheduler.run().await;
            SchedulerTaskResult { instance, outcome }
        });

        Ok(handle)
    }

    /// Start every configured scheduler, stopping at the first failure.
    pub async fn spawn_all<'a>(
        &mut self,
        configs: impl IntoIterator<Item = &'a SchedulerConfig>,
    ) -> Result<usize> {
        let mut started = 0;
        for config in configs {
            self.spawn(config).await?;
            started += 1;
        }
        Ok(started)
    }

    /// Get a scheduler handle.
    pub fn get(&self, instance: &str) -> Option<&SchedulerHandle> {
        self.schedulers.get(instance)
    }

    /// Check if a scheduler is registered.
    pub fn contains(&self, instance: &str) -> bool {
        self.schedulers.contains_key(instance)
    }

    /// Get all instance names, sorted.
    pub fn instances(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.schedulers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.schedulers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schedulers.is_empty()
    }

    fn require(&self, instance: &str) -> std::result::Result<&SchedulerHandle, RegistryError> {
        self.schedulers
            .get(instance)
            .ok_or_else(|| RegistryError::InstanceNotFound(instance.to_string()))
    }

    /// Read every undelivered sample of `instance`.
    pub async fn get_latest_metrics(&self, instance: &str) -> Result<Vec<Sample>> {
        self.require(instance)?.get_latest_metrics().await
    }

    /// Ask `instance` for a report cycle.
    pub async fn report_metrics(&self, instance: &str) -> Result<()> {
        self.require(instance)?.report_metrics().await
    }

    /// Remove a scheduler from the registry.
    ///
    /// This cancels the scheduler; its task is collected by `join_next`.
    pub fn remove(&mut self, instance: &str) -> Option<SchedulerHandle> {
        let handle = self.schedulers.remove(instance)?;
        debug!(instance = %instance, "Removing report scheduler");
        handle.cancel();
        Some(handle)
    }

    /// Wait for the next scheduler task to complete.
    ///
    /// Returns `None` if there are no more tasks.
    pub async fn join_next(
        &mut self,
    ) -> Option<std::result::Result<SchedulerTaskResult, tokio::task::JoinError>> {
        let result = self.task_set.join_next().await;
        if let Some(Ok(task)) = &result {
            self.schedulers.remove(&task.instance);
        }
        result
    }

    /// Check if there are any pending tasks.
    pub fn has_pending_tasks(&self) -> bool {
        !self.task_set.is_empty()
    }

    /// Get the number of pending tasks.
    pub fn pending_task_count(&self) -> usize {
        self.task_set.len()
    }

    /// Cancel all schedulers.
    pub fn cancel_all(&self) {
        info!("Cancelling all {} report schedulers", self.schedulers.len());
        self.cancellation_token.cancel();
    }

    /// Abort all scheduler tasks forcefully.
    pub fn abort_all(&mut self) {
        warn!("Forcefully aborting all report scheduler tasks");
        self.task_set.abort_all();
    }

    /// Stop every scheduler.
    ///
    /// Stop messages go out first; schedulers still running when the
    /// shutdown timeout expires are cancelled, then aborted.
    pub async fn shutdown(&mut self) -> ShutdownReport {
        let total = self.task_set.len();
        let mut graceful_stops = 0;
        let mut forced_terminations = 0;
        let mut stop_message_failures = 0;

        info!(schedulers = total, "Shutting down report schedulers");

        for (instance, handle) in &self.schedulers {
            if let Err(e) = handle.stop().await {
                warn!(instance = %instance, error = %e, "Failed to send Stop");
                stop_message_failures += 1;
            }
        }

        let deadline = tokio::time::Instant::now() + self.shutdown_timeout;

        while self.has_pending_tasks() {
            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => {
                    let remaining = self.pending_task_count();
                    warn!(remaining, "Shutdown timeout reached, cancelling schedulers");
                    self.cancel_all();

                    // Brief grace period for cancellation to take effect.
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    while let Some(result) = self.task_set.try_join_next() {
                        if result.is_ok() {
                            graceful_stops += 1;
                        } else {
                            forced_terminations += 1;
                        }
                    }

                    if self.has_pending_tasks() {
                        forced_terminations += self.pending_task_count();
                        self.abort_all();
                        while self.task_set.join_next().await.is_some() {}
                    }
                    break;
                }
                result = self.task_set.join_next() => {
                    match result {
                        Some(Ok(task)) => {
                            debug!(instance = %task.instance, outcome = ?task.outcome, "Scheduler stopped");
                            graceful_stops += 1;
                        }
                        Some(Err(e)) => {
                            warn!(error = %e, "Scheduler task failed during shutdown");
                            forced_terminations += 1;
                        }
                        None => break,
                    }
                }
            }
        }

        self.schedulers.clear();

        let report = ShutdownReport {
            total,
            graceful_stops,
            forced_terminations,
            stop_message_failures,
        };
        info!(
            total = report.total,
            graceful = report.graceful_stops,
            forced = report.forced_terminations,
            stop_failures = report.stop_message_failures,
            "Shutdown complete"
        );
        report
    }
}

impl fmt::Debug for SchedulerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchedulerRegistry")
            .field("instances", &self.instances())
            .field("pending_tasks", &self.task_set.len())
            .finish()
    }
}

/// Summary of a registry shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Number of scheduler tasks at shutdown start.
    pub total: usize,
    pub graceful_stops: usize,
    pub forced_terminations: usize,
    /// Number of Stop messages that failed to send.
    pub stop_message_failures: usize,
}

impl ShutdownReport {
    /// Check if all schedulers stopped gracefully.
    pub fn all_graceful(&self) -> bool {
        self.forced_terminations == 0 && self.stop_message_failures == 0
    }

    /// Get the percentage of schedulers that stopped gracefully.
    pub fn graceful_percentage(&self) -> f64 {
        if self.total == 0 {
            100.0
        } else {
            (self.graceful_stops as f64 / self.total as f64) * 100.0
        }
    }
}

/// Error type for registry operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// A scheduler with the given instance name already exists.
    InstanceExists(String),
    /// No scheduler serves the instance.
    InstanceNotFound(String),
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryError::InstanceExists(id) => write!(f, "Instance already exists: {}", id),
            RegistryError::InstanceNotFound(id) => write!(f, "Instance not found: {}", id),
        }
    }
}

impl std::error::Error for RegistryError {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use crate::reporter::{ReporterCatalog, ReporterSpec};
    use crate::scheduler::clock::ManualClock;
    use crate::store::InMemoryMetricStore;
    use serde_json::json;
    use std::sync::Arc;

    const W: i64 = 1_700_000_000;

    fn registry() -> (SchedulerRegistry, Arc<InMemoryMetricStore>, CancellationToken) {
        let store = Arc::new(InMemoryMetricStore::new());
        let context = SchedulerContext::new(store.clone(), ReporterCatalog::with_builtins())
            .with_clock(Arc::new(ManualClock::new(0, W)));
        let token = CancellationToken::new();
        (SchedulerRegistry::new(context, token.clone()), store, token)
    }

    fn config(instance: &str) -> SchedulerConfig {
        SchedulerConfig {
            instance: instance.to_string(),
            reporter: Some(ReporterSpec::new("log")),
            report_interval_ms: None,
        }
    }

    #[tokio::test]
    async fn test_registry_spawn_and_lookup() {
        let (mut registry, _store, _token) = registry();

        registry.spawn(&config("b")).await.unwrap();
        registry.spawn(&config("a")).await.unwrap();

        assert_eq!(registry.len(), 2);
        assert!(registry.contains("a"));
        assert_eq!(registry.instances(), vec!["a", "b"]);
        assert_eq!(registry.get("a").unwrap().instance(), "a");
        assert_eq!(registry.pending_task_count(), 2);
    }

    #[tokio::test]
    async fn test_registry_rejects_duplicate_instance() {
        let (mut registry, _store, _token) = registry();
        registry.spawn(&config("node")).await.unwrap();

        let result = registry.spawn(&config("node")).await;
        assert!(matches!(
            result,
            Err(Error::Registry(RegistryError::InstanceExists(ref id))) if id == "node"
        ));
        assert_eq!(registry.pending_task_count(), 1);
    }

    #[tokio::test]
    async fn test_registry_init_failure_registers_nothing() {
        let (mut registry, _store, _token) = registry();
        let mut cfg = config("node");
        cfg.reporter = Some(ReporterSpec::with_args("jsonl", json!({})));

        assert!(registry.spawn(&cfg).await.is_err());
        assert!(registry.is_empty());
        assert!(!registry.has_pending_tasks());
    }

    #[tokio::test]
    async fn test_registry_routes_by_instance() {
        let (mut registry, store, _token) = registry();
        registry.spawn(&config("a")).await.unwrap();
        registry.spawn(&config("b")).await.unwrap();
        store.record_at("a", W, json!({"cpu": 0.5}));

        let a = registry.get_latest_metrics("a").await.unwrap();
        let b = registry.get_latest_metrics("b").await.unwrap();
        assert_eq!(a.len(), 1);
        assert!(b.is_empty());

        registry.report_metrics("b").await.unwrap();

        let missing = registry.get_latest_metrics("c").await;
        assert!(matches!(
            missing,
            Err(Error::Registry(RegistryError::InstanceNotFound(_)))
        ));
    }

    #[tokio::test]
    async fn test_registry_remove_cancels_scheduler() {
        let (mut registry, _store, _token) = registry();
        registry.spawn(&config("node")).await.unwrap();

        let handle = registry.remove("node").unwrap();
        assert!(handle.is_cancelled());
        assert!(!registry.contains("node"));

        let task = registry.join_next().await.unwrap().unwrap();
        assert_eq!(task.instance, "node");
        assert_eq!(task.outcome, ActorOutcome::Cancelled);
        assert!(registry.remove("node").is_none());
    }

    #[tokio::test]
    async fn test_registry_parent_cancellation_reaches_schedulers() {
        let (mut registry, _store, token) = registry();
        let handle = registry.spawn(&config("node")).await.unwrap();

        token.cancel();

        assert!(handle.is_cancelled());
        let task = registry.join_next().await.unwrap().unwrap();
        assert_eq!(task.outcome, ActorOutcome::Cancelled);
    }

    #[tokio::test]
    async fn test_registry_shutdown_is_graceful() {
        let (mut registry, _store, _token) = registry();
        registry.spawn(&config("a")).await.unwrap();
        registry.spawn(&config("b")).await.unwrap();

        let report = registry.shutdown().await;

        assert_eq!(report.total, 2);
        assert_eq!(report.graceful_stops, 2);
        assert!(report.all_graceful());
        assert!(registry.is_empty());
        assert!(!registry.has_pending_tasks());
    }

    #[tokio::test]
    async fn test_registry_shutdown_empty() {
        let (mut registry, _store, _token) = registry();
        let report = registry.shutdown().await;
        assert_eq!(report.total, 0);
        assert_eq!(report.graceful_percentage(), 100.0);
    }

    #[test]
    fn test_shutdown_report_with_forced() {
        let report = ShutdownReport {
            total: 4,
            graceful_stops: 3,
            forced_terminations: 1,
            stop_message_failures: 0,
        };
        assert!(!report.all_graceful());
        assert_eq!(report.graceful_percentage(), 75.0);
    }

    #[test]
    fn test_registry_error_display() {
        assert_eq!(
            RegistryError::InstanceExists("x".to_string()).to_string(),
            "Instance already exists: x"
        );
        assert_eq!(
            RegistryError::InstanceNotFound("y".to_string()).to_string(),
            "Instance not found: y"
        );
    }
}
