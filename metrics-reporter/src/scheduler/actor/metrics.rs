//! Scheduler metrics for observability.
//!
//! Counts report cycles by outcome, delivered samples, timer arms and
//! message processing latency for a single scheduler instance.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::RwLock;

/// Number of recent latency samples kept per scheduler.
const LATENCY_WINDOW: usize = 64;

/// Metrics shared between a scheduler and its handles.
pub type SharedCycleMetrics = Arc<CycleMetrics>;

/// Metrics for a single scheduler instance.
#[derive(Debug)]
pub struct CycleMetrics {
    instance: String,
    messages_processed: AtomicU64,
    cycles_delivered: AtomicU64,
    cycles_failed: AtomicU64,
    cycles_skipped: AtomicU64,
    store_errors: AtomicU64,
    samples_delivered: AtomicU64,
    timers_armed: AtomicU64,
    cycle_latency: RwLock<LatencySamples>,
    spawned_at: Instant,
}

/// Recent latency samples for calculating statistics.
#[derive(Debug)]
struct LatencySamples {
    /// Ring buffer of recent latency samples (in microseconds).
    samples: Vec<u64>,
    position: usize,
    count: u64,
    last: Option<u64>,
    max: u64,
}

impl LatencySamples {
    fn new(capacity: usize) -> Self {
        Self {
            samples: vec![0; capacity],
            position: 0,
            count: 0,
            last: None,
            max: 0,
        }
    }

    fn record(&mut self, latency_us: u64) {
        self.samples[self.position] = latency_us;
        self.position = (self.position + 1) % self.samples.len();

        self.count += 1;
        self.last = Some(latency_us);
        self.max = self.max.max(latency_us);
    }

    fn recent_average(&self) -> f64 {
        let filled = self.count.min(self.samples.len() as u64) as usize;
        if filled == 0 {
            return 0.0;
        }

        let sum: u64 = self.samples[..filled].iter().sum();
        sum as f64 / filled as f64
    }
}

impl CycleMetrics {
    pub fn new(instance: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
            messages_processed: AtomicU64::new(0),
            cycles_delivered: AtomicU64::new(0),
            cycles_failed: AtomicU64::new(0),
            cycles_skipped: AtomicU64::new(0),
            store_errors: AtomicU64::new(0),
            samples_delivered: AtomicU64::new(0),
            timers_armed: AtomicU64::new(0),
            cycle_latency: RwLock::new(LatencySamples::new(LATENCY_WINDOW)),
            spawned_at: Instant::now(),
        }
    }

    pub fn instance(&self) -> &str {
        &self.instance
    }

    pub fn record_message(&self) {
        self.messages_processed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a cycle whose batch the reporter accepted.
    pub fn record_delivered(&self, samples: usize, latency: Duration) {
        self.cycles_delivered.fetch_add(1, Ordering::Relaxed);
        self.samples_delivered
            .fetch_add(samples as u64, Ordering::Relaxed);
        self.record_latency(latency);
    }

    /// Record a cycle whose batch the reporter rejected.
    pub fn record_failed(&self, latency: Duration) {
        self.cycles_failed.fetch_add(1, Ordering::Relaxed);
        self.record_latency(latency);
    }

    /// Record a cycle skipped for lack of a reporter.
    pub fn record_skipped(&self) {
        self.cycles_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_store_error(&self) {
        self.store_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_timer_armed(&self) {
        self.timers_armed.fetch_add(1, Ordering::Relaxed);
    }

    fn record_latency(&self, latency: Duration) {
        self.cycle_latency
            .write()
            .record(latency.as_micros() as u64);
    }

    pub fn cycles_delivered(&self) -> u64 {
        self.cycles_delivered.load(Ordering::Relaxed)
    }

    pub fn cycles_failed(&self) -> u64 {
        self.cycles_failed.load(Ordering::Relaxed)
    }

    pub fn timers_armed(&self) -> u64 {
        self.timers_armed.load(Ordering::Relaxed)
    }

    pub fn uptime(&self) -> Duration {
        self.spawned_at.elapsed()
    }

    /// Get a snapshot of all metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let latency = self.cycle_latency.read();
        MetricsSnapshot {
            instance: self.instance.clone(),
            messages_processed: self.messages_processed.load(Ordering::Relaxed),
            cycles_delivered: self.cycles_delivered.load(Ordering::Relaxed),
            cycles_failed: self.cycles_failed.load(Ordering::Relaxed),
            cycles_skipped: self.cycles_skipped.load(Ordering::Relaxed),
            store_errors: self.store_errors.load(Ordering::Relaxed),
            samples_delivered: self.samples_delivered.load(Ordering::Relaxed),
            timers_armed: self.timers_armed.load(Ordering::Relaxed),
            last_cycle_latency_us: latency.last,
            max_cycle_latency_us: latency.max,
            recent_avg_cycle_latency_us: latency.recent_average(),
            uptime_secs: self.uptime().as_secs(),
        }
    }
}

/// Point-in-time copy of [`CycleMetrics`].
#[derive(Debug, Clone, PartialEq)]
pub struct MetricsSnapshot {
    pub instance: String,
    pub messages_processed: u64,
    pub cycles_delivered: u64,
    pub cycles_failed: u64,
    pub cycles_skipped: u64,
    pub store_errors: u64,
    pub samples_delivered: u64,
    pub timers_armed: u64,
    pub last_cycle_latency_us: Option<u64>,
    pub max_cycle_latency_us: u64,
    pub recent_avg_cycle_latency_us: f64,
    pub uptime_secs: u64,
}

impl MetricsSnapshot {
    /// Total report cycles, including skipped ones.
    pub fn total_cycles(&self) -> u64 {
        self.cycles_delivered + self.cycles_failed + self.cycles_skipped + self.store_errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_counters() {
        let metrics = CycleMetrics::new("node");
        metrics.record_delivered(10, Duration::from_micros(200));
        metrics.record_delivered(5, Duration::from_micros(400));
        metrics.record_failed(Duration::from_micros(300));
        metrics.record_skipped();
        metrics.record_store_error();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.instance, "node");
        assert_eq!(snapshot.cycles_delivered, 2);
        assert_eq!(snapshot.cycles_failed, 1);
        assert_eq!(snapshot.cycles_skipped, 1);
        assert_eq!(snapshot.store_errors, 1);
        assert_eq!(snapshot.samples_delivered, 15);
        assert_eq!(snapshot.total_cycles(), 5);
        assert_eq!(snapshot.last_cycle_latency_us, Some(300));
        assert_eq!(snapshot.max_cycle_latency_us, 400);
        assert!((snapshot.recent_avg_cycle_latency_us - 300.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_latency_ring_buffer_wraps() {
        let mut samples = LatencySamples::new(2);
        samples.record(100);
        samples.record(200);
        samples.record(600);

        assert_eq!(samples.count, 3);
        assert_eq!(samples.last, Some(600));
        assert!((samples.recent_average() - 400.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_empty_metrics() {
        let snapshot = CycleMetrics::new("idle").snapshot();
        assert_eq!(snapshot.total_cycles(), 0);
        assert_eq!(snapshot.last_cycle_latency_us, None);
        assert_eq!(snapshot.recent_avg_cycle_latency_us, 0.0);
    }
}
