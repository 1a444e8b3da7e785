//! End-to-end tests driving schedulers through the registry.

use std::sync::Arc;

use serde_json::json;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use metrics_reporter::config::SchedulerConfig;
use metrics_reporter::reporter::{ChannelReporter, ReporterCatalog, ReporterSpec};
use metrics_reporter::scheduler::{
    ManualClock, SchedulerContext, SchedulerPhase, SchedulerRegistry,
};
use metrics_reporter::store::{InMemoryMetricStore, Sample, Timestamp};

const W: Timestamp = 1_700_000_000;

struct Harness {
    registry: SchedulerRegistry,
    store: Arc<InMemoryMetricStore>,
    clock: Arc<ManualClock>,
    batches: mpsc::Receiver<Vec<Sample>>,
}

fn harness(monotonic: i64) -> Harness {
    let store = Arc::new(InMemoryMetricStore::new());
    let clock = Arc::new(ManualClock::new(monotonic, W));

    let (channel, batches) = ChannelReporter::new(16);
    let mut catalog = ReporterCatalog::with_builtins();
    catalog.register("channel", channel);

    let context = SchedulerContext::new(store.clone(), catalog).with_clock(clock.clone());
    let registry = SchedulerRegistry::new(context, CancellationToken::new());

    Harness {
        registry,
        store,
        clock,
        batches,
    }
}

fn timestamps(batch: &[Sample]) -> Vec<Timestamp> {
    batch.iter().map(|s| s.timestamp).collect()
}

#[tokio::test(start_paused = true)]
async fn test_timer_delivers_consecutive_windows() {
    let mut h = harness(0);
    h.store.record_at("node", W - 20, json!("too old"));
    h.store.record_at("node", W - 3, json!("first"));
    h.store.record_at("node", W + 5, json!("second"));

    let config = SchedulerConfig::new("node")
        .with_reporter(ReporterSpec::new("channel"))
        .with_interval_ms(10_000);
    let handle = h.registry.spawn(&config).await.unwrap();

    let first = h.batches.recv().await.unwrap();
    assert_eq!(timestamps(&first), vec![W - 3]);

    h.clock.advance(10);
    let second = h.batches.recv().await.unwrap();
    assert_eq!(timestamps(&second), vec![W + 5]);

    let state = handle.state().await.unwrap();
    assert_eq!(state.next_query_from, Some(W + 11));
    assert_eq!(state.phase, SchedulerPhase::IdleWithCursor);
    assert_eq!(state.metrics.cycles_delivered, 2);
    assert_eq!(state.metrics.samples_delivered, 2);
    assert_eq!(state.timer.map(|t| t.period_ms), Some(10_000));

    let report = h.registry.shutdown().await;
    assert!(report.all_graceful());
}

#[tokio::test]
async fn test_manual_reports_and_reads_share_one_cursor() {
    let mut h = harness(100);
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("edge.jsonl");

    let config = SchedulerConfig::new("edge").with_reporter(ReporterSpec::with_args(
        "jsonl",
        json!({ "path": path.display().to_string() }),
    ));
    h.registry.spawn(&config).await.unwrap();

    h.store.record_at("edge", W - 1, json!("before start"));
    h.store.record_at("edge", W + 2, json!("uptime"));
    h.clock.advance(5);

    h.registry.report_metrics("edge").await.unwrap();
    // Processed after the report cycle.
    let state = h.registry.get("edge").unwrap().state().await.unwrap();
    assert_eq!(state.next_query_from, Some(W + 6));
    assert!(!state.is_timer_armed());

    let contents = std::fs::read_to_string(&path).unwrap();
    let lines: Vec<serde_json::Value> = contents
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0]["count"], 1);
    assert_eq!(lines[0]["samples"][0]["timestamp"], W + 2);

    // Same second: nothing new.
    assert!(h.registry.get_latest_metrics("edge").await.unwrap().is_empty());

    h.store.record_at("edge", W + 6, json!("later"));
    h.clock.advance(1);
    let latest = h.registry.get_latest_metrics("edge").await.unwrap();
    assert_eq!(timestamps(&latest), vec![W + 6]);

    // Reads bypass the reporter.
    let contents = std::fs::read_to_string(&path).unwrap();
    assert_eq!(contents.lines().count(), 1);
    assert!(h.batches.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn test_reporter_attached_at_runtime_starts_schedule() {
    let mut h = harness(0);
    h.store.record_at("node", W, json!(1));

    let config = SchedulerConfig::new("node").with_interval_ms(30_000);
    let handle = h.registry.spawn(&config).await.unwrap();

    handle.report_metrics().await.unwrap();
    let state = handle.state().await.unwrap();
    assert!(!state.has_reporter());
    assert!(!state.is_timer_armed());
    assert_eq!(state.next_query_from, None);
    assert_eq!(state.metrics.cycles_skipped, 1);

    handle
        .set_reporter(Some(ReporterSpec::new("channel")))
        .await
        .unwrap();
    assert!(handle.state().await.unwrap().is_timer_armed());

    let batch = h.batches.recv().await.unwrap();
    assert_eq!(timestamps(&batch), vec![W]);

    let unknown = handle.set_reporter(Some(ReporterSpec::new("statsd"))).await;
    assert!(matches!(
        unknown,
        Err(metrics_reporter::Error::UnknownReporter(_))
    ));
    assert_eq!(
        handle.state().await.unwrap().reporter.as_deref(),
        Some("channel")
    );

    h.registry.shutdown().await;
    assert!(handle.is_stopped());
}

#[tokio::test]
async fn test_instances_are_independent() {
    let mut h = harness(0);
    for name in ["a", "b"] {
        h.registry
            .spawn(&SchedulerConfig::new(name))
            .await
            .unwrap();
    }
    h.store.record_at("a", W, json!("a"));
    h.store.record_at("b", W, json!("b"));

    let a = h.registry.get_latest_metrics("a").await.unwrap();
    assert_eq!(a[0].payload, json!("a"));

    let b_state = h.registry.get("b").unwrap().state().await.unwrap();
    assert_eq!(b_state.next_query_from, None);

    let b = h.registry.get_latest_metrics("b").await.unwrap();
    assert_eq!(b[0].payload, json!("b"));

    let report = h.registry.shutdown().await;
    assert_eq!(report.total, 2);
    assert_eq!(report.graceful_stops, 2);
}
