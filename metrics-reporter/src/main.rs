use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use metrics_reporter::config::AppConfig;
use metrics_reporter::logging;
use metrics_reporter::reporter::ReporterCatalog;
use metrics_reporter::scheduler::{SchedulerContext, SchedulerRegistry};
use metrics_reporter::store::InMemoryMetricStore;

/// How often the built-in sampler records a heartbeat per instance.
const SAMPLE_INTERVAL: Duration = Duration::from_secs(1);

/// Heartbeats older than this are dropped from the in-memory store.
const SAMPLE_RETENTION_SECS: i64 = 3_600;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = AppConfig::from_env()?;
    let (_logging, _guard) =
        logging::init_logging(config.log_filter.as_deref(), config.log_dir.as_deref())?;

    let store = Arc::new(InMemoryMetricStore::new());
    let catalog = ReporterCatalog::with_builtins();
    info!(reporters = ?catalog.ids(), "Reporter catalog ready");

    let token = CancellationToken::new();
    let context = SchedulerContext::new(store.clone(), catalog);
    let mut registry = SchedulerRegistry::new(context, token.clone());
    let started = registry.spawn_all(&config.instances).await?;

    if started == 0 {
        warn!("No instances configured");
    }

    let instances: Vec<String> = registry
        .instances()
        .into_iter()
        .map(str::to_string)
        .collect();
    let sampler = tokio::spawn(run_sampler(store, instances, token.child_token()));

    info!(instances = started, "metrics-reporter started");

    tokio::signal::ctrl_c().await?;
    info!("Received Ctrl-C, shutting down");

    let report = registry.shutdown().await;
    token.cancel();
    if let Err(e) = sampler.await {
        warn!(error = %e, "Sampler task failed");
    }

    if !report.all_graceful() {
        warn!(
            graceful_pct = report.graceful_percentage(),
            forced = report.forced_terminations,
            "Some schedulers did not stop gracefully"
        );
    }

    Ok(())
}

/// Record a heartbeat sample for every instance until cancelled.
async fn run_sampler(
    store: Arc<InMemoryMetricStore>,
    instances: Vec<String>,
    token: CancellationToken,
) {
    let started = Instant::now();
    let mut ticker = tokio::time::interval(SAMPLE_INTERVAL);

    loop {
        tokio::select! {
            _ = token.cancelled() => {
                debug!("Sampler shutting down");
                break;
            }
            _ = ticker.tick() => {
                let now = Utc::now().timestamp();
                for instance in &instances {
                    store.record_at(
                        instance,
                        now,
                        json!({ "uptime_secs": started.elapsed().as_secs() }),
                    );
                    store.prune_before(instance, now - SAMPLE_RETENTION_SECS);
                }
            }
        }
    }
}
