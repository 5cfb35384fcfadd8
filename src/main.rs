//! tiered-pool-cache: drive a tiered resource-pool cache with a synthetic workload.
//!
//! Loads a JSON configuration, opens the tiered store it describes, runs a
//! concurrent read/write/remove workload against it and reports per-tier
//! usage (and optionally Prometheus metrics) before closing the store.

use std::sync::Arc;
use std::time::Instant;

use clap::Parser;
use tracing::{error, info};

use tiered_pool_cache::cache::TieredStore;
use tiered_pool_cache::config::{Cli, Config};
use tiered_pool_cache::workload::{run_worker, WorkloadReport};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments.
    let cli = Cli::parse();

    // Initialize tracing/logging.
    let filter = if cli.verbose {
        "tiered_pool_cache=debug"
    } else {
        "tiered_pool_cache=info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| filter.into()),
        )
        .with_target(true)
        .init();

    info!("tiered-pool-cache v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration.
    let mut config = Config::load(&cli.config)?;
    if let Some(threads) = cli.threads {
        config.workload.threads = threads;
    }

    let pools = config.resource_pools()?;
    for pool in pools.tiers() {
        info!(pool = %pool, "Resource pool");
    }

    let store: Arc<TieredStore<u64, String>> =
        Arc::new(TieredStore::open(pools, config.store_options())?);

    info!(
        threads = config.workload.threads,
        operations = config.workload.operations,
        key_space = config.workload.key_space,
        "Starting workload"
    );
    let started = Instant::now();

    let mut workers = Vec::with_capacity(config.workload.threads);
    for worker in 0..config.workload.threads {
        let store = Arc::clone(&store);
        let workload = config.workload.clone();
        workers.push(tokio::task::spawn_blocking(move || {
            run_worker(&store, &workload, worker)
        }));
    }

    let mut report = WorkloadReport::default();
    for handle in workers {
        match handle.await {
            Ok(worker_report) => report.merge(&worker_report),
            Err(e) => error!(error = %e, "Workload worker panicked"),
        }
    }

    let elapsed = started.elapsed();
    info!(
        gets = report.gets,
        hits = report.hits,
        puts = report.puts,
        removes = report.removes,
        errors = report.errors,
        hit_ratio = format!("{:.3}", report.hit_ratio()),
        elapsed_ms = elapsed.as_millis() as u64,
        "Workload complete"
    );

    for stats in store.tier_stats() {
        info!(
            tier = %stats.tier,
            unit = %stats.unit,
            entries = stats.entries,
            occupancy = stats.occupancy,
            capacity = stats.capacity,
            usage = format!("{:.1}%", stats.usage_fraction() * 100.0),
            "Tier usage"
        );
    }

    let snapshot = store.metrics_snapshot();
    info!(
        promotions = snapshot.promotions,
        demotions = snapshot.demotions,
        evictions = snapshot.evictions,
        expirations = snapshot.expirations,
        storage_failures = snapshot.storage_failures,
        "Tier movement"
    );

    if cli.metrics {
        println!("{}", store.metrics().encode_text()?);
    }

    let store = Arc::try_unwrap(store)
        .map_err(|_| anyhow::anyhow!("store still shared after workload"))?;
    store.close()?;

    Ok(())
}
