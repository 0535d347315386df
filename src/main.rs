//! ha-store soak driver.
//!
//! Runs a store against a synthetic resolver with configurable latency and
//! failure rate, then prints resolver and store statistics as JSON.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};
use futures_util::future::join_all;
use serde_json::{json, Value};

use ha_store::config::{load_config, StoreConfig};
use ha_store::observability::{logging, metrics};
use ha_store::{resolver_fn, HaStore, Params, ResolverError};

#[derive(Parser)]
#[command(name = "ha-store")]
#[command(about = "Soak driver for the ha-store batching cache", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate the configuration and print it
    Check,
    /// Drive a synthetic resolver and print statistics
    Soak {
        /// Total number of get calls
        #[arg(long, default_value_t = 10_000)]
        requests: usize,

        /// Concurrent callers
        #[arg(long, default_value_t = 64)]
        concurrency: usize,

        /// Number of distinct ids requested
        #[arg(long, default_value_t = 500)]
        id_space: u64,

        /// Resolver latency in milliseconds
        #[arg(long, default_value_t = 20)]
        latency_ms: u64,

        /// Probability that a resolver call fails
        #[arg(long, default_value_t = 0.0)]
        failure_rate: f64,
    },
}

#[derive(Default)]
struct ResolverStats {
    calls: AtomicU64,
    ids: AtomicU64,
    failures: AtomicU64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => StoreConfig::default(),
    };

    logging::init_logging(&config.observability)?;
    tracing::info!("ha-store v{} starting", env!("CARGO_PKG_VERSION"));

    if config.observability.metrics_enabled {
        if let Ok(addr) = config.observability.metrics_address.parse() {
            metrics::init_metrics(addr);
        } else {
            tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            );
        }
    }

    match cli.command {
        Commands::Check => {
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        Commands::Soak {
            requests,
            concurrency,
            id_space,
            latency_ms,
            failure_rate,
        } => {
            let report = soak(
                config,
                requests,
                concurrency.max(1),
                id_space.max(1),
                Duration::from_millis(latency_ms),
                failure_rate.clamp(0.0, 1.0),
            )
            .await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    Ok(())
}

async fn soak(
    config: StoreConfig,
    requests: usize,
    concurrency: usize,
    id_space: u64,
    latency: Duration,
    failure_rate: f64,
) -> Result<Value, Box<dyn std::error::Error>> {
    let stats = Arc::new(ResolverStats::default());
    let seen = Arc::clone(&stats);

    let resolver = resolver_fn(move |ids: Vec<String>, _params, _metadata| {
        let stats = Arc::clone(&seen);
        async move {
            stats.calls.fetch_add(1, Ordering::Relaxed);
            stats.ids.fetch_add(ids.len() as u64, Ordering::Relaxed);
            tokio::time::sleep(latency).await;

            if fastrand::f64() < failure_rate {
                stats.failures.fetch_add(1, Ordering::Relaxed);
                return Err(ResolverError::new("synthetic failure"));
            }
            let records = ids
                .into_iter()
                .map(|id| -> Result<Value, ResolverError> {
                    let n: u64 = id.parse().map_err(ResolverError::from_error)?;
                    Ok(json!({"id": id, "n": n, "fetched": true}))
                })
                .collect::<Result<Vec<_>, ResolverError>>()?;
            Ok(Value::Array(records))
        }
    });

    let store = HaStore::builder(resolver).config(config).build()?;
    let found = Arc::new(AtomicU64::new(0));
    let failed = Arc::new(AtomicU64::new(0));
    let started = Instant::now();

    let per_worker = requests.div_ceil(concurrency);
    let workers = (0..concurrency).map(|worker| {
        let store = store.clone();
        let found = Arc::clone(&found);
        let failed = Arc::clone(&failed);
        let count = per_worker.min(requests.saturating_sub(worker * per_worker));
        tokio::spawn(async move {
            let params = Params::new();
            for _ in 0..count {
                let id = fastrand::u64(0..id_space).to_string();
                match store.get(id, &params, None).await {
                    Ok(_) => found.fetch_add(1, Ordering::Relaxed),
                    Err(e) => {
                        tracing::debug!(error = %e, "Request failed");
                        failed.fetch_add(1, Ordering::Relaxed)
                    }
                };
            }
        })
    });
    for joined in join_all(workers).await {
        joined?;
    }

    let elapsed = started.elapsed();
    let size = store.size().await;
    store.shutdown();

    Ok(json!({
        "requests": requests,
        "elapsed_ms": elapsed.as_millis() as u64,
        "succeeded": found.load(Ordering::Relaxed),
        "failed": failed.load(Ordering::Relaxed),
        "resolver": {
            "calls": stats.calls.load(Ordering::Relaxed),
            "ids": stats.ids.load(Ordering::Relaxed),
            "failures": stats.failures.load(Ordering::Relaxed),
        },
        "size": size,
        "breaker": store.breaker_status(),
    }))
}
