use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use beacon_cache::{Cache, CacheInvalidator};
use beacon_core::config::{BeaconConfig, CacheBackend};
use beacon_scheduler::{ReqwestCaller, SqliteQueue, Sweeper, TriggerExecutor, WorkerRuntime};
use beacon_store::{db::open_connection, SqliteStore};
use clap::Parser;
use tracing::{info, warn};

mod cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "beacon_worker=info,beacon_scheduler=info".into()),
        )
        .init();

    let args = cli::Args::parse();

    // explicit --config / BEACON_CONFIG > ~/.beacon/beacon.toml
    let config = BeaconConfig::load(args.config.as_deref()).unwrap_or_else(|e| {
        warn!("Config load failed ({}), using defaults", e);
        BeaconConfig::default()
    });

    let db_path = &config.database.path;
    ensure_parent_dir(db_path);
    info!(path = %db_path, "opening SQLite database");

    // store and queue each get their own connection
    let busy = config.database.busy_timeout_ms;
    let store = Arc::new(SqliteStore::new(open_connection(db_path, busy)?)?);
    let queue = Arc::new(SqliteQueue::new(open_connection(db_path, busy)?)?);

    let cache = build_cache(&config).await?;
    let invalidator = CacheInvalidator::new(cache).with_scan_count(config.cache.scan_count);
    let caller = Arc::new(ReqwestCaller::new(&config.executor)?);

    let executor = TriggerExecutor::new(store.clone(), queue.clone(), invalidator.clone(), caller);
    let sweeper = Sweeper::new(store, queue.clone(), invalidator, &config.lifecycle);
    let runtime = WorkerRuntime::new(
        queue,
        executor,
        sweeper,
        Duration::from_millis(config.worker.poll_interval_ms),
    );

    let queues = args.queue.queues();
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let handles = runtime.spawn(&queues, shutdown_rx).await;
    info!(queues = ?queues, "beacon worker running");

    tokio::signal::ctrl_c()
        .await
        .context("waiting for ctrl-c")?;
    info!("shutdown requested");

    // signal workers to stop after their current job
    let _ = shutdown_tx.send(true);
    for handle in handles {
        if let Err(e) = handle.await {
            warn!("worker task ended abnormally: {e}");
        }
    }
    Ok(())
}

/// The worker always runs apart from the request layer, so its
/// invalidations must reach a cache the request layer reads too.
async fn build_cache(config: &BeaconConfig) -> anyhow::Result<Arc<dyn Cache>> {
    match config.cache.backend {
        CacheBackend::Memory => anyhow::bail!(
            "cache.backend = \"memory\" is in-process only; a separate worker cannot \
             invalidate pages cached by the request layer, use \"redis\""
        ),
        #[cfg(feature = "redis")]
        CacheBackend::Redis => {
            let cache = beacon_cache::RedisCache::connect(&config.cache.redis_url)
                .await
                .with_context(|| format!("connecting to {}", config.cache.redis_url))?;
            Ok(Arc::new(cache))
        }
        #[cfg(not(feature = "redis"))]
        CacheBackend::Redis => {
            anyhow::bail!("cache.backend = \"redis\" needs beacon-worker built with its default `redis` feature")
        }
    }
}

fn ensure_parent_dir(path: &str) {
    if let Some(parent) = std::path::Path::new(path).parent() {
        if let Err(e) = std::fs::create_dir_all(parent) {
            warn!(dir = %parent.display(), "could not create database directory: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn worker_refuses_in_process_cache() {
        let mut config = BeaconConfig::default();
        config.cache.backend = CacheBackend::Memory;
        let err = build_cache(&config).await.err().expect("memory backend rejected");
        assert!(err.to_string().contains("in-process"));
    }

    #[test]
    fn missing_parent_dir_is_created() {
        let dir = std::env::temp_dir().join(format!("beacon-worker-{}", std::process::id()));
        let db = dir.join("nested").join("beacon.db");
        ensure_parent_dir(db.to_str().unwrap());
        assert!(dir.join("nested").is_dir());
        std::fs::remove_dir_all(&dir).ok();
    }
}
