//! Shop Cache - caching and admission-control layer
//!
//! Boots every component from environment configuration and keeps them
//! running until the process is asked to stop.

use std::sync::Arc;

use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use shop_cache::sync::{InMemoryRemoteStore, SharedRemote};
use shop_cache::tasks::PeriodicTask;
use shop_cache::{
    CacheSynchronizer, Config, MultiKeyLimiter, ProfileCache, ProfileCacheConfig, SharedClock,
    SyncConfig, SystemClock,
};

/// Main entry point.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Create the profile cache (starts its TTL sweep)
/// 4. Create the cache synchronizer over the remote tier (starts sync workers)
/// 5. Create the per-key rate limiter and its idle-key pruning timer
/// 6. Wait for SIGINT/SIGTERM, then shut everything down in reverse order
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "shop_cache=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Shop Cache");

    let config = Config::from_env();
    info!(
        "Configuration loaded: capacity={}, ttl={:?}, remote_ttl={:?}, workers={}, rate_limit={}/{:?}",
        config.cache_capacity,
        config.cache_ttl,
        config.remote_ttl,
        config.sync_workers,
        config.rate_limit,
        config.rate_limit_interval
    );

    let clock: SharedClock = Arc::new(SystemClock);

    let cache = Arc::new(ProfileCache::new(
        ProfileCacheConfig::from(&config),
        Arc::clone(&clock),
    ));
    info!("Profile cache initialized");

    let remote: SharedRemote = Arc::new(InMemoryRemoteStore::new(Arc::clone(&clock)));
    let synchronizer = CacheSynchronizer::new(
        Arc::clone(&cache),
        remote,
        SyncConfig::from(&config),
    );
    info!("Cache synchronizer started");

    let limiter = Arc::new(MultiKeyLimiter::new(
        config.rate_limit,
        config.rate_limit_interval,
        Arc::clone(&clock),
    ));
    let idle = config.limiter_idle;
    let prune_target = Arc::clone(&limiter);
    let pruner = PeriodicTask::spawn("limiter-prune", idle, move || {
        prune_target.cleanup(idle);
    });
    info!("Rate limiter ready");

    shutdown_signal().await?;

    pruner.stop();
    limiter.stop();
    synchronizer.shutdown().await;
    cache.shutdown();

    let stats = cache.stats();
    info!(
        "Shutdown complete: hits={}, misses={}, evictions={}, expirations={}, hit_rate={:.2}",
        stats.hits,
        stats.misses,
        stats.evictions,
        stats.expirations,
        stats.hit_rate()
    );
    Ok(())
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() -> anyhow::Result<()> {
    #[cfg(unix)]
    {
        let mut terminate = signal::unix::signal(signal::unix::SignalKind::terminate())?;
        tokio::select! {
            result = signal::ctrl_c() => {
                result?;
                info!("Received Ctrl+C, initiating shutdown...");
            }
            _ = terminate.recv() => {
                info!("Received SIGTERM, initiating shutdown...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        signal::ctrl_c().await?;
        info!("Received Ctrl+C, initiating shutdown...");
    }

    Ok(())
}
