//! Configuration Module
//!
//! Handles loading and managing cache-layer configuration from environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Cache-layer configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Maximum number of profiles the local cache can hold
    pub cache_capacity: usize,
    /// Sliding TTL for local cache entries
    pub cache_ttl: Duration,
    /// Interval between background sweeps of expired local entries
    pub cleanup_interval: Duration,
    /// TTL applied to remote-tier writes (longer than `cache_ttl`)
    pub remote_ttl: Duration,
    /// Upper bound on a single remote-tier call
    pub remote_timeout: Duration,
    /// Number of cache-sync workers
    pub sync_workers: usize,
    /// Capacity of the cache-sync queue
    pub sync_queue_size: usize,
    /// Operations allowed per key per window
    pub rate_limit: u32,
    /// Length of one rate-limit window
    pub rate_limit_interval: Duration,
    /// Per-key limiters idle longer than this are pruned
    pub limiter_idle: Duration,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_CAPACITY` - Maximum cached profiles (default: 1000)
    /// - `CACHE_TTL_MS` - Local sliding TTL (default: 300000)
    /// - `CACHE_CLEANUP_INTERVAL_MS` - Sweep frequency (default: 60000)
    /// - `REMOTE_TTL_MS` - Remote-tier TTL (default: 1800000)
    /// - `REMOTE_TIMEOUT_MS` - Remote call timeout (default: 2000)
    /// - `SYNC_WORKERS` - Cache-sync workers (default: 4)
    /// - `SYNC_QUEUE_SIZE` - Cache-sync queue capacity (default: 256)
    /// - `RATE_LIMIT` - Operations per window per key (default: 100)
    /// - `RATE_LIMIT_INTERVAL_MS` - Window length (default: 1000)
    /// - `LIMITER_IDLE_MS` - Idle age before a per-key limiter is pruned (default: 600000)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            cache_capacity: env_or("CACHE_CAPACITY", defaults.cache_capacity),
            cache_ttl: env_ms_or("CACHE_TTL_MS", defaults.cache_ttl),
            cleanup_interval: env_ms_or("CACHE_CLEANUP_INTERVAL_MS", defaults.cleanup_interval),
            remote_ttl: env_ms_or("REMOTE_TTL_MS", defaults.remote_ttl),
            remote_timeout: env_ms_or("REMOTE_TIMEOUT_MS", defaults.remote_timeout),
            sync_workers: env_or("SYNC_WORKERS", defaults.sync_workers),
            sync_queue_size: env_or("SYNC_QUEUE_SIZE", defaults.sync_queue_size),
            rate_limit: env_or("RATE_LIMIT", defaults.rate_limit),
            rate_limit_interval: env_ms_or("RATE_LIMIT_INTERVAL_MS", defaults.rate_limit_interval),
            limiter_idle: env_ms_or("LIMITER_IDLE_MS", defaults.limiter_idle),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache_capacity: 1000,
            cache_ttl: Duration::from_secs(300),
            cleanup_interval: Duration::from_secs(60),
            remote_ttl: Duration::from_secs(1800),
            remote_timeout: Duration::from_secs(2),
            sync_workers: 4,
            sync_queue_size: 256,
            rate_limit: 100,
            rate_limit_interval: Duration::from_secs(1),
            limiter_idle: Duration::from_secs(600),
        }
    }
}

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_ms_or(name: &str, default: Duration) -> Duration {
    env::var(name)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(default)
}
