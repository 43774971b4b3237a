//! Shop Cache - in-process caching and admission control
//!
//! Provides a bounded LRU store, a sliding-TTL profile cache, asynchronous
//! local/remote cache synchronization on a worker pool, and fixed-window
//! rate limiting.

pub mod cache;
pub mod clock;
pub mod config;
pub mod error;
pub mod limiter;
pub mod models;
pub mod sync;
pub mod tasks;

pub use cache::{LruStore, ProfileCache, ProfileCacheConfig};
pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use config::Config;
pub use limiter::{FixedWindowLimiter, MultiKeyLimiter};
pub use sync::{CacheSynchronizer, CacheTask, SyncConfig};
pub use tasks::WorkerPool;
