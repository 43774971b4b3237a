//! Cache Module
//!
//! Provides the generic bounded LRU store and the profile cache built on it
//! with sliding TTL expiration.

mod entry;
mod lru;
mod profile_cache;
mod stats;

#[cfg(test)]
mod property_tests;

// Re-export public types
pub use entry::ExpiringItem;
pub use lru::{LruStore, Modify, DEFAULT_CAPACITY};
pub use profile_cache::{ProfileCache, ProfileCacheConfig};
pub use stats::CacheStats;
