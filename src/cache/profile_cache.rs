//! Profile Cache Module
//!
//! LRU store of [`Profile`] aggregates with sliding expiration and in-place
//! nested order mutations.
//!
//! Every operation that finds a live profile pushes its expiration forward by
//! the configured TTL. Order mutations run under the store's write lock, so
//! concurrent add/update/remove calls on one profile never lose each other's
//! changes.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, info};

use crate::cache::{CacheStats, ExpiringItem, LruStore, Modify};
use crate::clock::SharedClock;
use crate::config::Config;
use crate::models::{Order, Profile};
use crate::tasks::PeriodicTask;

// == Profile Cache Config ==
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileCacheConfig {
    /// Maximum number of profiles held
    pub capacity: usize,
    /// Sliding time-to-live
    pub ttl: Duration,
    /// How often the background sweep drops expired profiles
    pub cleanup_interval: Duration,
}

impl From<&Config> for ProfileCacheConfig {
    fn from(config: &Config) -> Self {
        Self {
            capacity: config.cache_capacity,
            ttl: config.cache_ttl,
            cleanup_interval: config.cleanup_interval,
        }
    }
}

/// State shared between the cache handle and its sweeper.
#[derive(Debug)]
struct Shared {
    store: LruStore<String, ExpiringItem<Profile>>,
    ttl: Duration,
    clock: SharedClock,
}

impl Shared {
    /// Applies `f` to a live profile. `f` returns whether it changed anything.
    ///
    /// Absent profiles yield `None`. Expired ones are removed and yield `None`.
    /// A live profile has its expiration slid only when `f` returns true.
    fn mutate<F>(&self, id: &str, f: F) -> Option<Profile>
    where
        F: FnOnce(&mut Profile, DateTime<Utc>) -> bool,
    {
        let now = self.clock.now();
        let utc_now = self.clock.utc_now();
        let mut expired = false;

        let outcome = self.store.modify(id, |item| {
            if item.is_expired(now) {
                expired = true;
                return Modify::Remove;
            }
            if !f(&mut item.value, utc_now) {
                return Modify::Keep(None);
            }
            item.slide(now, self.ttl);
            Modify::Keep(Some(item.value.clone()))
        });

        if expired {
            self.store.recorder().record_expirations(1);
            debug!(profile_id = id, "Dropped expired profile on access");
        }
        outcome.flatten()
    }

    fn sweep(&self) -> usize {
        let now = self.clock.now();
        let removed = self.store.remove_where(|_, item| item.is_expired(now));
        self.store.recorder().record_expirations(removed as u64);
        removed
    }
}

// == Profile Cache ==
#[derive(Debug)]
pub struct ProfileCache {
    shared: Arc<Shared>,
    sweeper: PeriodicTask,
}

impl ProfileCache {
    // == Constructor ==
    /// Creates the cache and starts its background sweep.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(config: ProfileCacheConfig, clock: SharedClock) -> Self {
        let shared = Arc::new(Shared {
            store: LruStore::new(config.capacity),
            ttl: config.ttl,
            clock,
        });

        let sweep_target = Arc::clone(&shared);
        let sweeper = PeriodicTask::spawn("profile-cache-sweep", config.cleanup_interval, move || {
            let removed = sweep_target.sweep();
            if removed > 0 {
                info!("TTL cleanup: removed {} expired profiles", removed);
            } else {
                debug!("TTL cleanup: no expired profiles found");
            }
        });

        Self { shared, sweeper }
    }

    // == Get ==
    /// Returns the profile if present and live, sliding its expiration.
    pub fn get(&self, id: &str) -> Option<Profile> {
        let found = self.shared.mutate(id, |_, _| true);
        let recorder = self.shared.store.recorder();
        match found {
            Some(_) => recorder.record_hit(),
            None => recorder.record_miss(),
        }
        found
    }

    // == Set ==
    /// Inserts or replaces a profile with a fresh expiration.
    pub fn set(&self, profile: Profile) {
        let item = ExpiringItem::new(profile, self.shared.clock.now(), self.shared.ttl);
        if let Some((evicted, _)) = self.shared.store.put(item.value.id.clone(), item) {
            debug!(profile_id = %evicted, "Evicted least recently used profile");
        }
    }

    // == Delete ==
    /// Removes a profile. Returns whether it was cached.
    pub fn delete(&self, id: &str) -> bool {
        self.shared.store.remove(id)
    }

    // == Add Order ==
    /// Appends `order` to a cached profile and returns the updated profile.
    ///
    /// Returns `None`, creating nothing, if the profile is absent or expired.
    pub fn add_order(&self, profile_id: &str, order: Order) -> Option<Profile> {
        self.shared.mutate(profile_id, |profile, _| {
            profile.push_order(order);
            true
        })
    }

    // == Update Order ==
    /// Replaces the value of one nested order and stamps its `updated_at`.
    ///
    /// Returns `None` if the profile is absent, expired, or has no such order.
    pub fn update_order(&self, profile_id: &str, order_id: &str, value: Value) -> Option<Profile> {
        self.shared.mutate(profile_id, |profile, now| {
            profile.replace_order_value(order_id, value, now)
        })
    }

    // == Remove Order ==
    /// Removes one nested order, keeping the others in order.
    ///
    /// Returns `None` if the profile is absent, expired, or has no such order.
    pub fn remove_order(&self, profile_id: &str, order_id: &str) -> Option<Profile> {
        self.shared
            .mutate(profile_id, |profile, _| profile.drop_order(order_id))
    }

    // == Cleanup ==
    /// Drops every expired profile. Normally driven by the background sweep.
    pub fn cleanup(&self) -> usize {
        self.shared.sweep()
    }

    /// Time left before a profile expires, without sliding it.
    pub fn ttl_remaining(&self, id: &str) -> Option<Duration> {
        let now = self.shared.clock.now();
        self.shared
            .store
            .peek(id)
            .filter(|item| !item.is_expired(now))
            .map(|item| item.remaining(now))
    }

    /// Number of stored profiles, including expired ones not yet swept.
    pub fn len(&self) -> usize {
        self.shared.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.shared.store.capacity()
    }

    pub fn ttl(&self) -> Duration {
        self.shared.ttl
    }

    pub fn stats(&self) -> CacheStats {
        self.shared.store.stats()
    }

    // == Shutdown ==
    /// Stops the background sweep. Cached data stays readable.
    pub fn shutdown(&self) {
        self.sweeper.stop();
    }
}
