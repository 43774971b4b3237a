//! Multi-Key Rate Limiter
//!
//! One [`FixedWindowLimiter`] per caller key, created on first use. Keys that
//! stay idle are dropped by [`MultiKeyLimiter::cleanup`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::clock::SharedClock;
use crate::error::RateLimitError;
use crate::limiter::FixedWindowLimiter;

#[derive(Debug)]
struct KeyedLimiter {
    limiter: Arc<FixedWindowLimiter>,
    last_used: Instant,
}

// == Multi Key Limiter ==
#[derive(Debug)]
pub struct MultiKeyLimiter {
    limit: u32,
    interval: Duration,
    clock: SharedClock,
    limiters: Mutex<HashMap<String, KeyedLimiter>>,
}

impl MultiKeyLimiter {
    /// Every key gets its own budget of `limit` per `interval`.
    pub fn new(limit: u32, interval: Duration, clock: SharedClock) -> Self {
        Self {
            limit,
            interval,
            clock,
            limiters: Mutex::new(HashMap::new()),
        }
    }

    // == Process ==
    /// Runs `action` against `key`'s budget, creating the key's limiter if needed.
    ///
    /// The key map lock is released before `action` runs, so different keys
    /// never wait on each other. The first use of a key starts its reset timer,
    /// so this must be called from within a tokio runtime.
    pub fn process<R, F>(&self, key: &str, action: F) -> Result<R, RateLimitError>
    where
        F: FnOnce() -> R,
    {
        self.limiter_for(key).process(action)
    }

    fn limiter_for(&self, key: &str) -> Arc<FixedWindowLimiter> {
        let now = self.clock.now();
        let mut limiters = self.limiters.lock();

        if let Some(entry) = limiters.get_mut(key) {
            entry.last_used = now;
            return Arc::clone(&entry.limiter);
        }

        debug!(key, limit = self.limit, "Creating rate limiter for key");
        let limiter = Arc::new(FixedWindowLimiter::with_interval(self.limit, self.interval));
        limiters.insert(
            key.to_string(),
            KeyedLimiter {
                limiter: Arc::clone(&limiter),
                last_used: now,
            },
        );
        limiter
    }

    // == Cleanup ==
    /// Drops limiters whose key has not been used for longer than `max_age`.
    ///
    /// A dropped key starts over with a fresh budget on its next use. Returns
    /// the number of keys removed.
    pub fn cleanup(&self, max_age: Duration) -> usize {
        let now = self.clock.now();
        let mut limiters = self.limiters.lock();
        let before = limiters.len();

        limiters.retain(|_, entry| {
            let idle = now.saturating_duration_since(entry.last_used);
            if idle > max_age {
                entry.limiter.stop();
                false
            } else {
                true
            }
        });

        let removed = before - limiters.len();
        if removed > 0 {
            info!(removed, remaining = limiters.len(), "Pruned idle rate limiters");
        }
        removed
    }

    /// Number of keys currently tracked.
    pub fn len(&self) -> usize {
        self.limiters.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // == Stop ==
    /// Stops every per-key limiter and forgets all keys.
    pub fn stop(&self) {
        let mut limiters = self.limiters.lock();
        for entry in limiters.values() {
            entry.limiter.stop();
        }
        limiters.clear();
    }
}
