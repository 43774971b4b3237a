//! Fixed-Window Rate Limiter
//!
//! Counts operations in the current window and rejects once the window's
//! budget is spent. A background timer zeroes the count at every window
//! boundary.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::trace;

use crate::error::RateLimitError;
use crate::tasks::PeriodicTask;

// == Public Constants ==
/// Window length used by [`FixedWindowLimiter::new`].
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(1);

// == Fixed Window Limiter ==
/// Admits at most `limit` actions between two consecutive resets.
///
/// This is not a rolling window: a burst at the end of one window followed by
/// a burst at the start of the next can admit up to `2 * limit` actions in
/// less than one interval.
#[derive(Debug)]
pub struct FixedWindowLimiter {
    limit: u32,
    interval: Duration,
    count: Arc<Mutex<u32>>,
    reset: PeriodicTask,
}

impl FixedWindowLimiter {
    // == Constructors ==
    /// Limiter with a one-second window. Must be called from within a tokio runtime.
    pub fn new(limit: u32) -> Self {
        Self::with_interval(limit, DEFAULT_INTERVAL)
    }

    pub fn with_interval(limit: u32, interval: Duration) -> Self {
        let count = Arc::new(Mutex::new(0u32));
        let window = Arc::clone(&count);
        let reset = PeriodicTask::spawn("rate-limit-reset", interval, move || {
            let mut count = window.lock();
            trace!(used = *count, "Rate limit window reset");
            *count = 0;
        });

        Self {
            limit,
            interval,
            count,
            reset,
        }
    }

    // == Process ==
    /// Runs `action` if the window has budget left, otherwise rejects it.
    ///
    /// `action` runs synchronously while the limiter's lock is held, so every
    /// caller of this limiter waits for it. Keep it short and never call back
    /// into the same limiter from inside it.
    pub fn process<R, F>(&self, action: F) -> Result<R, RateLimitError>
    where
        F: FnOnce() -> R,
    {
        let mut count = self.count.lock();
        if *count >= self.limit {
            return Err(RateLimitError::Exceeded {
                limit: self.limit,
                interval: self.interval,
            });
        }
        *count += 1;
        Ok(action())
    }

    /// Operations still allowed in the current window.
    pub fn remaining(&self) -> u32 {
        self.limit.saturating_sub(*self.count.lock())
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    // == Stop ==
    /// Stops the reset timer. The count then stays where it is for good.
    pub fn stop(&self) {
        self.reset.stop();
    }
}
