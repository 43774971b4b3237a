//! Clock Module
//!
//! Time source used for expiration and order timestamps. Production code uses
//! [`SystemClock`]; tests that need exact TTL boundaries use [`ManualClock`].

use std::fmt::Debug;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

// == Clock Trait ==
/// Source of monotonic and wall-clock time.
pub trait Clock: Debug + Send + Sync + 'static {
    /// Monotonic instant used for expiration arithmetic.
    fn now(&self) -> Instant;

    /// Wall-clock time used for created/updated timestamps.
    fn utc_now(&self) -> DateTime<Utc>;
}

/// Shared clock handle.
pub type SharedClock = Arc<dyn Clock>;

// == System Clock ==
/// Real time. Reads through tokio's clock so paused test runtimes control it too.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        tokio::time::Instant::now().into_std()
    }

    fn utc_now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

// == Manual Clock ==
/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    origin_utc: DateTime<Utc>,
    offset: Mutex<Duration>,
}

impl ManualClock {
    /// Creates a manual clock frozen at the current moment.
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            origin_utc: Utc::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    /// Moves the clock forward.
    pub fn advance(&self, by: Duration) {
        *self.offset.lock() += by;
    }

    /// Total time advanced since construction.
    pub fn elapsed(&self) -> Duration {
        *self.offset.lock()
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + *self.offset.lock()
    }

    fn utc_now(&self) -> DateTime<Utc> {
        let offset = chrono::Duration::from_std(*self.offset.lock())
            .unwrap_or_else(|_| chrono::Duration::zero());
        self.origin_utc + offset
    }
}
