//! Periodic Background Task
//!
//! A cancellable timer loop owned by exactly one cache or limiter instance.
//! Started at construction, stopped by the owner's `shutdown`/`stop`, and
//! aborted on drop if the owner never stopped it.

use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Shortest period accepted; a zero period would spin.
const MIN_PERIOD: Duration = Duration::from_millis(1);

/// Handle to a spawned periodic task.
#[derive(Debug)]
pub struct PeriodicTask {
    name: &'static str,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl PeriodicTask {
    /// Spawns `tick` to run every `period`, first firing one period from now.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Example
    /// ```ignore
    /// let sweeper = PeriodicTask::spawn("sweep", Duration::from_secs(60), move || {
    ///     cache.cleanup();
    /// });
    /// // Later, during shutdown:
    /// sweeper.stop();
    /// ```
    pub fn spawn<F>(name: &'static str, period: Duration, mut tick: F) -> Self
    where
        F: FnMut() + Send + 'static,
    {
        let period = if period < MIN_PERIOD {
            warn!(task = name, ?period, "Periodic task period too small, clamping");
            MIN_PERIOD
        } else {
            period
        };

        let first = Instant::now() + period;
        let handle = tokio::spawn(async move {
            debug!(task = name, ?period, "Starting periodic task");

            let mut ticker = time::interval_at(first, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                tick();
            }
        });

        Self {
            name,
            handle: Mutex::new(Some(handle)),
        }
    }

    /// Stops the timer. Later calls do nothing.
    pub fn stop(&self) {
        if let Some(handle) = self.handle.lock().take() {
            handle.abort();
            info!(task = self.name, "Periodic task stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle
            .lock()
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }
}

impl Drop for PeriodicTask {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.get_mut().take() {
            handle.abort();
        }
    }
}
