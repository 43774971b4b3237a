//! Cache Synchronizer
//!
//! Keeps the local profile cache and the remote tier eventually consistent.
//!
//! The local mutation is applied synchronously in [`CacheSynchronizer::submit`],
//! so the submitting caller reads its own write right away. The remote half is
//! queued on a worker pool; callers never wait on remote I/O unless they
//! choose to await the returned [`SyncHandle`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::time::timeout;
use tracing::{debug, error, warn};

use crate::cache::ProfileCache;
use crate::config::Config;
use crate::error::{RemoteError, SyncError, SyncResult};
use crate::models::Profile;
use crate::sync::remote::{profile_key, SharedRemote};
use crate::sync::task::{CacheTask, RemoteAction, RemoteJob, SyncHandle, SyncReport};
use crate::tasks::{TaskHandler, WorkerPool};

// == Sync Config ==
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    pub workers: usize,
    pub queue_size: usize,
    /// TTL for remote writes; expected to exceed the local TTL
    pub remote_ttl: Duration,
    /// Upper bound on each remote call
    pub remote_timeout: Duration,
}

impl From<&Config> for SyncConfig {
    fn from(config: &Config) -> Self {
        Self {
            workers: config.sync_workers,
            queue_size: config.sync_queue_size,
            remote_ttl: config.remote_ttl,
            remote_timeout: config.remote_timeout,
        }
    }
}

// == In-Flight Tracking ==
#[derive(Debug, Default)]
struct KeyState {
    /// Bumped on every submit touching the key
    generation: u64,
    /// Remote jobs accepted and not yet finished
    pending: usize,
    /// Read-throughs currently waiting on the remote tier
    readers: usize,
}

/// Per-key bookkeeping that keeps read-through from repopulating the local
/// tier with a remote copy that queued work is about to replace or delete.
///
/// An entry lives while it has pending jobs or readers, so a reader's
/// generation snapshot cannot be lost to a remove-and-recreate.
#[derive(Debug, Default)]
struct InFlight {
    keys: Mutex<HashMap<String, KeyState>>,
}

impl InFlight {
    fn begin(&self, key: &str) {
        let mut keys = self.keys.lock();
        let state = keys.entry(key.to_string()).or_default();
        state.generation += 1;
        state.pending += 1;
    }

    fn finish(&self, key: &str) {
        let mut keys = self.keys.lock();
        if let Some(state) = keys.get_mut(key) {
            state.pending = state.pending.saturating_sub(1);
            if state.pending == 0 && state.readers == 0 {
                keys.remove(key);
            }
        }
    }

    /// Registers a reader, or returns `None` while remote work is pending.
    fn start_read(&self, key: &str) -> Option<u64> {
        let mut keys = self.keys.lock();
        let state = keys.entry(key.to_string()).or_default();
        if state.pending > 0 {
            return None;
        }
        state.readers += 1;
        Some(state.generation)
    }

    /// Unregisters a reader and runs `fill` if nothing touched the key since
    /// `start_read`. `fill` runs under the lock so a submit cannot slip in
    /// between the check and the local write.
    fn finish_read(&self, key: &str, generation: u64, fill: impl FnOnce()) -> bool {
        let mut keys = self.keys.lock();
        let Some(state) = keys.get_mut(key) else {
            return false;
        };
        state.readers = state.readers.saturating_sub(1);
        let unchanged = state.generation == generation && state.pending == 0;
        if unchanged {
            fill();
        }
        if state.pending == 0 && state.readers == 0 {
            keys.remove(key);
        }
        unchanged
    }

    fn abandon_read(&self, key: &str) {
        let mut keys = self.keys.lock();
        if let Some(state) = keys.get_mut(key) {
            state.readers = state.readers.saturating_sub(1);
            if state.pending == 0 && state.readers == 0 {
                keys.remove(key);
            }
        }
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.keys.lock().len()
    }
}

// == Remote Worker ==
/// Applies queued remote actions.
struct RemoteWorker {
    in_flight: Arc<InFlight>,
    remote: SharedRemote,
    remote_ttl: Duration,
    remote_timeout: Duration,
}

impl RemoteWorker {
    async fn apply(&self, action: &RemoteAction) -> SyncResult<()> {
        let call = async {
            match action {
                RemoteAction::Write { key, profile } => {
                    let bytes = serde_json::to_vec(profile).map_err(RemoteError::from)?;
                    self.remote.set(key, bytes, self.remote_ttl).await?;
                }
                RemoteAction::Invalidate { key } => {
                    self.remote.delete(std::slice::from_ref(key)).await?;
                }
            }
            Ok::<(), SyncError>(())
        };

        timeout(self.remote_timeout, call)
            .await
            .map_err(|_| SyncError::Timeout(self.remote_timeout))?
    }
}

#[async_trait]
impl TaskHandler<RemoteJob> for RemoteWorker {
    async fn handle(&self, job: RemoteJob) {
        let outcome = self.apply(&job.action).await;
        self.in_flight.finish(job.action.key());

        match &outcome {
            Ok(()) => debug!(
                key = job.action.key(),
                action = job.action.kind(),
                "Remote cache synced"
            ),
            Err(e) => error!(
                key = job.action.key(),
                action = job.action.kind(),
                error = %e,
                "Remote cache sync failed"
            ),
        }

        // The caller may have dropped its handle
        let _ = job.reply.send(outcome.map(|()| SyncReport {
            local_applied: job.local_applied,
        }));
    }
}

// == Cache Synchronizer ==
pub struct CacheSynchronizer {
    local: Arc<ProfileCache>,
    remote: SharedRemote,
    remote_timeout: Duration,
    in_flight: Arc<InFlight>,
    pool: WorkerPool<RemoteJob>,
}

impl CacheSynchronizer {
    // == Constructor ==
    /// Starts the sync workers. Must be called from within a tokio runtime.
    pub fn new(local: Arc<ProfileCache>, remote: SharedRemote, config: SyncConfig) -> Self {
        if config.remote_ttl <= local.ttl() {
            warn!(
                remote_ttl = ?config.remote_ttl,
                local_ttl = ?local.ttl(),
                "Remote TTL does not exceed local TTL"
            );
        }

        let in_flight = Arc::new(InFlight::default());
        let worker = RemoteWorker {
            in_flight: Arc::clone(&in_flight),
            remote: Arc::clone(&remote),
            remote_ttl: config.remote_ttl,
            remote_timeout: config.remote_timeout,
        };
        let pool = WorkerPool::new(config.workers, config.queue_size, worker);

        Self {
            local,
            remote,
            remote_timeout: config.remote_timeout,
            in_flight,
            pool,
        }
    }

    // == Submit ==
    /// Applies `task` to the local cache now and queues the remote half.
    ///
    /// The returned handle yields exactly one result. If the synchronizer is
    /// shutting down the remote half is not run and the handle reports
    /// [`SyncError::Rejected`]; the local mutation has still been applied.
    /// Waits only when the queue is full.
    pub async fn submit(&self, task: CacheTask) -> SyncHandle {
        let (tx, rx) = oneshot::channel();
        let profile_id = task.profile_id().to_string();
        let kind = task.kind();
        let key = profile_key(&profile_id);

        self.in_flight.begin(&key);
        let local_applied = self.apply_local(&task);
        let job = RemoteJob {
            action: RemoteAction::for_task(task),
            local_applied,
            reply: tx,
        };

        if let Err(rejected) = self.pool.submit(job).await {
            warn!(
                profile_id = %profile_id,
                op = kind,
                reason = %rejected.reason,
                "Remote cache sync rejected"
            );
            self.in_flight.finish(&key);
            let _ = rejected.task.reply.send(Err(rejected.reason.into()));
        }

        SyncHandle::new(rx)
    }

    fn apply_local(&self, task: &CacheTask) -> bool {
        match task {
            CacheTask::Set(profile) => {
                self.local.set(profile.clone());
                true
            }
            CacheTask::Update {
                profile_id,
                order_id,
                value,
            } => self
                .local
                .update_order(profile_id, order_id, value.clone())
                .is_some(),
            CacheTask::AddOrder { profile_id, order } => {
                self.local.add_order(profile_id, order.clone()).is_some()
            }
            CacheTask::RemoveOrder {
                profile_id,
                order_id,
            } => self.local.remove_order(profile_id, order_id).is_some(),
            CacheTask::Delete { profile_id } => self.local.delete(profile_id),
        }
    }

    // == Read Through ==
    /// Local first, then the remote tier; a remote hit repopulates local.
    ///
    /// While remote work for the profile is still queued the remote copy is
    /// stale, so the read stops at the local tier. A remote copy fetched while
    /// a submit touched the profile is not written back; the current local
    /// state is returned instead. Remote failures are logged and treated as a
    /// miss.
    pub async fn get(&self, profile_id: &str) -> Option<Profile> {
        if let Some(profile) = self.local.get(profile_id) {
            return Some(profile);
        }

        let key = profile_key(profile_id);
        let Some(generation) = self.in_flight.start_read(&key) else {
            debug!(key = %key, "Remote work pending, skipping read-through");
            return None;
        };

        let profile = match self.fetch_remote(&key).await {
            Some(profile) => profile,
            None => {
                self.in_flight.abandon_read(&key);
                return None;
            }
        };

        let filled = self
            .in_flight
            .finish_read(&key, generation, || self.local.set(profile.clone()));
        if filled {
            debug!(key = %key, "Local cache repopulated from remote");
            Some(profile)
        } else {
            debug!(key = %key, "Profile changed during read-through, discarding remote copy");
            self.local.get(profile_id)
        }
    }

    async fn fetch_remote(&self, key: &str) -> Option<Profile> {
        let bytes = match timeout(self.remote_timeout, self.remote.get(key)).await {
            Ok(Ok(Some(bytes))) => bytes,
            Ok(Ok(None)) => return None,
            Ok(Err(e)) => {
                warn!(key = %key, error = %e, "Remote read failed, treating as miss");
                return None;
            }
            Err(_) => {
                warn!(key = %key, timeout = ?self.remote_timeout, "Remote read timed out");
                return None;
            }
        };

        match serde_json::from_slice::<Profile>(&bytes) {
            Ok(profile) => Some(profile),
            Err(e) => {
                warn!(key = %key, error = %e, "Undecodable remote profile");
                None
            }
        }
    }

    /// The local tier.
    pub fn local(&self) -> &Arc<ProfileCache> {
        &self.local
    }

    /// Remote jobs waiting for a worker.
    pub fn pending(&self) -> usize {
        self.pool.queued()
    }

    // == Shutdown ==
    /// Stops taking remote work and waits until everything queued has run.
    ///
    /// Does not shut down the local cache, which may be shared.
    pub async fn shutdown(&self) {
        self.pool.shutdown().await;
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ProfileCacheConfig;
    use crate::clock::{Clock, ManualClock, SharedClock};
    use crate::error::PoolError;
    use crate::models::Order;
    use crate::sync::remote::{InMemoryRemoteStore, RemoteStore};
    use serde_json::json;

    struct Fixture {
        sync: CacheSynchronizer,
        remote: Arc<InMemoryRemoteStore>,
        clock: Arc<ManualClock>,
    }

    fn fixture() -> Fixture {
        let clock = Arc::new(ManualClock::new());
        let shared: SharedClock = clock.clone();
        let local = Arc::new(ProfileCache::new(
            ProfileCacheConfig {
                capacity: 100,
                ttl: Duration::from_secs(60),
                cleanup_interval: Duration::from_secs(3600),
            },
            shared.clone(),
        ));
        let remote = Arc::new(InMemoryRemoteStore::new(shared));
        let sync = CacheSynchronizer::new(
            local,
            remote.clone(),
            SyncConfig {
                workers: 2,
                queue_size: 16,
                remote_ttl: Duration::from_secs(600),
                remote_timeout: Duration::from_millis(200),
            },
        );
        Fixture {
            sync,
            remote,
            clock,
        }
    }

    fn profile(clock: &ManualClock) -> Profile {
        Profile::new("p1", "gold").with_orders(vec![Order::new("o1", json!(1), clock.utc_now())])
    }

    #[tokio::test]
    async fn test_set_writes_both_tiers() {
        let f = fixture();
        let profile = profile(&f.clock);

        let report = f
            .sync
            .submit(CacheTask::Set(profile.clone()))
            .await
            .outcome()
            .await
            .unwrap();
        assert!(report.local_applied);

        assert_eq!(f.sync.local().get("p1"), Some(profile.clone()));
        let bytes = f.remote.get("profile:p1").await.unwrap().unwrap();
        assert_eq!(serde_json::from_slice::<Profile>(&bytes).unwrap(), profile);
        assert_eq!(f.remote.ttl("profile:p1").await, Some(Duration::from_secs(600)));
    }

    #[tokio::test]
    async fn test_local_write_visible_before_remote_completes() {
        let f = fixture();
        f.remote.set_latency(Some(Duration::from_millis(50)));

        let handle = f.sync.submit(CacheTask::Set(profile(&f.clock))).await;
        assert!(f.sync.local().get("p1").is_some());
        assert!(f.remote.is_empty().await);

        handle.outcome().await.unwrap();
        assert!(!f.remote.is_empty().await);
    }

    #[tokio::test]
    async fn test_update_invalidates_remote() {
        let f = fixture();
        f.sync
            .submit(CacheTask::Set(profile(&f.clock)))
            .await
            .outcome()
            .await
            .unwrap();

        let report = f
            .sync
            .submit(CacheTask::Update {
                profile_id: "p1".into(),
                order_id: "o1".into(),
                value: json!("shipped"),
            })
            .await
            .outcome()
            .await
            .unwrap();

        assert!(report.local_applied);
        let local = f.sync.local().get("p1").unwrap();
        assert_eq!(local.order("o1").unwrap().value, json!("shipped"));
        assert_eq!(f.remote.get("profile:p1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_update_of_uncached_profile_still_invalidates_remote() {
        let f = fixture();
        f.remote
            .set("profile:p1", b"{}".to_vec(), Duration::from_secs(60))
            .await
            .unwrap();

        let report = f
            .sync
            .submit(CacheTask::RemoveOrder {
                profile_id: "p1".into(),
                order_id: "o1".into(),
            })
            .await
            .outcome()
            .await
            .unwrap();

        assert!(!report.local_applied);
        assert!(f.sync.local().is_empty());
        assert!(f.remote.is_empty().await);
    }

    #[tokio::test]
    async fn test_delete_removes_both_tiers() {
        let f = fixture();
        f.sync
            .submit(CacheTask::Set(profile(&f.clock)))
            .await
            .outcome()
            .await
            .unwrap();

        f.sync
            .submit(CacheTask::Delete {
                profile_id: "p1".into(),
            })
            .await
            .outcome()
            .await
            .unwrap();

        assert!(f.sync.local().get("p1").is_none());
        assert!(f.remote.is_empty().await);
    }

    #[tokio::test]
    async fn test_remote_failure_keeps_local_mutation() {
        let f = fixture();
        f.remote.set_available(false);

        let outcome = f
            .sync
            .submit(CacheTask::Set(profile(&f.clock)))
            .await
            .outcome()
            .await;

        assert!(matches!(
            outcome,
            Err(SyncError::Remote(RemoteError::Unavailable(_)))
        ));
        assert!(f.sync.local().get("p1").is_some());
    }

    #[tokio::test]
    async fn test_slow_remote_times_out() {
        let f = fixture();
        f.remote.set_latency(Some(Duration::from_secs(5)));

        let outcome = f
            .sync
            .submit(CacheTask::Delete {
                profile_id: "p1".into(),
            })
            .await
            .outcome()
            .await;

        assert!(matches!(outcome, Err(SyncError::Timeout(_))));
    }

    #[tokio::test]
    async fn test_submit_after_shutdown_reports_rejection() {
        let f = fixture();
        f.sync.shutdown().await;

        let outcome = f
            .sync
            .submit(CacheTask::Set(profile(&f.clock)))
            .await
            .outcome()
            .await;

        assert!(matches!(
            outcome,
            Err(SyncError::Rejected(PoolError::ShuttingDown))
        ));
        assert!(f.sync.local().get("p1").is_some());
        assert!(f.remote.is_empty().await);
    }

    #[tokio::test]
    async fn test_read_through_repopulates_local() {
        let f = fixture();
        let profile = profile(&f.clock);
        f.remote
            .set(
                "profile:p1",
                serde_json::to_vec(&profile).unwrap(),
                Duration::from_secs(60),
            )
            .await
            .unwrap();

        assert!(f.sync.local().get("p1").is_none());
        assert_eq!(f.sync.get("p1").await, Some(profile.clone()));
        assert_eq!(f.sync.local().get("p1"), Some(profile));
    }

    #[tokio::test]
    async fn test_read_through_treats_remote_errors_as_miss() {
        let f = fixture();
        f.remote
            .set("profile:p1", b"garbage".to_vec(), Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(f.sync.get("p1").await, None);

        f.remote.set_available(false);
        assert_eq!(f.sync.get("p2").await, None);
    }

    #[tokio::test]
    async fn test_read_after_delete_does_not_resurrect_profile() {
        let f = fixture();
        f.sync
            .submit(CacheTask::Set(profile(&f.clock)))
            .await
            .outcome()
            .await
            .unwrap();
        f.remote.set_latency(Some(Duration::from_millis(50)));

        let handle = f
            .sync
            .submit(CacheTask::Delete {
                profile_id: "p1".into(),
            })
            .await;

        // Remote still holds the old copy here
        assert_eq!(f.sync.get("p1").await, None);
        assert!(f.sync.local().get("p1").is_none());

        handle.outcome().await.unwrap();
        assert!(f.remote.is_empty().await);
        assert!(f.sync.local().get("p1").is_none());
        assert_eq!(f.sync.in_flight.tracked(), 0);
    }

    #[tokio::test]
    async fn test_read_after_invalidate_of_uncached_profile_skips_stale_copy() {
        let f = fixture();
        f.sync
            .submit(CacheTask::Set(profile(&f.clock)))
            .await
            .outcome()
            .await
            .unwrap();
        // Simulate an eviction so only the remote copy is left
        f.sync.local().delete("p1");
        f.remote.set_latency(Some(Duration::from_millis(50)));

        let handle = f
            .sync
            .submit(CacheTask::AddOrder {
                profile_id: "p1".into(),
                order: Order::new("o2", json!(2), f.clock.utc_now()),
            })
            .await;

        assert_eq!(f.sync.get("p1").await, None);
        handle.outcome().await.unwrap();

        assert!(f.sync.local().get("p1").is_none());
        assert_eq!(f.sync.get("p1").await, None);
    }

    #[tokio::test]
    async fn test_delete_during_read_through_discards_remote_copy() {
        let f = fixture();
        f.sync
            .submit(CacheTask::Set(profile(&f.clock)))
            .await
            .outcome()
            .await
            .unwrap();
        f.sync.local().delete("p1");
        f.remote.set_latency(Some(Duration::from_millis(50)));

        let (read, handle) = tokio::join!(f.sync.get("p1"), async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            f.sync
                .submit(CacheTask::Delete {
                    profile_id: "p1".into(),
                })
                .await
        });

        assert_eq!(read, None);
        handle.outcome().await.unwrap();
        assert!(f.sync.local().get("p1").is_none());
        assert!(f.remote.is_empty().await);
        assert_eq!(f.sync.in_flight.tracked(), 0);
    }

    #[tokio::test]
    async fn test_read_through_resumes_once_remote_work_settles() {
        let f = fixture();
        let profile = profile(&f.clock);
        f.sync
            .submit(CacheTask::Set(profile.clone()))
            .await
            .outcome()
            .await
            .unwrap();
        f.sync.local().delete("p1");

        assert_eq!(f.sync.get("p1").await, Some(profile.clone()));
        assert_eq!(f.sync.local().get("p1"), Some(profile));
        assert_eq!(f.sync.in_flight.tracked(), 0);
    }

    #[tokio::test]
    async fn test_unread_handles_do_not_block_workers() {
        let f = fixture();
        for i in 0..40 {
            let profile = Profile::new(format!("p{i}"), "x");
            drop(f.sync.submit(CacheTask::Set(profile)).await);
        }
        f.sync.shutdown().await;

        assert_eq!(f.remote.len().await, 40);
        assert_eq!(f.sync.pending(), 0);
    }
}
