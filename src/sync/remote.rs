//! Remote cache tier
//!
//! The shared key/value backend behind the local cache. Only the interface
//! lives here plus an in-process implementation used by the binary and tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::RwLock;

use crate::clock::SharedClock;
use crate::error::{RemoteError, RemoteResult};

/// Remote key for a profile id.
pub fn profile_key(profile_id: &str) -> String {
    format!("profile:{profile_id}")
}

// == Remote Store ==
/// A shared key/value store with per-key TTL.
///
/// Each call is independent; there are no multi-key transactions.
#[async_trait]
pub trait RemoteStore: Send + Sync + 'static {
    /// Returns the stored bytes, or `None` if absent or expired.
    async fn get(&self, key: &str) -> RemoteResult<Option<Vec<u8>>>;

    /// Stores `value` under `key`, expiring after `ttl`.
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> RemoteResult<()>;

    /// Deletes the given keys. Returns how many existed.
    async fn delete(&self, keys: &[String]) -> RemoteResult<u64>;
}

/// Shared remote store handle.
pub type SharedRemote = Arc<dyn RemoteStore>;

// == In-Memory Remote Store ==
#[derive(Debug)]
struct StoredValue {
    bytes: Vec<u8>,
    expires_at: Instant,
}

/// In-process [`RemoteStore`] with TTL handling and fault injection.
#[derive(Debug)]
pub struct InMemoryRemoteStore {
    entries: RwLock<HashMap<String, StoredValue>>,
    clock: SharedClock,
    available: AtomicBool,
    latency: Mutex<Option<Duration>>,
}

impl InMemoryRemoteStore {
    pub fn new(clock: SharedClock) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            clock,
            available: AtomicBool::new(true),
            latency: Mutex::new(None),
        }
    }

    /// When false, every call fails with [`RemoteError::Unavailable`].
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Adds an artificial delay before every call.
    pub fn set_latency(&self, latency: Option<Duration>) {
        *self.latency.lock() = latency;
    }

    /// Number of stored keys, expired ones included.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Remaining TTL of a stored key.
    pub async fn ttl(&self, key: &str) -> Option<Duration> {
        let now = self.clock.now();
        self.entries
            .read()
            .await
            .get(key)
            .filter(|v| v.expires_at >= now)
            .map(|v| v.expires_at.saturating_duration_since(now))
    }

    async fn before_call(&self) -> RemoteResult<()> {
        let latency = *self.latency.lock();
        if let Some(delay) = latency {
            tokio::time::sleep(delay).await;
        }
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(RemoteError::Unavailable("connection refused".to_string()))
        }
    }
}

#[async_trait]
impl RemoteStore for InMemoryRemoteStore {
    async fn get(&self, key: &str) -> RemoteResult<Option<Vec<u8>>> {
        self.before_call().await?;
        let now = self.clock.now();

        let mut entries = self.entries.write().await;
        match entries.get(key) {
            Some(v) if v.expires_at >= now => Ok(Some(v.bytes.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> RemoteResult<()> {
        self.before_call().await?;
        let expires_at = self.clock.now() + ttl;
        self.entries.write().await.insert(
            key.to_string(),
            StoredValue {
                bytes: value,
                expires_at,
            },
        );
        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> RemoteResult<u64> {
        self.before_call().await?;
        let mut entries = self.entries.write().await;
        let removed = keys.iter().filter(|k| entries.remove(*k).is_some()).count();
        Ok(removed as u64)
    }
}
