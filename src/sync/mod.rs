//! Sync Module
//!
//! Asynchronous propagation of cache mutations from the local profile cache
//! to the remote tier.
//!
//! # Components
//! - Remote store interface plus an in-process implementation
//! - Cache tasks and their result handles
//! - The synchronizer that applies tasks to both tiers

mod remote;
mod synchronizer;
mod task;

pub use remote::{profile_key, InMemoryRemoteStore, RemoteStore, SharedRemote};
pub use synchronizer::{CacheSynchronizer, SyncConfig};
pub use task::{CacheTask, SyncHandle, SyncReport};
