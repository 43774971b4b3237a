//! Error types for the cache layer
//!
//! Provides unified error handling using thiserror. Cache misses are not
//! errors and never appear here; they are plain `None` results.

use std::time::Duration;

use thiserror::Error;

// == Rate Limit Error ==
/// Returned by the limiters when the current window's budget is spent.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RateLimitError {
    /// No budget left in the current window; the action was not invoked
    #[error("Rate limit exceeded: {limit} operations per {interval:?}")]
    Exceeded { limit: u32, interval: Duration },
}

// == Pool Error ==
/// Why the worker pool refused a task.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    /// Shutdown has started; the task was not queued
    #[error("Worker pool is shutting down")]
    ShuttingDown,

    /// The bounded queue is full (non-blocking submission only)
    #[error("Worker pool queue is full")]
    QueueFull,
}

// == Remote Error ==
/// Failures talking to the remote cache tier.
#[derive(Error, Debug)]
pub enum RemoteError {
    /// Connection refused, backend down, or any transport-level failure
    #[error("Remote store unavailable: {0}")]
    Unavailable(String),

    /// Payload could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

// == Sync Error ==
/// Outcome of a failed cache-sync task, delivered on its result channel.
///
/// By the time any of these is reported the local mutation has already been
/// applied; only the remote tier is affected.
#[derive(Error, Debug)]
pub enum SyncError {
    /// The remote call itself failed
    #[error("Remote tier error: {0}")]
    Remote(#[from] RemoteError),

    /// The remote call did not complete in time
    #[error("Remote tier timed out after {0:?}")]
    Timeout(Duration),

    /// The task never reached a worker
    #[error("Task rejected: {0}")]
    Rejected(#[from] PoolError),

    /// The worker running the task panicked or was cancelled
    #[error("Worker failed: {0}")]
    WorkerFailed(String),
}

// == Result Type Aliases ==
/// Convenience Result type for remote-store calls.
pub type RemoteResult<T> = std::result::Result<T, RemoteError>;

/// Convenience Result type for cache-sync tasks.
pub type SyncResult<T> = std::result::Result<T, SyncError>;
