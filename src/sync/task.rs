//! Cache-sync tasks and their result handles.

use serde_json::Value;
use tokio::sync::oneshot;

use crate::error::{SyncError, SyncResult};
use crate::models::{Order, Profile};
use crate::sync::remote::profile_key;

// == Cache Task ==
/// A cache mutation intent, usually submitted right after a database write.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheTask {
    /// Replace the whole profile
    Set(Profile),
    /// Replace one nested order's value
    Update {
        profile_id: String,
        order_id: String,
        value: Value,
    },
    /// Append a nested order
    AddOrder { profile_id: String, order: Order },
    /// Drop a nested order
    RemoveOrder {
        profile_id: String,
        order_id: String,
    },
    /// Drop the profile
    Delete { profile_id: String },
}

impl CacheTask {
    pub fn profile_id(&self) -> &str {
        match self {
            Self::Set(profile) => &profile.id,
            Self::Update { profile_id, .. }
            | Self::AddOrder { profile_id, .. }
            | Self::RemoveOrder { profile_id, .. }
            | Self::Delete { profile_id } => profile_id,
        }
    }

    /// Short operation name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Set(_) => "set",
            Self::Update { .. } => "update",
            Self::AddOrder { .. } => "add_order",
            Self::RemoveOrder { .. } => "remove_order",
            Self::Delete { .. } => "delete",
        }
    }
}

// == Remote Action ==
/// What the remote tier has to do for a task once the local side is done.
///
/// Nested mutations never patch the remote blob; they invalidate it so the
/// next read-through repopulates it whole.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum RemoteAction {
    Write { key: String, profile: Profile },
    Invalidate { key: String },
}

impl RemoteAction {
    pub(crate) fn for_task(task: CacheTask) -> Self {
        match task {
            CacheTask::Set(profile) => Self::Write {
                key: profile_key(&profile.id),
                profile,
            },
            other => Self::Invalidate {
                key: profile_key(other.profile_id()),
            },
        }
    }

    pub(crate) fn key(&self) -> &str {
        match self {
            Self::Write { key, .. } | Self::Invalidate { key } => key,
        }
    }

    pub(crate) fn kind(&self) -> &'static str {
        match self {
            Self::Write { .. } => "write",
            Self::Invalidate { .. } => "invalidate",
        }
    }
}

// == Sync Report ==
/// Successful outcome of a cache-sync task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncReport {
    /// Whether the local cache changed. False when a nested mutation found no
    /// live profile or no matching order.
    pub local_applied: bool,
}

/// Queued unit of remote work plus the channel its result goes to.
#[derive(Debug)]
pub(crate) struct RemoteJob {
    pub(crate) action: RemoteAction,
    pub(crate) local_applied: bool,
    pub(crate) reply: oneshot::Sender<SyncResult<SyncReport>>,
}

// == Sync Handle ==
/// Receives exactly one result for a submitted task.
///
/// Dropping the handle unread is fine; the worker does not wait for it.
#[derive(Debug)]
pub struct SyncHandle {
    rx: oneshot::Receiver<SyncResult<SyncReport>>,
}

impl SyncHandle {
    pub(crate) fn new(rx: oneshot::Receiver<SyncResult<SyncReport>>) -> Self {
        Self { rx }
    }

    /// Waits for the task to finish on both tiers.
    pub async fn outcome(self) -> SyncResult<SyncReport> {
        self.rx.await.unwrap_or_else(|_| {
            Err(SyncError::WorkerFailed(
                "task ended without reporting a result".to_string(),
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_set_becomes_remote_write() {
        let profile = Profile::new("7", "gold");
        let action = RemoteAction::for_task(CacheTask::Set(profile.clone()));

        assert_eq!(
            action,
            RemoteAction::Write {
                key: "profile:7".to_string(),
                profile
            }
        );
        assert_eq!(action.kind(), "write");
    }

    #[test]
    fn test_nested_mutations_become_invalidations() {
        let tasks = vec![
            CacheTask::Update {
                profile_id: "7".into(),
                order_id: "o1".into(),
                value: json!(1),
            },
            CacheTask::RemoveOrder {
                profile_id: "7".into(),
                order_id: "o1".into(),
            },
            CacheTask::Delete {
                profile_id: "7".into(),
            },
        ];

        for task in tasks {
            let action = RemoteAction::for_task(task);
            assert_eq!(action.key(), "profile:7");
            assert_eq!(action.kind(), "invalidate");
        }
    }

    #[tokio::test]
    async fn test_handle_reports_dropped_sender() {
        let (tx, rx) = oneshot::channel();
        drop(tx);

        let outcome = SyncHandle::new(rx).outcome().await;
        assert!(matches!(outcome, Err(SyncError::WorkerFailed(_))));
    }
}
