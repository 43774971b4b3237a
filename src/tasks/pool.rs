//! Worker Pool
//!
//! Fixed number of long-running workers pulling tasks from one bounded queue.
//!
//! Delivery is at-most-once: a task is either accepted (and then runs to
//! completion, even across shutdown) or handed back to the caller inside a
//! [`Rejected`]. Nothing is dropped silently.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::PoolError;

// == Task Handler ==
/// Executes one task. Implemented for any `Fn(T) -> impl Future<Output = ()>`.
///
/// Handlers report their own failures; a panic is caught by the pool and
/// logged without taking the worker down.
#[async_trait]
pub trait TaskHandler<T: Send + 'static>: Send + Sync + 'static {
    async fn handle(&self, task: T);
}

#[async_trait]
impl<T, F, Fut> TaskHandler<T> for F
where
    T: Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    async fn handle(&self, task: T) {
        (self)(task).await
    }
}

// == Rejected ==
/// A task the pool refused, returned to the caller together with the reason.
#[derive(Debug)]
pub struct Rejected<T> {
    pub task: T,
    pub reason: PoolError,
}

// == Worker Pool ==
/// A fixed set of workers draining one bounded queue of `T`.
pub struct WorkerPool<T> {
    sender: RwLock<Option<mpsc::Sender<T>>>,
    /// Held across the drain so every `shutdown` caller waits for it
    workers: tokio::sync::Mutex<Vec<JoinHandle<()>>>,
    size: usize,
    queue_size: usize,
}

impl<T: Send + 'static> WorkerPool<T> {
    // == Constructor ==
    /// Starts `workers` consumers sharing a queue of `queue_size` slots.
    ///
    /// Zero for either argument is raised to 1. Must be called from within a
    /// tokio runtime.
    pub fn new<H>(workers: usize, queue_size: usize, handler: H) -> Self
    where
        H: TaskHandler<T>,
    {
        let size = if workers == 0 {
            warn!("Worker pool size of 0 raised to 1");
            1
        } else {
            workers
        };
        let queue_size = queue_size.max(1);

        let (tx, rx) = mpsc::channel(queue_size);
        let rx = Arc::new(tokio::sync::Mutex::new(rx));
        let handler: Arc<dyn TaskHandler<T>> = Arc::new(handler);

        let workers = (0..size)
            .map(|id| tokio::spawn(run_worker(id, Arc::clone(&rx), Arc::clone(&handler))))
            .collect();

        info!(workers = size, queue_size, "Worker pool started");

        Self {
            sender: RwLock::new(Some(tx)),
            workers: tokio::sync::Mutex::new(workers),
            size,
            queue_size,
        }
    }

    // == Submit ==
    /// Queues a task, waiting for a free slot if the queue is full.
    pub async fn submit(&self, task: T) -> Result<(), Rejected<T>> {
        let sender = self.sender.read().clone();
        let Some(sender) = sender else {
            return Err(Rejected {
                task,
                reason: PoolError::ShuttingDown,
            });
        };

        sender.send(task).await.map_err(|e| Rejected {
            task: e.0,
            reason: PoolError::ShuttingDown,
        })
    }

    // == Try Submit ==
    /// Queues a task without waiting; a full queue is a rejection.
    pub fn try_submit(&self, task: T) -> Result<(), Rejected<T>> {
        let guard = self.sender.read();
        let Some(sender) = guard.as_ref() else {
            return Err(Rejected {
                task,
                reason: PoolError::ShuttingDown,
            });
        };

        sender.try_send(task).map_err(|e| match e {
            TrySendError::Full(task) => Rejected {
                task,
                reason: PoolError::QueueFull,
            },
            TrySendError::Closed(task) => Rejected {
                task,
                reason: PoolError::ShuttingDown,
            },
        })
    }

    // == Shutdown ==
    /// Stops accepting tasks, drains the queue, and waits for every worker to exit.
    ///
    /// Tasks already running are never interrupted. Safe to call more than
    /// once or concurrently; every call returns only after the drain is done.
    pub async fn shutdown(&self) {
        if let Some(sender) = self.sender.write().take() {
            drop(sender);
            debug!(workers = self.size, "Worker pool closed, draining");
        }

        let mut workers = self.workers.lock().await;
        if workers.is_empty() {
            return;
        }

        // Pop only after a join completes so a cancelled caller leaves the rest
        while let Some(handle) = workers.last_mut() {
            if let Err(e) = handle.await {
                error!(error = %e, "Worker exited abnormally");
            }
            workers.pop();
        }

        info!(workers = self.size, "Worker pool drained and stopped");
    }

    /// Number of workers.
    pub fn workers(&self) -> usize {
        self.size
    }

    /// Tasks waiting in the queue, not counting ones being executed.
    pub fn queued(&self) -> usize {
        self.sender
            .read()
            .as_ref()
            .map(|s| self.queue_size - s.capacity())
            .unwrap_or(0)
    }

    pub fn is_shutting_down(&self) -> bool {
        self.sender.read().is_none()
    }
}

impl<T> fmt::Debug for WorkerPool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerPool")
            .field("workers", &self.size)
            .field("queue_size", &self.queue_size)
            .field("shutting_down", &self.sender.read().is_none())
            .finish()
    }
}

async fn run_worker<T: Send + 'static>(
    id: usize,
    queue: Arc<tokio::sync::Mutex<mpsc::Receiver<T>>>,
    handler: Arc<dyn TaskHandler<T>>,
) {
    loop {
        let next = { queue.lock().await.recv().await };
        let Some(task) = next else { break };

        // Run on its own task so a panic is contained here
        let handler = Arc::clone(&handler);
        if let Err(e) = tokio::spawn(async move { handler.handle(task).await }).await {
            error!(worker = id, error = %e, "Task panicked");
        }
    }

    debug!(worker = id, "Worker exiting");
}
