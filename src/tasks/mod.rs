//! Background Tasks Module
//!
//! Contains the background machinery the caches and limiters run on.
//!
//! # Tasks
//! - Periodic timers: TTL sweeps and rate-limit window resets
//! - Worker pool: bounded queue drained by a fixed set of workers

mod periodic;
mod pool;

pub use periodic::PeriodicTask;
pub use pool::{Rejected, TaskHandler, WorkerPool};
