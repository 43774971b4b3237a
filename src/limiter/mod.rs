//! Limiter Module
//!
//! Admission control: fixed-window counters, alone or one per caller key.

mod fixed_window;
mod multi_key;

pub use fixed_window::{FixedWindowLimiter, DEFAULT_INTERVAL};
pub use multi_key::MultiKeyLimiter;
