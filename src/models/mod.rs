//! Domain models held by the cache layer
//!
//! The profile aggregate and its nested orders, shared by the local cache
//! and the remote tier.

pub mod profile;

// Re-export commonly used types
pub use profile::{Order, Profile};
