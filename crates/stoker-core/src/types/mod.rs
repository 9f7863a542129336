//! Shared value types used across Stoker crates.

pub mod id;

pub use id::JobId;
