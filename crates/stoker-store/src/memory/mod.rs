//! In-memory job store implementation.

pub mod store;

pub use store::MemoryJobStore;
