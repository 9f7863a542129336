//! Continuation (parent/child dependency) entities.

pub mod model;

pub use model::{ContinuationCondition, ContinuationEdge};
