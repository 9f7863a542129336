//! # stoker-store
//!
//! The job store contract and its in-memory implementation. The store is
//! the single source of truth for job, recurring-definition, and
//! continuation-edge state; every other engine component reads and writes
//! through the [`JobStore`] trait.
//!
//! All job mutation goes through compare-and-swap keyed on the job's
//! `version` field. A durable backend is a second implementation of the
//! same trait; [`memory::MemoryJobStore`] is the non-durable default.

pub mod memory;
pub mod store;

pub use memory::MemoryJobStore;
pub use store::{JobStore, JobUpdate};
