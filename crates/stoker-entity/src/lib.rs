//! # stoker-entity
//!
//! Domain entity models for Stoker. Every struct in this crate represents
//! a job store record or a domain value object. All entities derive
//! `Debug`, `Clone`, `Serialize`, and `Deserialize`.

pub mod continuation;
pub mod job;
pub mod recurring;
