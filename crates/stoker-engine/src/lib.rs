//! Background job processing engine for Stoker.
//!
//! This crate provides:
//! - A registry that maps action names to handler implementations
//! - A priority dispatcher that serves queued jobs to idle workers
//! - A time-delay scheduler that promotes due jobs into their queues
//! - A recurring trigger that materializes jobs from cron definitions
//! - A continuation graph that releases children on parent outcomes
//! - A fixed-size worker pool with retry, backoff, and timeout handling
//! - A client facade for submitting and managing jobs
//!
//! [`Engine::start`] wires all of it together on top of a [`JobStore`]
//! implementation and hands back a handle for clients and shutdown.
//!
//! [`JobStore`]: stoker_store::JobStore

pub mod client;
pub mod continuation;
pub mod dispatcher;
pub mod engine;
pub mod logging;
pub mod pool;
pub mod registry;
pub mod retention;
pub mod scheduler;
pub mod trigger;

pub use client::{JobClient, StateCounts};
pub use engine::Engine;
pub use registry::{ActionHandler, ActionRegistry, ExecutionError};
