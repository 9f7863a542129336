//! Background job domain entities.

pub mod action;
pub mod model;
pub mod state;

pub use action::ActionInvocation;
pub use model::Job;
pub use state::JobState;
