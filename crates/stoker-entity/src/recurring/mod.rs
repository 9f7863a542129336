//! Recurring job definition entities.

pub mod model;

pub use model::RecurringDefinition;
