//! Action invocation value object.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A reference to a registered action handler plus its arguments.
///
/// The engine never interprets the arguments; they are carried as an
/// opaque JSON payload and handed to the handler registered under `name`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionInvocation {
    /// Name of the registered handler (e.g., `"email.send"`).
    pub name: String,
    /// Handler arguments as JSON.
    pub args: Value,
}

impl ActionInvocation {
    /// Create a new invocation.
    pub fn new(name: impl Into<String>, args: Value) -> Self {
        Self {
            name: name.into(),
            args,
        }
    }

    /// Create an invocation with no arguments.
    pub fn named(name: impl Into<String>) -> Self {
        Self::new(name, Value::Null)
    }
}
