//! Action registry — dispatches job actions to registered handlers.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing;

use stoker_core::error::AppError;
use stoker_entity::job::ActionInvocation;

/// Trait for action handler implementations.
///
/// The engine never inspects action arguments; it hands the serialized
/// payload to the handler registered under the action's name.
#[async_trait]
pub trait ActionHandler: Send + Sync + std::fmt::Debug {
    /// Get the action name this handler processes.
    fn name(&self) -> &str;

    /// Execute the action with the given arguments.
    async fn run(&self, args: &Value) -> Result<Option<Value>, ExecutionError>;
}

/// Error from action execution.
#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    /// Permanent failure — do not retry
    #[error("Permanent action failure: {0}")]
    Permanent(String),

    /// Transient failure — may retry
    #[error("Transient action failure: {0}")]
    Transient(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(#[from] AppError),
}

/// Dispatches action invocations to the appropriate handler by name.
#[derive(Debug)]
pub struct ActionRegistry {
    /// Registered handlers by action name.
    handlers: HashMap<String, Arc<dyn ActionHandler>>,
}

impl ActionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register an action handler.
    pub fn register(&mut self, handler: Arc<dyn ActionHandler>) {
        let name = handler.name().to_string();
        tracing::info!("Registered handler for action '{}'", name);
        self.handlers.insert(name, handler);
    }

    /// Execute an invocation by dispatching to the handler registered
    /// under its action name.
    pub async fn run(&self, action: &ActionInvocation) -> Result<Option<Value>, ExecutionError> {
        let handler = self.handlers.get(&action.name).ok_or_else(|| {
            ExecutionError::Permanent(format!(
                "No handler registered for action '{}'",
                action.name
            ))
        })?;

        handler.run(&action.args).await
    }

    /// Check if a handler is registered for an action name.
    pub fn has_handler(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Get the list of registered action names.
    pub fn registered_names(&self) -> Vec<String> {
        self.handlers.keys().cloned().collect()
    }
}

impl Default for ActionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
