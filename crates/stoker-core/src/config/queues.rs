//! Queue set configuration.

use serde::{Deserialize, Serialize};

/// Named queues and their priority order.
///
/// Order is significant: the first name is the highest-priority queue and
/// the dispatcher always serves non-empty queues in this order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuesConfig {
    /// Queue names, highest priority first.
    #[serde(default = "default_names")]
    pub names: Vec<String>,
}

impl QueuesConfig {
    /// Check whether a queue name is configured.
    pub fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    /// The queue used when a submission does not name one.
    ///
    /// Prefers a queue literally named `"default"`; otherwise falls back to
    /// the lowest-priority configured queue.
    pub fn default_queue(&self) -> &str {
        self.names
            .iter()
            .find(|n| n.as_str() == "default")
            .or_else(|| self.names.last())
            .map(String::as_str)
            .unwrap_or("default")
    }
}

impl Default for QueuesConfig {
    fn default() -> Self {
        Self {
            names: default_names(),
        }
    }
}

fn default_names() -> Vec<String> {
    vec!["critical".to_string(), "default".to_string()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_queue_prefers_literal_default() {
        let config = QueuesConfig::default();
        assert_eq!(config.default_queue(), "default");
    }

    #[test]
    fn test_default_queue_falls_back_to_lowest_priority() {
        let config = QueuesConfig {
            names: vec!["urgent".into(), "bulk".into()],
        };
        assert_eq!(config.default_queue(), "bulk");
    }

    #[test]
    fn test_contains() {
        let config = QueuesConfig::default();
        assert!(config.contains("critical"));
        assert!(!config.contains("bulk"));
    }
}
