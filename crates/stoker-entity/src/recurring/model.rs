//! Recurring definition entity model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::job::action::ActionInvocation;

/// A named template that materializes jobs on a cron schedule.
///
/// The id is caller-chosen and unique; registering a definition under an
/// existing id replaces schedule and template wholesale without touching
/// jobs already materialized from the old definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecurringDefinition {
    /// Caller-chosen unique key (e.g., `"cleanup-sessions"`).
    pub id: String,
    /// Action template used to materialize job instances.
    pub action: ActionInvocation,
    /// Queue the materialized jobs enter.
    pub queue: String,
    /// Cron expression with seconds: `sec min hour day-of-month month
    /// day-of-week`.
    pub cron: String,
    /// Retry limit stamped onto materialized jobs.
    pub max_retries: u32,
    /// Next computed fire time; advanced atomically at every firing.
    pub next_due_at: DateTime<Utc>,
    /// When the definition last fired.
    pub last_fired_at: Option<DateTime<Utc>>,
    /// When the definition was first registered.
    pub created_at: DateTime<Utc>,
    /// When the definition was last registered or fired.
    pub updated_at: DateTime<Utc>,
}

impl RecurringDefinition {
    /// Create a definition ready for registration.
    pub fn new(
        id: impl Into<String>,
        action: ActionInvocation,
        queue: impl Into<String>,
        cron: impl Into<String>,
        max_retries: u32,
        next_due_at: DateTime<Utc>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            action,
            queue: queue.into(),
            cron: cron.into(),
            max_retries,
            next_due_at,
            last_fired_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Check whether this definition is due at `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.next_due_at <= now
    }
}
