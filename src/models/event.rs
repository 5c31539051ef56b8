//! Activity-log events

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::UserId;

/// Identifier the host assigns to an ingested log entry
pub type EventId = i64;

/// One context/action pair recorded with an event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextEntry {
    pub context: String,
    pub action: String,
}

/// A recorded activity-log entry
///
/// The first entry of `contexts` is the primary one; `context` and `action`
/// triggers only look at it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub object_id: Option<i64>,
    #[serde(default)]
    pub author: Option<UserId>,
    #[serde(default)]
    pub ip: Option<String>,
    pub created: DateTime<Utc>,
    #[serde(default)]
    pub connector: String,
    #[serde(default)]
    pub contexts: Vec<ContextEntry>,
    #[serde(default)]
    pub action: String,
}

impl Event {
    /// Primary context entry, if any
    pub fn primary_context(&self) -> Option<&ContextEntry> {
        self.contexts.first()
    }

    /// Action of the primary context, falling back to the event's own action
    pub fn primary_action(&self) -> &str {
        self.primary_context()
            .map(|c| c.action.as_str())
            .unwrap_or(self.action.as_str())
    }
}
