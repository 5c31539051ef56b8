//! Per-alert delivery settings
//!
//! Each rule alert carries a free-form JSON `config`; adapters decode it into
//! one of these structs when they send.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Event, EventId, RuleId};

/// Webhook alert configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    pub url: String,
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    /// Overrides the adapter-wide request timeout
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

fn default_method() -> String {
    "POST".to_string()
}

/// Slack incoming-webhook alert configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlackConfig {
    pub webhook_url: String,
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub icon_emoji: Option<String>,
}

/// Email alert configuration; the SMTP relay comes from the application config
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    pub to: Vec<String>,
    #[serde(default)]
    pub subject: Option<String>,
}

/// Body POSTed by the webhook adapter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookPayload {
    pub event_type: String,
    pub rule_id: RuleId,
    pub event_id: EventId,
    pub event: Event,
    pub timestamp: DateTime<Utc>,
}
