//! Alert dispatch
//!
//! For every matching rule the dispatcher bumps the rule's occurrence counter
//! and hands each of the rule's alerts to the adapter registered for its type.
//! Nothing here stops on a failure: a broken counter, an unknown alert type or
//! a failed delivery is logged and counted, and the next alert is tried.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::models::{CompiledRule, Event, EventId, RuleId};
use crate::utils::AppResult;

/// What an adapter knows about the alert it is delivering
#[derive(Debug, Clone, Copy)]
pub struct AlertContext<'a> {
    pub rule_id: RuleId,
    pub event_id: EventId,
    pub event: &'a Event,
}

/// Delivers alerts of one type
#[async_trait]
pub trait AlertAdapter: Send + Sync {
    /// Alert type this adapter is registered under (e.g. `"webhook"`)
    fn alert_type(&self) -> &str;

    /// Deliver one alert using that alert's stored configuration
    async fn send(&self, config: &Value, ctx: &AlertContext<'_>) -> AppResult<()>;
}

/// Persisted per-rule match counter
#[async_trait]
pub trait OccurrenceCounter: Send + Sync {
    /// Add one occurrence and return the new count
    async fn increment(&self, rule_id: RuleId) -> AppResult<u64>;
}

/// Alert type to adapter mapping, built once at startup
#[derive(Default, Clone)]
pub struct AdapterRegistry {
    adapters: HashMap<String, Arc<dyn AlertAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an adapter under its own type, replacing any previous one
    pub fn register(&mut self, adapter: Arc<dyn AlertAdapter>) {
        let alert_type = adapter.alert_type().to_string();
        if self.adapters.insert(alert_type.clone(), adapter).is_some() {
            warn!(alert_type = %alert_type, "Replaced previously registered alert adapter");
        }
    }

    pub fn with(mut self, adapter: Arc<dyn AlertAdapter>) -> Self {
        self.register(adapter);
        self
    }

    pub fn get(&self, alert_type: &str) -> Option<Arc<dyn AlertAdapter>> {
        self.adapters.get(alert_type).cloned()
    }

    pub fn has_adapter(&self, alert_type: &str) -> bool {
        self.adapters.contains_key(alert_type)
    }

    /// Registered alert types, sorted
    pub fn alert_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.adapters.keys().cloned().collect();
        types.sort();
        types
    }
}

/// Counts of what a dispatch did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Rules that matched the event
    pub matched: usize,
    /// Alerts delivered
    pub sent: usize,
    /// Alerts whose type has no adapter
    pub skipped: usize,
    /// Counter increments and deliveries that returned an error
    pub failed: usize,
}

/// Fans matching rules out to the occurrence counter and alert adapters
#[derive(Clone)]
pub struct AlertDispatcher {
    registry: Arc<AdapterRegistry>,
    counter: Arc<dyn OccurrenceCounter>,
}

impl AlertDispatcher {
    pub fn new(registry: AdapterRegistry, counter: Arc<dyn OccurrenceCounter>) -> Self {
        Self {
            registry: Arc::new(registry),
            counter,
        }
    }

    pub fn registry(&self) -> &AdapterRegistry {
        &self.registry
    }

    /// Count and alert every matching rule for one event
    pub async fn dispatch(
        &self,
        matching: &BTreeMap<RuleId, &CompiledRule>,
        event_id: EventId,
        event: &Event,
    ) -> DispatchReport {
        let mut report = DispatchReport {
            matched: matching.len(),
            ..Default::default()
        };

        for (&rule_id, rule) in matching {
            match self.counter.increment(rule_id).await {
                Ok(count) => debug!(rule_id, occurrences = count, "Rule occurrence recorded"),
                Err(e) => {
                    error!(rule_id, error = %e, "Failed to record rule occurrence");
                    report.failed += 1;
                }
            }

            let ctx = AlertContext {
                rule_id,
                event_id,
                event,
            };

            for alert in &rule.alerts {
                let Some(adapter) = self.registry.get(&alert.alert_type) else {
                    warn!(
                        rule_id,
                        alert_type = %alert.alert_type,
                        "No adapter registered for alert type, skipping"
                    );
                    report.skipped += 1;
                    continue;
                };

                match adapter.send(&alert.config, &ctx).await {
                    Ok(()) => {
                        info!(rule_id, event_id, alert_type = %alert.alert_type, "Alert sent");
                        report.sent += 1;
                    }
                    Err(e) => {
                        error!(
                            rule_id,
                            event_id,
                            alert_type = %alert.alert_type,
                            error = %e,
                            "Failed to send alert"
                        );
                        report.failed += 1;
                    }
                }
            }
        }

        report
    }
}
