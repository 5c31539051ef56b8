//! Mock services for testing
//!
//! In-memory rule sources, caches, counters and alert adapters so the
//! repository and dispatcher can be tested without storage or network.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;
use serde_json::Value;

use activity_alerts::models::{CompiledRuleMap, EventId, RuleId, RuleRecord, RuleStatus};
use activity_alerts::services::{AlertAdapter, AlertContext, OccurrenceCounter, RuleCache, RuleSource};
use activity_alerts::utils::{AppError, AppResult};

/// Mock rule source backed by a map
#[derive(Default)]
pub struct MockRuleSource {
    rules: RwLock<BTreeMap<RuleId, (RuleStatus, RuleRecord)>>,
    list_calls: AtomicUsize,
    /// Simulate storage errors when set
    failing: AtomicBool,
}

impl MockRuleSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace an active rule
    pub fn insert(&self, id: RuleId, record: RuleRecord) {
        self.insert_with_status(id, RuleStatus::Active, record);
    }

    pub fn insert_with_status(&self, id: RuleId, status: RuleStatus, record: RuleRecord) {
        self.rules.write().unwrap().insert(id, (status, record));
    }

    pub fn set_status(&self, id: RuleId, status: RuleStatus) {
        if let Some(entry) = self.rules.write().unwrap().get_mut(&id) {
            entry.0 = status;
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// How many times the active rule list was read
    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    fn check_error(&self) -> AppResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(AppError::Storage("database is locked".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl RuleSource for MockRuleSource {
    async fn list_active_rule_ids(&self) -> AppResult<Vec<RuleId>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.check_error()?;

        Ok(self
            .rules
            .read()
            .unwrap()
            .iter()
            .filter(|(_, (status, _))| *status == RuleStatus::Active)
            .map(|(id, _)| *id)
            .collect())
    }

    async fn get_rule(&self, id: RuleId) -> AppResult<Option<RuleRecord>> {
        self.check_error()?;
        Ok(self
            .rules
            .read()
            .unwrap()
            .get(&id)
            .map(|(_, record)| record.clone()))
    }
}

/// Cache backend that is always unavailable
#[derive(Default)]
pub struct FailingCache {
    pub calls: AtomicUsize,
}

#[async_trait]
impl RuleCache for FailingCache {
    async fn get(&self, _key: &str) -> AppResult<Option<Arc<CompiledRuleMap>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(AppError::Cache("connection refused".to_string()))
    }

    async fn set(&self, _key: &str, _rules: Arc<CompiledRuleMap>) -> AppResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(AppError::Cache("connection refused".to_string()))
    }

    async fn remove(&self, _key: &str) -> AppResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(AppError::Cache("connection refused".to_string()))
    }
}

/// Alert delivered to a recording adapter
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedAlert {
    pub rule_id: RuleId,
    pub event_id: EventId,
    pub config: Value,
}

/// Adapter that records what it was asked to send
pub struct RecordingAdapter {
    alert_type: String,
    fail: bool,
    sent: Mutex<Vec<RecordedAlert>>,
}

impl RecordingAdapter {
    pub fn new(alert_type: &str) -> Self {
        Self {
            alert_type: alert_type.to_string(),
            fail: false,
            sent: Mutex::new(Vec::new()),
        }
    }

    /// Adapter whose every delivery fails
    pub fn failing(alert_type: &str) -> Self {
        Self {
            fail: true,
            ..Self::new(alert_type)
        }
    }

    pub fn sent(&self) -> Vec<RecordedAlert> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl AlertAdapter for RecordingAdapter {
    fn alert_type(&self) -> &str {
        &self.alert_type
    }

    async fn send(&self, config: &Value, ctx: &AlertContext<'_>) -> AppResult<()> {
        if self.fail {
            return Err(AppError::Delivery("connection reset".to_string()));
        }

        self.sent.lock().unwrap().push(RecordedAlert {
            rule_id: ctx.rule_id,
            event_id: ctx.event_id,
            config: config.clone(),
        });
        Ok(())
    }
}

/// In-memory occurrence counter
#[derive(Default)]
pub struct MemoryCounter {
    counts: Mutex<HashMap<RuleId, u64>>,
}

impl MemoryCounter {
    pub fn count(&self, rule_id: RuleId) -> u64 {
        self.counts
            .lock()
            .unwrap()
            .get(&rule_id)
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl OccurrenceCounter for MemoryCounter {
    async fn increment(&self, rule_id: RuleId) -> AppResult<u64> {
        let mut counts = self.counts.lock().unwrap();
        let count = counts.entry(rule_id).or_insert(0);
        *count += 1;
        Ok(*count)
    }
}
