//! Compiled-rule repository
//!
//! Holds the one cache entry with the compiled map of every active rule. Readers
//! get an `Arc` snapshot that never changes under them; a rule save marks the
//! entry stale and the next read rebuilds the whole map.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::models::{CompiledRuleMap, RuleId, RuleRecord};
use crate::services::cache::RuleCache;
use crate::services::compiler::RuleCompiler;
use crate::utils::AppResult;

/// Key of the cache entry holding the compiled map
pub const COMPILED_RULES_KEY: &str = "compiled_rules";

/// Where stored rules come from
#[async_trait]
pub trait RuleSource: Send + Sync {
    /// Ids of the rules in the active state
    async fn list_active_rule_ids(&self) -> AppResult<Vec<RuleId>>;

    /// Trigger, group and alert records of one rule
    async fn get_rule(&self, id: RuleId) -> AppResult<Option<RuleRecord>>;
}

/// Lazily rebuilt, explicitly invalidated compiled-rule map
pub struct RuleRepository {
    source: Arc<dyn RuleSource>,
    cache: Option<Arc<dyn RuleCache>>,
    compiler: RuleCompiler,
    generation: AtomicU64,
    rebuild_lock: Mutex<()>,
}

impl RuleRepository {
    /// Create a repository; pass `None` to always compile from the source
    pub fn new(source: Arc<dyn RuleSource>, cache: Option<Arc<dyn RuleCache>>) -> Self {
        Self {
            source,
            cache,
            compiler: RuleCompiler::new(),
            generation: AtomicU64::new(0),
            rebuild_lock: Mutex::new(()),
        }
    }

    /// Current compiled map, rebuilding it when the cache has none
    pub async fn compiled_rules(&self) -> AppResult<Arc<CompiledRuleMap>> {
        if let Some(rules) = self.cached().await {
            return Ok(rules);
        }

        let _guard = self.rebuild_lock.lock().await;

        // Another caller may have rebuilt while we waited
        if let Some(rules) = self.cached().await {
            return Ok(rules);
        }

        self.rebuild().await
    }

    /// Mark the cached map stale
    ///
    /// Called whenever a rule is created or updated. A rebuild already in
    /// flight finishes for its own caller but is not stored.
    pub async fn invalidate(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);

        if let Some(cache) = &self.cache {
            if let Err(e) = cache.remove(COMPILED_RULES_KEY).await {
                warn!(error = %e, "Failed to drop compiled rules from cache");
            }
        }

        debug!("Compiled rules invalidated");
    }

    /// Compile every active rule from the source
    async fn rebuild(&self) -> AppResult<Arc<CompiledRuleMap>> {
        let generation = self.generation.load(Ordering::SeqCst);

        let ids = self.source.list_active_rule_ids().await.map_err(|e| {
            error!(error = %e, "Failed to list active rules");
            e
        })?;

        let mut records = Vec::with_capacity(ids.len());
        let mut unreadable = 0;
        for id in ids {
            match self.source.get_rule(id).await {
                Ok(Some(record)) => records.push((id, record)),
                Ok(None) => warn!(rule_id = id, "Active rule has no stored record, skipping"),
                Err(e) => {
                    warn!(rule_id = id, error = %e, "Failed to load rule, skipping");
                    unreadable += 1;
                }
            }
        }

        let report = self
            .compiler
            .compile_all(records.iter().map(|(id, record)| (*id, record)));
        let rules = Arc::new(report.rules);

        info!(
            compiled = rules.len(),
            failed = report.failures.len() + unreadable,
            "Rebuilt compiled rules"
        );

        if let Some(cache) = &self.cache {
            if self.generation.load(Ordering::SeqCst) == generation {
                if let Err(e) = cache.set(COMPILED_RULES_KEY, rules.clone()).await {
                    warn!(error = %e, "Failed to store compiled rules in cache");
                }
            } else {
                debug!("Rules changed during rebuild, not caching stale map");
            }
        }

        Ok(rules)
    }

    async fn cached(&self) -> Option<Arc<CompiledRuleMap>> {
        let cache = self.cache.as_ref()?;
        match cache.get(COMPILED_RULES_KEY).await {
            Ok(hit) => hit,
            Err(e) => {
                warn!(error = %e, "Compiled rule cache unavailable, compiling from source");
                None
            }
        }
    }
}
