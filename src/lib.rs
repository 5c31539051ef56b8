//! Activity Alerts Library
//!
//! Compiles notification rules into nested AND/OR chunks, matches activity-log
//! events against every active rule and hands the matches to alert adapters.

use std::sync::Arc;

pub mod config;
pub mod db;
pub mod models;
pub mod services;
pub mod utils;

pub use config::AppConfig;
pub use db::{DbPool, SqliteRuleStore};
pub use services::{Evaluator, RuleMonitor, RuleRepository};

use services::{
    AdapterRegistry, AlertDispatcher, CompiledRuleCache, OccurrenceCounter, RuleCache, RuleSource,
    UserDirectory,
};

/// Assemble a monitor from its collaborators
///
/// The cache is only attached when enabled in `config`.
pub fn build_monitor(
    config: &AppConfig,
    source: Arc<dyn RuleSource>,
    counter: Arc<dyn OccurrenceCounter>,
    users: Arc<dyn UserDirectory>,
    registry: AdapterRegistry,
) -> RuleMonitor {
    let cache: Option<Arc<dyn RuleCache>> = if config.cache.enabled {
        Some(Arc::new(CompiledRuleCache::from_config(&config.cache)))
    } else {
        None
    };

    RuleMonitor::new(
        Arc::new(RuleRepository::new(source, cache)),
        Evaluator::new(users),
        AlertDispatcher::new(registry, counter),
    )
}
