//! Rule compilation, evaluation and alerting services

pub mod adapters;
pub mod cache;
pub mod chunker;
pub mod compiler;
pub mod dispatcher;
pub mod evaluator;
pub mod monitor;
pub mod repository;
pub mod tree_builder;
pub mod users;

pub use adapters::{build_registry, EmailAdapter, SlackAdapter, WebhookAdapter};
pub use cache::{Cache, CacheEntry, CompiledRuleCache, RuleCache};
pub use chunker::generate_group_chunks;
pub use compiler::{CompileReport, RuleCompiler};
pub use dispatcher::{
    AdapterRegistry, AlertAdapter, AlertContext, AlertDispatcher, DispatchReport,
    OccurrenceCounter,
};
pub use evaluator::Evaluator;
pub use monitor::{EventOutcome, RuleMonitor};
pub use repository::{RuleRepository, RuleSource, COMPILED_RULES_KEY};
pub use tree_builder::{generate_flattened_tree, generate_group_chain, generate_tree, index_groups};
pub use users::{StaticUserDirectory, UserDirectory};
