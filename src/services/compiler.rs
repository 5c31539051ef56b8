//! Rule compilation
//!
//! Runs the tree builder and the chunker over one rule's stored records and
//! attaches its alert configurations.

use tracing::{debug, warn};

use crate::models::{CompiledRule, CompiledRuleMap, Relation, RuleId, RuleRecord, ROOT_GROUP};
use crate::services::chunker::generate_group_chunks;
use crate::services::tree_builder::{generate_flattened_tree, generate_tree, index_groups};
use crate::utils::CompileError;

/// Outcome of compiling a batch of rules
#[derive(Debug, Default)]
pub struct CompileReport {
    pub rules: CompiledRuleMap,
    pub failures: Vec<(RuleId, CompileError)>,
}

/// Stateless compiler from stored rule records to evaluable rules
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleCompiler;

impl RuleCompiler {
    pub fn new() -> Self {
        Self
    }

    /// Compile a single rule
    pub fn compile(&self, id: RuleId, record: &RuleRecord) -> Result<CompiledRule, CompileError> {
        if record.triggers.is_empty() {
            return Err(CompileError::EmptyCondition);
        }

        let mut groups = index_groups(&record.groups);
        if let Some(root) = groups.get_mut(&ROOT_GROUP) {
            if root.relation != Relation::And || root.parent.is_some() {
                warn!(rule_id = id, "Root group stored with non-default settings, normalizing");
                root.relation = Relation::And;
                root.parent = None;
            }
        }

        let flattened = generate_flattened_tree(&record.triggers, &groups)?;
        let tree = generate_tree(&flattened);
        let chunks = generate_group_chunks(tree);

        debug!(
            rule_id = id,
            triggers = record.triggers.len(),
            chunks = chunks.len(),
            "Compiled rule"
        );

        Ok(CompiledRule {
            id,
            chunks,
            alerts: record.alerts.clone(),
        })
    }

    /// Compile every rule, collecting failures instead of stopping at them
    pub fn compile_all<'a, I>(&self, records: I) -> CompileReport
    where
        I: IntoIterator<Item = (RuleId, &'a RuleRecord)>,
    {
        let mut report = CompileReport::default();

        for (id, record) in records {
            match self.compile(id, record) {
                Ok(rule) => {
                    report.rules.insert(id, rule);
                }
                Err(e) => {
                    warn!(rule_id = id, error = %e, "Rule excluded: failed to compile");
                    report.failures.push((id, e));
                }
            }
        }

        report
    }
}
