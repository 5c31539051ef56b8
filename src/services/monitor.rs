//! Entry points called by the host: one per ingested event, one per rule save

use std::sync::Arc;

use tracing::{debug, error, info};

use crate::models::{Event, EventId, RuleId};
use crate::services::dispatcher::{AlertDispatcher, DispatchReport};
use crate::services::evaluator::Evaluator;
use crate::services::repository::RuleRepository;

/// Wires the repository, evaluator and dispatcher together
#[derive(Clone)]
pub struct RuleMonitor {
    repository: Arc<RuleRepository>,
    evaluator: Evaluator,
    dispatcher: AlertDispatcher,
}

/// Result of handling one event
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventOutcome {
    pub matched: Vec<RuleId>,
    pub report: DispatchReport,
}

impl RuleMonitor {
    pub fn new(
        repository: Arc<RuleRepository>,
        evaluator: Evaluator,
        dispatcher: AlertDispatcher,
    ) -> Self {
        Self {
            repository,
            evaluator,
            dispatcher,
        }
    }

    pub fn repository(&self) -> &Arc<RuleRepository> {
        &self.repository
    }

    /// Match one event against every active rule and dispatch the matches
    ///
    /// A rule source failure is logged and reported as no matches.
    pub async fn on_event(&self, event_id: EventId, event: &Event) -> EventOutcome {
        let rules = match self.repository.compiled_rules().await {
            Ok(rules) => rules,
            Err(e) => {
                error!(event_id, error = %e, "Could not load compiled rules, event not evaluated");
                return EventOutcome::default();
            }
        };

        let matching = self.evaluator.matching_rules(&rules, event);
        let matched: Vec<RuleId> = matching.keys().copied().collect();

        if matched.is_empty() {
            debug!(event_id, rules = rules.len(), "No rules matched");
            return EventOutcome {
                matched,
                report: DispatchReport::default(),
            };
        }

        let report = self.dispatcher.dispatch(&matching, event_id, event).await;

        info!(
            event_id,
            matched = report.matched,
            sent = report.sent,
            skipped = report.skipped,
            failed = report.failed,
            "Event processed"
        );

        EventOutcome { matched, report }
    }

    /// Notify that a rule was created, updated or changed status
    pub async fn on_rule_saved(&self) {
        self.repository.invalidate().await;
    }
}
