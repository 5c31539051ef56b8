//! Evaluation of compiled rules against one event
//!
//! A chunk sequence is an AND of chunks and each chunk an OR of its members.
//! Evaluation stops at the first chunk with no true member; inside a chunk every
//! member is evaluated before the any-true check.
//!
//! Operators compute their raw predicate once and apply a leading `!` as a final
//! XOR. `<=` and `>=` are ordered comparisons only; they never fall back to list
//! membership the way `in` behaves.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use regex::Regex;
use serde_json::Value;
use tracing::{debug, warn};

use crate::models::{
    Chunk, ChunkMember, CompiledRule, CompiledRuleMap, Event, Predicate, RuleId, Trigger,
    TriggerType,
};
use crate::services::users::UserDirectory;

/// Format of the day-granularity key used by `date` triggers
const DAY_KEY_FORMAT: &str = "%Y-%m-%d";

/// Matches events against compiled rules
#[derive(Clone)]
pub struct Evaluator {
    users: Arc<dyn UserDirectory>,
}

impl Evaluator {
    pub fn new(users: Arc<dyn UserDirectory>) -> Self {
        Self { users }
    }

    /// Every rule of the snapshot whose condition matches `event`
    pub fn matching_rules<'a>(
        &self,
        rules: &'a CompiledRuleMap,
        event: &Event,
    ) -> BTreeMap<RuleId, &'a CompiledRule> {
        rules
            .iter()
            .filter(|(_, rule)| self.match_group(&rule.chunks, event))
            .map(|(id, rule)| (*id, rule))
            .collect()
    }

    /// AND across chunks, OR within each chunk
    pub fn match_group(&self, chunks: &[Chunk], event: &Event) -> bool {
        for chunk in chunks {
            let results: Vec<bool> = chunk
                .members()
                .iter()
                .map(|member| match member {
                    ChunkMember::Trigger(trigger) => self.match_trigger(trigger, event),
                    ChunkMember::Group(inner) => self.match_group(inner, event),
                })
                .collect();

            if !results.contains(&true) {
                return false;
            }
        }

        true
    }

    /// Test a single trigger
    ///
    /// A trigger whose field cannot be resolved or whose predicate cannot be
    /// computed is a non-match, negated or not.
    pub fn match_trigger(&self, trigger: &Trigger, event: &Event) -> bool {
        let Some(haystack) = self.haystack(trigger, event) else {
            debug!(
                trigger_id = trigger.id,
                trigger_type = trigger.trigger_type.as_str(),
                "Trigger field unresolved, no match"
            );
            return false;
        };

        let Some(needle) = needle(trigger) else {
            debug!(trigger_id = trigger.id, value = %trigger.value, "Trigger value unusable, no match");
            return false;
        };

        match evaluate_predicate(&trigger.operator.predicate, &haystack, &needle) {
            Some(raw) => raw ^ trigger.operator.negated,
            None => {
                debug!(
                    trigger_id = trigger.id,
                    operator = %trigger.operator,
                    "Operator not applicable, no match"
                );
                false
            }
        }
    }

    /// Event value a trigger compares against
    fn haystack(&self, trigger: &Trigger, event: &Event) -> Option<Value> {
        match &trigger.trigger_type {
            TriggerType::Search => Some(Value::String(event.summary.clone())),
            TriggerType::ObjectId => event.object_id.map(Value::from),
            TriggerType::Author => event.author.map(Value::from),
            TriggerType::AuthorRole => {
                let author = event.author?;
                let roles = self.users.roles(author)?;
                roles.into_iter().next().map(Value::String)
            }
            TriggerType::Ip => event.ip.clone().map(Value::String),
            TriggerType::Date => Some(Value::String(
                event.created.format(DAY_KEY_FORMAT).to_string(),
            )),
            TriggerType::Connector => Some(Value::String(event.connector.clone())),
            TriggerType::Context => event
                .primary_context()
                .map(|c| Value::String(c.context.clone())),
            TriggerType::Action => Some(Value::String(event.primary_action().to_string())),
            TriggerType::Unrecognized(_) => None,
        }
    }
}

/// Trigger value in the shape its haystack is compared with
fn needle(trigger: &Trigger) -> Option<Value> {
    match trigger.trigger_type {
        TriggerType::Date => match &trigger.value {
            Value::Array(items) => items
                .iter()
                .map(day_key)
                .collect::<Option<Vec<_>>>()
                .map(|keys| Value::Array(keys.into_iter().map(Value::String).collect())),
            other => day_key(other).map(Value::String),
        },
        _ => Some(trigger.value.clone()),
    }
}

/// Day key for a date given as text or as a unix timestamp
fn day_key(value: &Value) -> Option<String> {
    let date = match value {
        Value::String(s) => parse_date(s.trim())?,
        Value::Number(n) => DateTime::<Utc>::from_timestamp(n.as_i64()?, 0)?.date_naive(),
        _ => return None,
    };
    Some(date.format(DAY_KEY_FORMAT).to_string())
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s, DAY_KEY_FORMAT)
        .ok()
        .or_else(|| {
            DateTime::parse_from_rfc3339(s)
                .ok()
                .map(|dt| dt.with_timezone(&Utc).date_naive())
        })
        .or_else(|| {
            NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
                .ok()
                .map(|dt| dt.date())
        })
}

/// Raw predicate result, `None` when it cannot be computed
fn evaluate_predicate(predicate: &Predicate, haystack: &Value, needle: &Value) -> Option<bool> {
    match predicate {
        Predicate::Equals => Some(loose_eq(haystack, needle)),
        Predicate::In => {
            let candidates = match needle {
                Value::Array(items) => items.as_slice(),
                other => std::slice::from_ref(other),
            };
            Some(candidates.iter().any(|c| loose_eq(haystack, c)))
        }
        Predicate::Contains => Some(scalar_text(haystack)?.contains(&scalar_text(needle)?)),
        Predicate::Regex => {
            let pattern = needle.as_str()?;
            match Regex::new(pattern) {
                Ok(re) => Some(re.is_match(&scalar_text(haystack)?)),
                Err(e) => {
                    warn!(pattern, error = %e, "Invalid trigger regex");
                    None
                }
            }
        }
        Predicate::LessThan => compare_values(haystack, needle).map(Ordering::is_lt),
        Predicate::LessThanOrEqual => compare_values(haystack, needle).map(Ordering::is_le),
        Predicate::GreaterThan => compare_values(haystack, needle).map(Ordering::is_gt),
        Predicate::GreaterThanOrEqual => compare_values(haystack, needle).map(Ordering::is_ge),
        Predicate::Unrecognized(_) => None,
    }
}

/// Text form of a scalar JSON value
fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Exact integer form of a number or numeric text
fn as_integer(value: &Value) -> Option<i128> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .map(i128::from)
            .or_else(|| n.as_u64().map(i128::from)),
        Value::String(s) => s.trim().parse::<i128>().ok(),
        _ => None,
    }
}

/// Equality that treats `42` and `"42"` as the same value
fn loose_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (as_integer(a), as_integer(b)) {
            (Some(x), Some(y)) => x == y,
            _ => x.as_f64() == y.as_f64(),
        },
        _ => match (scalar_text(a), scalar_text(b)) {
            (Some(x), Some(y)) => x == y,
            _ => a == b,
        },
    }
}

/// Numeric ordering when both sides are numbers, lexical otherwise
///
/// Integers compare exactly; `f64` is only used when either side has a fraction.
fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    if let (Some(x), Some(y)) = (as_integer(a), as_integer(b)) {
        return Some(x.cmp(&y));
    }

    let (x, y) = (scalar_text(a)?, scalar_text(b)?);
    match (x.trim().parse::<f64>(), y.trim().parse::<f64>()) {
        (Ok(x), Ok(y)) => x.partial_cmp(&y),
        _ => Some(x.cmp(&y)),
    }
}
