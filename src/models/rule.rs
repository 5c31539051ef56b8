//! Rule records as they come out of storage
//!
//! A rule is stored flat: every trigger names the group that owns it and every
//! group names its parent. The compiler turns these records into a nested tree.

use serde::{Deserialize, Serialize};

pub type RuleId = i64;
pub type GroupId = i64;
pub type TriggerId = i64;
pub type UserId = i64;

/// Identifier of the implicit group every rule hangs its conditions from
pub const ROOT_GROUP: GroupId = 0;

// ============================================================================
// Enums
// ============================================================================

/// Boolean relation joining the children of a group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Relation {
    And,
    Or,
}

impl Relation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Relation::And => "and",
            Relation::Or => "or",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "and" => Some(Relation::And),
            "or" => Some(Relation::Or),
            _ => None,
        }
    }
}

impl Default for Relation {
    fn default() -> Self {
        Relation::And
    }
}

/// Event field a trigger inspects
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TriggerType {
    Search,
    ObjectId,
    Author,
    AuthorRole,
    Ip,
    Date,
    Connector,
    Context,
    Action,
    /// Stored type this build does not know; never matches
    Unrecognized(String),
}

impl TriggerType {
    pub fn as_str(&self) -> &str {
        match self {
            TriggerType::Search => "search",
            TriggerType::ObjectId => "object_id",
            TriggerType::Author => "author",
            TriggerType::AuthorRole => "author_role",
            TriggerType::Ip => "ip",
            TriggerType::Date => "date",
            TriggerType::Connector => "connector",
            TriggerType::Context => "context",
            TriggerType::Action => "action",
            TriggerType::Unrecognized(name) => name,
        }
    }

    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "search" => TriggerType::Search,
            "object_id" => TriggerType::ObjectId,
            "author" => TriggerType::Author,
            "author_role" => TriggerType::AuthorRole,
            "ip" => TriggerType::Ip,
            "date" => TriggerType::Date,
            "connector" => TriggerType::Connector,
            "context" => TriggerType::Context,
            "action" => TriggerType::Action,
            _ => TriggerType::Unrecognized(s.to_string()),
        }
    }
}

impl From<String> for TriggerType {
    fn from(s: String) -> Self {
        TriggerType::parse(&s)
    }
}

impl From<TriggerType> for String {
    fn from(t: TriggerType) -> Self {
        t.as_str().to_string()
    }
}

/// Raw comparison performed by an operator, before negation
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Predicate {
    Equals,
    In,
    Contains,
    Regex,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
    Unrecognized(String),
}

impl Predicate {
    pub fn as_str(&self) -> &str {
        match self {
            Predicate::Equals => "=",
            Predicate::In => "in",
            Predicate::Contains => "contains",
            Predicate::Regex => "regex",
            Predicate::LessThan => "<",
            Predicate::LessThanOrEqual => "<=",
            Predicate::GreaterThan => ">",
            Predicate::GreaterThanOrEqual => ">=",
            Predicate::Unrecognized(name) => name,
        }
    }
}

/// Trigger operator: a predicate plus a negation flag
///
/// The textual form is the predicate, optionally prefixed with `!`. `!=` is the
/// negation of `=`, `!in` of `in`, and so on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Operator {
    pub predicate: Predicate,
    pub negated: bool,
}

impl Operator {
    pub fn new(predicate: Predicate) -> Self {
        Self {
            predicate,
            negated: false,
        }
    }

    pub fn negate(mut self) -> Self {
        self.negated = !self.negated;
        self
    }

    pub fn parse(s: &str) -> Self {
        let trimmed = s.trim();
        let (negated, body) = match trimmed.strip_prefix('!') {
            // A bare "!" is not a negated empty predicate
            Some(rest) if !rest.is_empty() => (true, rest),
            _ => (false, trimmed),
        };

        let predicate = match body.to_lowercase().as_str() {
            "=" => Predicate::Equals,
            "in" => Predicate::In,
            "contains" => Predicate::Contains,
            "regex" => Predicate::Regex,
            "<" => Predicate::LessThan,
            "<=" => Predicate::LessThanOrEqual,
            ">" => Predicate::GreaterThan,
            ">=" => Predicate::GreaterThanOrEqual,
            _ => {
                return Self {
                    predicate: Predicate::Unrecognized(trimmed.to_string()),
                    negated: false,
                }
            }
        };

        Self { predicate, negated }
    }
}

impl std::fmt::Display for Operator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.negated {
            write!(f, "!{}", self.predicate.as_str())
        } else {
            f.write_str(self.predicate.as_str())
        }
    }
}

impl From<String> for Operator {
    fn from(s: String) -> Self {
        Operator::parse(&s)
    }
}

impl From<Operator> for String {
    fn from(op: Operator) -> Self {
        op.to_string()
    }
}

/// Visibility state of a stored rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleStatus {
    Active,
    Inactive,
    Draft,
}

impl RuleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleStatus::Active => "active",
            RuleStatus::Inactive => "inactive",
            RuleStatus::Draft => "draft",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "active" => Some(RuleStatus::Active),
            "inactive" => Some(RuleStatus::Inactive),
            "draft" => Some(RuleStatus::Draft),
            _ => None,
        }
    }
}

impl Default for RuleStatus {
    fn default() -> Self {
        RuleStatus::Active
    }
}

// ============================================================================
// Records
// ============================================================================

/// A group of conditions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub id: GroupId,
    /// Parent group; `None` only for the root
    #[serde(default)]
    pub parent: Option<GroupId>,
    #[serde(default)]
    pub relation: Relation,
}

impl Group {
    pub fn root() -> Self {
        Self {
            id: ROOT_GROUP,
            parent: None,
            relation: Relation::And,
        }
    }
}

/// A leaf condition testing one event field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trigger {
    pub id: TriggerId,
    /// Owning group
    #[serde(default)]
    pub group: GroupId,
    #[serde(rename = "type")]
    pub trigger_type: TriggerType,
    pub operator: Operator,
    pub value: serde_json::Value,
}

/// Alert attached to a rule: adapter type plus its configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertConfig {
    #[serde(rename = "type")]
    pub alert_type: String,
    #[serde(default)]
    pub config: serde_json::Value,
}

/// Everything the compiler needs to know about one stored rule
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleRecord {
    #[serde(default)]
    pub triggers: Vec<Trigger>,
    #[serde(default)]
    pub groups: Vec<Group>,
    #[serde(default)]
    pub alerts: Vec<AlertConfig>,
}

/// Request to create or replace a stored rule
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaveRuleRequest {
    /// Existing rule to replace; a new rule is created when absent
    #[serde(default)]
    pub id: Option<RuleId>,
    pub name: String,
    #[serde(default)]
    pub status: RuleStatus,
    #[serde(flatten)]
    pub record: RuleRecord,
}

/// Stored rule metadata without its condition records
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSummary {
    pub id: RuleId,
    pub name: String,
    pub status: RuleStatus,
    pub occurrences: u64,
}
