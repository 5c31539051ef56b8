//! Input validation for rules submitted by the authoring side

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::SaveRuleRequest;
use crate::utils::{AppError, AppResult};

/// Regex for validating alert type names
static ALERT_TYPE_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-z][a-z0-9_-]*$").unwrap());

/// Validate a rule name
pub fn validate_rule_name(name: &str) -> bool {
    let trimmed = name.trim();
    !trimmed.is_empty() && name.len() <= 255 && !name.chars().any(char::is_control)
}

/// Validate an alert type name
pub fn validate_alert_type(alert_type: &str) -> bool {
    alert_type.len() <= 64 && ALERT_TYPE_REGEX.is_match(alert_type)
}

/// Check a rule before it is stored
///
/// Only structural problems are rejected here. Unknown groups and cycles are
/// left to the compiler, which excludes the rule instead of refusing the save.
pub fn validate_save_request(req: &SaveRuleRequest) -> AppResult<()> {
    if !validate_rule_name(&req.name) {
        return Err(AppError::InvalidRecord(format!(
            "Invalid rule name: {:?}",
            req.name
        )));
    }

    let mut trigger_ids = HashSet::new();
    for trigger in &req.record.triggers {
        if !trigger_ids.insert(trigger.id) {
            return Err(AppError::InvalidRecord(format!(
                "Duplicate trigger id {}",
                trigger.id
            )));
        }
    }

    let mut group_ids = HashSet::new();
    for group in &req.record.groups {
        if !group_ids.insert(group.id) {
            return Err(AppError::InvalidRecord(format!(
                "Duplicate group id {}",
                group.id
            )));
        }
        if group.parent == Some(group.id) {
            return Err(AppError::InvalidRecord(format!(
                "Group {} is its own parent",
                group.id
            )));
        }
    }

    if let Some(alert) = req
        .record
        .alerts
        .iter()
        .find(|a| !validate_alert_type(&a.alert_type))
    {
        return Err(AppError::InvalidRecord(format!(
            "Invalid alert type: {:?}",
            alert.alert_type
        )));
    }

    Ok(())
}
