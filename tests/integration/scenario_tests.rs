//! End-to-end matching scenarios: compile a stored rule, match events

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{TimeZone, Utc};
use serde_json::json;

use activity_alerts::models::{CompiledRuleMap, Event, Relation, RuleId, RuleRecord, ROOT_GROUP};
use activity_alerts::services::{Evaluator, RuleCompiler, StaticUserDirectory};

use crate::common::*;

fn evaluator() -> Evaluator {
    let users = StaticUserDirectory::new()
        .with_user(5, ["administrator", "editor"])
        .with_user(6, ["subscriber"]);
    Evaluator::new(Arc::new(users))
}

fn compile(records: Vec<(RuleId, RuleRecord)>) -> CompiledRuleMap {
    let report = RuleCompiler::new().compile_all(records.iter().map(|(id, r)| (*id, r)));
    assert!(report.failures.is_empty(), "{:?}", report.failures);
    report.rules
}

fn matches(record: RuleRecord, event: &Event) -> bool {
    let rules = compile(vec![(1, record)]);
    evaluator().matching_rules(&rules, event).contains_key(&1)
}

#[test]
fn test_object_id_equality() {
    let rule = RuleFixtures::object_id_42();

    assert!(matches(rule.clone(), &EventBuilder::new().object_id(42).build()));
    assert!(!matches(rule.clone(), &EventBuilder::new().object_id(7).build()));
    // No object id at all is a non-match
    assert!(!matches(rule, &EventBuilder::new().build()));
}

#[test]
fn test_and_of_root_triggers_requires_both() {
    let rule = RuleFixtures::author_and_ip();

    let wrong_ip = EventBuilder::new().author(5).ip("9.9.9.9").build();
    assert!(!matches(rule.clone(), &wrong_ip));

    let both = EventBuilder::new().author(5).ip("1.2.3.4").build();
    assert!(matches(rule, &both));
}

#[test]
fn test_or_group_matches_either_action() {
    let rule = RuleFixtures::login_or_logout();

    let logout = EventBuilder::new().context("session", "logout").build();
    assert!(matches(rule.clone(), &logout));

    let login = EventBuilder::new().context("session", "login").build();
    assert!(matches(rule.clone(), &login));

    let view = EventBuilder::new().context("session", "view").build();
    assert!(!matches(rule, &view));
}

#[test]
fn test_search_contains() {
    let rule = RuleFixtures::summary_contains_fail();

    assert!(matches(
        rule.clone(),
        &EventBuilder::new().summary("user login fail").build()
    ));
    assert!(!matches(
        rule,
        &EventBuilder::new().summary("user login ok").build()
    ));
}

#[test]
fn test_date_ignores_time_of_day() {
    let rule = RuleFixtures::on_2024_01_15();

    let late = EventBuilder::new()
        .created(Utc.with_ymd_and_hms(2024, 1, 15, 23, 59, 0).unwrap())
        .build();
    assert!(matches(rule.clone(), &late));

    let next_day = EventBuilder::new()
        .created(Utc.with_ymd_and_hms(2024, 1, 16, 0, 0, 1).unwrap())
        .build();
    assert!(!matches(rule, &next_day));
}

#[test]
fn test_author_role_uses_primary_role() {
    let rule = RuleRecord {
        triggers: vec![trigger(1, ROOT_GROUP, "author_role", "=", json!("administrator"))],
        ..Default::default()
    };

    assert!(matches(rule.clone(), &EventBuilder::new().author(5).build()));
    assert!(!matches(rule.clone(), &EventBuilder::new().author(6).build()));
    // Unknown user and missing author both fail to resolve
    assert!(!matches(rule.clone(), &EventBuilder::new().author(404).build()));
    assert!(!matches(rule, &EventBuilder::new().build()));
}

#[test]
fn test_unresolved_field_is_not_matched_by_negation() {
    let rule = RuleRecord {
        triggers: vec![trigger(1, ROOT_GROUP, "ip", "!=", json!("1.2.3.4"))],
        ..Default::default()
    };

    assert!(matches(rule.clone(), &EventBuilder::new().ip("5.6.7.8").build()));
    assert!(!matches(rule.clone(), &EventBuilder::new().ip("1.2.3.4").build()));
    assert!(!matches(rule, &EventBuilder::new().build()));
}

#[test]
fn test_unrecognized_trigger_only_fails_its_own_chunk() {
    let rule = RuleRecord {
        triggers: vec![
            trigger(1, 1, "weather", "=", json!("sunny")),
            trigger(2, 1, "connector", "=", json!("users")),
        ],
        groups: vec![group(1, ROOT_GROUP, Relation::Or)],
        alerts: vec![],
    };

    assert!(matches(rule, &EventBuilder::new().connector("users").build()));
}

#[test]
fn test_nested_groups() {
    // connector = users AND (action = delete OR (ip = 10.0.0.1 AND author = 5))
    let rule = RuleRecord {
        triggers: vec![
            trigger(1, ROOT_GROUP, "connector", "=", json!("users")),
            trigger(2, 1, "action", "=", json!("delete")),
            trigger(3, 2, "ip", "=", json!("10.0.0.1")),
            trigger(4, 2, "author", "=", json!(5)),
        ],
        groups: vec![
            group(1, ROOT_GROUP, Relation::Or),
            group(2, 1, Relation::And),
        ],
        alerts: vec![],
    };

    let deleted = EventBuilder::new().action("delete").build();
    assert!(matches(rule.clone(), &deleted));

    let insider = EventBuilder::new().ip("10.0.0.1").author(5).build();
    assert!(matches(rule.clone(), &insider));

    let outsider = EventBuilder::new().ip("10.0.0.1").author(6).build();
    assert!(!matches(rule.clone(), &outsider));

    let other_connector = EventBuilder::new()
        .connector("posts")
        .action("delete")
        .build();
    assert!(!matches(rule, &other_connector));
}

#[test]
fn test_matching_rules_returns_only_matches() {
    let rules = compile(vec![
        (1, RuleFixtures::object_id_42()),
        (2, RuleFixtures::summary_contains_fail()),
        (3, RuleFixtures::on_2024_01_15()),
    ]);

    let event = EventBuilder::new()
        .object_id(42)
        .summary("all good")
        .build();
    let matching = evaluator().matching_rules(&rules, &event);

    let ids: Vec<RuleId> = matching.keys().copied().collect();
    assert_eq!(ids, vec![1, 3]);

    let expected: BTreeMap<RuleId, _> = [(1, &rules[&1]), (3, &rules[&3])].into_iter().collect();
    assert_eq!(matching, expected);
}
