//! Alert delivery through the built-in adapters against a mock HTTP server

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::{json, Value};
use wiremock::matchers::{body_partial_json, header, header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use activity_alerts::config::AlertsConfig;
use activity_alerts::models::{CompiledRule, WebhookPayload};
use activity_alerts::services::adapters::{sign_payload, SIGNATURE_HEADER};
use activity_alerts::services::{
    build_registry, AlertAdapter, AlertContext, AlertDispatcher, DispatchReport, SlackAdapter,
    WebhookAdapter,
};
use activity_alerts::utils::AppError;

use crate::common::*;

fn compiled_rule(id: i64, alerts: Vec<(&str, Value)>) -> CompiledRule {
    CompiledRule {
        id,
        chunks: vec![],
        alerts: alerts
            .into_iter()
            .map(|(alert_type, config)| alert(alert_type, config))
            .collect(),
    }
}

#[tokio::test]
async fn test_webhook_posts_signed_payload() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/hook"))
        .and(header("X-Team", "ops"))
        .and(header_exists(SIGNATURE_HEADER))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let adapter = WebhookAdapter::new(reqwest::Client::new(), Some("s3cret".to_string()));
    let event = EventBuilder::new().object_id(42).build();
    let ctx = AlertContext {
        rule_id: 7,
        event_id: 1001,
        event: &event,
    };

    adapter
        .send(
            &json!({"url": format!("{}/hook", server.uri()), "headers": {"X-Team": "ops"}}),
            &ctx,
        )
        .await
        .unwrap();

    let requests = server.received_requests().await.unwrap();
    let request = &requests[0];

    let payload: WebhookPayload = request.body_json().unwrap();
    assert_eq!(payload.event_type, "rule.matched");
    assert_eq!(payload.rule_id, 7);
    assert_eq!(payload.event_id, 1001);
    assert_eq!(payload.event, event);

    let signature = request.headers.get(SIGNATURE_HEADER).unwrap().to_str().unwrap();
    assert_eq!(signature, sign_payload("s3cret", &request.body).unwrap());
}

#[tokio::test]
async fn test_webhook_error_status_is_a_delivery_error() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(500).set_body_string("down"))
        .mount(&server)
        .await;

    let adapter = WebhookAdapter::new(reqwest::Client::new(), None);
    let event = EventBuilder::new().build();
    let ctx = AlertContext {
        rule_id: 1,
        event_id: 1,
        event: &event,
    };

    let result = adapter
        .send(&json!({"url": server.uri(), "method": "put"}), &ctx)
        .await;

    match result {
        Err(AppError::Delivery(message)) => assert!(message.contains("500")),
        other => panic!("expected delivery error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_slack_message_describes_event() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/slack"))
        .and(body_partial_json(json!({
            "channel": "#alerts",
            "username": "Activity Alerts",
            "attachments": [{"title": "Rule 3 matched event 55", "text": "user login fail"}]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .expect(1)
        .mount(&server)
        .await;

    let adapter = SlackAdapter::new(reqwest::Client::new());
    let event = EventBuilder::new().summary("user login fail").build();
    let ctx = AlertContext {
        rule_id: 3,
        event_id: 55,
        event: &event,
    };

    adapter
        .send(
            &json!({"webhook_url": format!("{}/slack", server.uri()), "channel": "#alerts"}),
            &ctx,
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn test_dispatcher_with_built_in_adapters() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/hook"))
        .respond_with(ResponseTemplate::new(204))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/broken"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&server)
        .await;

    let registry = build_registry(&AlertsConfig::default()).unwrap();
    let counter = Arc::new(MemoryCounter::default());
    let dispatcher = AlertDispatcher::new(registry, counter.clone());

    let hook = json!({"url": format!("{}/hook", server.uri())});
    let broken = json!({"url": format!("{}/broken", server.uri())});
    let first = compiled_rule(
        1,
        vec![
            ("webhook", hook.clone()),
            ("email", json!({"to": ["ops@example.com"]})),
            ("webhook", broken),
        ],
    );
    let second = compiled_rule(2, vec![("webhook", hook)]);
    let matching = BTreeMap::from([(1, &first), (2, &second)]);

    let event = EventBuilder::new().build();
    let report = dispatcher.dispatch(&matching, 77, &event).await;

    assert_eq!(
        report,
        DispatchReport {
            matched: 2,
            sent: 2,
            // No SMTP relay configured, so email has no adapter
            skipped: 1,
            failed: 1,
        }
    );
    assert_eq!(counter.count(1), 1);
    assert_eq!(counter.count(2), 1);
}
