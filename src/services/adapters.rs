//! Built-in alert adapters
//!
//! - `webhook`: JSON POST of the rule, event id and event, optionally signed
//!   with HMAC-SHA256 in the `X-Signature-256` header
//! - `slack`: incoming-webhook message with an attachment describing the event
//! - `email`: plain-text mail through the configured SMTP relay

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use hmac::{Hmac, Mac};
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use reqwest::header::CONTENT_TYPE;
use serde_json::{json, Value};
use sha2::Sha256;
use tracing::{debug, info};

use crate::config::{AlertsConfig, SmtpConfig};
use crate::models::{EmailConfig, SlackConfig, WebhookConfig, WebhookPayload};
use crate::services::dispatcher::{AdapterRegistry, AlertAdapter, AlertContext};
use crate::utils::{AppError, AppResult};

/// Header carrying the payload signature
pub const SIGNATURE_HEADER: &str = "X-Signature-256";

/// Build the registry of every adapter the configuration allows
///
/// `email` is only registered when an SMTP relay is configured, so email
/// alerts are skipped rather than failing when it is not.
pub fn build_registry(config: &AlertsConfig) -> AppResult<AdapterRegistry> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.webhook_timeout_secs))
        .build()?;

    let mut registry = AdapterRegistry::new()
        .with(Arc::new(WebhookAdapter::new(
            client.clone(),
            config.webhook_secret.clone(),
        )))
        .with(Arc::new(SlackAdapter::new(client)));

    match &config.smtp {
        Some(smtp) => registry.register(Arc::new(EmailAdapter::new(smtp)?)),
        None => debug!("No SMTP relay configured, email alerts disabled"),
    }

    Ok(registry)
}

fn decode_config<T: serde::de::DeserializeOwned>(alert_type: &str, config: &Value) -> AppResult<T> {
    serde_json::from_value(config.clone())
        .map_err(|e| AppError::InvalidRecord(format!("Invalid {} alert config: {}", alert_type, e)))
}

/// Hex HMAC-SHA256 of `body`, formatted as `sha256=<hex>`
pub fn sign_payload(secret: &str, body: &[u8]) -> AppResult<String> {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .map_err(|e| AppError::Config(format!("Invalid webhook secret: {}", e)))?;
    mac.update(body);
    Ok(format!("sha256={}", hex::encode(mac.finalize().into_bytes())))
}

async fn check_response(service: &str, response: reqwest::Response) -> AppResult<()> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }

    let body = response.text().await.unwrap_or_default();
    Err(AppError::Delivery(format!(
        "{} returned error {}: {}",
        service,
        status.as_u16(),
        body
    )))
}

// ============================================================================
// Webhook
// ============================================================================

pub struct WebhookAdapter {
    client: reqwest::Client,
    secret: Option<String>,
}

impl WebhookAdapter {
    pub fn new(client: reqwest::Client, secret: Option<String>) -> Self {
        Self { client, secret }
    }
}

#[async_trait]
impl AlertAdapter for WebhookAdapter {
    fn alert_type(&self) -> &str {
        "webhook"
    }

    async fn send(&self, config: &Value, ctx: &AlertContext<'_>) -> AppResult<()> {
        let config: WebhookConfig = decode_config(self.alert_type(), config)?;

        let payload = WebhookPayload {
            event_type: "rule.matched".to_string(),
            rule_id: ctx.rule_id,
            event_id: ctx.event_id,
            event: ctx.event.clone(),
            timestamp: Utc::now(),
        };
        let body = serde_json::to_vec(&payload)?;

        let mut request = match config.method.to_uppercase().as_str() {
            "PUT" => self.client.put(&config.url),
            _ => self.client.post(&config.url),
        };

        for (key, value) in &config.headers {
            request = request.header(key, value);
        }

        if let Some(timeout) = config.timeout_secs {
            request = request.timeout(Duration::from_secs(timeout));
        }

        if let Some(secret) = &self.secret {
            request = request.header(SIGNATURE_HEADER, sign_payload(secret, &body)?);
        }

        let response = request
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?;

        check_response("Webhook", response).await
    }
}

// ============================================================================
// Slack
// ============================================================================

pub struct SlackAdapter {
    client: reqwest::Client,
}

impl SlackAdapter {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl AlertAdapter for SlackAdapter {
    fn alert_type(&self) -> &str {
        "slack"
    }

    async fn send(&self, config: &Value, ctx: &AlertContext<'_>) -> AppResult<()> {
        let config: SlackConfig = decode_config(self.alert_type(), config)?;
        let event = ctx.event;

        let author = event
            .author
            .map(|id| id.to_string())
            .unwrap_or_else(|| "-".to_string());

        let slack_payload = json!({
            "channel": config.channel,
            "username": config.username.unwrap_or_else(|| "Activity Alerts".to_string()),
            "icon_emoji": config.icon_emoji.unwrap_or_else(|| ":bell:".to_string()),
            "attachments": [{
                "color": "#FFA500",
                "title": format!("Rule {} matched event {}", ctx.rule_id, ctx.event_id),
                "text": event.summary,
                "fields": [
                    {
                        "title": "Connector",
                        "value": event.connector,
                        "short": true
                    },
                    {
                        "title": "Action",
                        "value": event.primary_action(),
                        "short": true
                    },
                    {
                        "title": "Author",
                        "value": author,
                        "short": true
                    },
                    {
                        "title": "Recorded At",
                        "value": event.created.to_rfc3339(),
                        "short": true
                    }
                ],
                "ts": event.created.timestamp()
            }]
        });

        let response = self
            .client
            .post(&config.webhook_url)
            .json(&slack_payload)
            .send()
            .await?;

        check_response("Slack", response).await
    }
}

// ============================================================================
// Email
// ============================================================================

pub struct EmailAdapter {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl EmailAdapter {
    pub fn new(smtp: &SmtpConfig) -> AppResult<Self> {
        let builder = if smtp.starttls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&smtp.host)?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&smtp.host)
        };
        let mut builder = builder.port(smtp.port);

        if let (Some(user), Some(pass)) = (&smtp.username, &smtp.password) {
            builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
        }

        Ok(Self {
            transport: builder.build(),
            from: smtp.from.parse()?,
        })
    }
}

/// Plain-text body describing the matched event
fn email_body(ctx: &AlertContext<'_>) -> String {
    let event = ctx.event;
    let mut body = format!(
        "Rule {} matched event {}.\n\nSummary: {}\nConnector: {}\nAction: {}\nRecorded at: {}\n",
        ctx.rule_id,
        ctx.event_id,
        event.summary,
        event.connector,
        event.primary_action(),
        event.created.to_rfc3339()
    );
    if let Some(author) = event.author {
        body.push_str(&format!("Author: {}\n", author));
    }
    if let Some(ip) = &event.ip {
        body.push_str(&format!("IP: {}\n", ip));
    }
    body
}

#[async_trait]
impl AlertAdapter for EmailAdapter {
    fn alert_type(&self) -> &str {
        "email"
    }

    async fn send(&self, config: &Value, ctx: &AlertContext<'_>) -> AppResult<()> {
        let config: EmailConfig = decode_config(self.alert_type(), config)?;
        if config.to.is_empty() {
            return Err(AppError::InvalidRecord(
                "Email alert has no recipients".to_string(),
            ));
        }

        let subject = config
            .subject
            .unwrap_or_else(|| format!("[Activity Alerts] Rule {} matched", ctx.rule_id));

        let mut builder = Message::builder().from(self.from.clone()).subject(subject);
        for to in &config.to {
            builder = builder.to(to.parse()?);
        }

        let email = builder
            .header(ContentType::TEXT_PLAIN)
            .body(email_body(ctx))?;

        self.transport.send(email).await?;

        info!(rule_id = ctx.rule_id, recipients = config.to.len(), "Alert email sent");
        Ok(())
    }
}
