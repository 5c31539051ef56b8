//! Activity Alerts - match activity-log events against notification rules
//!
//! Reads newline-delimited JSON events from stdin, evaluates each one against
//! every active rule stored in the configured SQLite database and delivers the
//! matching rules' alerts. One JSON result line per event is written to stdout.

use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::json;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::{fmt, prelude::*, EnvFilter, Layer, Registry};

use activity_alerts::config::{LogFormat, LogTarget, LoggingConfig};
use activity_alerts::models::{Event, EventId, SaveRuleRequest};
use activity_alerts::services::{build_registry, StaticUserDirectory};
use activity_alerts::{build_monitor, db, AppConfig, RuleMonitor, SqliteRuleStore};

/// One line of input
#[derive(Debug, Deserialize)]
struct IncomingEvent {
    id: EventId,
    event: Event,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();

    if args.iter().any(|arg| arg == "--help" || arg == "-h") {
        print_help();
        return Ok(());
    }

    if args.iter().any(|arg| arg == "--version" || arg == "-V") {
        println!("Activity Alerts {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let rules_file = args
        .iter()
        .position(|arg| arg == "--rules")
        .map(|i| {
            args.get(i + 1)
                .map(PathBuf::from)
                .context("--rules requires a file path")
        })
        .transpose()?;

    // Load configuration first (before logging, so we know log format)
    let config = AppConfig::load().context("Failed to load configuration")?;

    // The guard must outlive the program so file logs are flushed
    let _log_guard = init_logging(&config.logging);

    info!("Activity Alerts starting up");

    ensure_data_directory(&config)?;

    let pool = db::init_pool(&config.database)
        .await
        .context("Failed to initialize database")?;
    let store = Arc::new(SqliteRuleStore::new(pool));

    let mut users = StaticUserDirectory::new();
    for (user_id, roles) in &config.users {
        users.insert(*user_id, roles.iter().cloned());
    }

    let registry =
        build_registry(&config.alerts).context("Failed to initialize alert adapters")?;
    info!(adapters = ?registry.alert_types(), "Alert adapters registered");

    let monitor = build_monitor(
        &config,
        store.clone(),
        store.clone(),
        Arc::new(users),
        registry,
    );

    if let Some(path) = rules_file {
        import_rules(&store, &monitor, &path).await?;
    }

    process_events(&monitor).await
}

/// Store every rule from a JSON array file
async fn import_rules(store: &SqliteRuleStore, monitor: &RuleMonitor, path: &Path) -> Result<()> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read rules file: {:?}", path))?;
    let rules: Vec<SaveRuleRequest> = serde_json::from_str(&contents)
        .with_context(|| format!("Failed to parse rules file: {:?}", path))?;

    for rule in &rules {
        let id = store
            .save_rule(rule)
            .await
            .with_context(|| format!("Failed to save rule {:?}", rule.name))?;
        info!(rule_id = id, name = %rule.name, "Rule imported");
    }

    monitor.on_rule_saved().await;
    Ok(())
}

/// Evaluate each stdin line until end of input
async fn process_events(monitor: &RuleMonitor) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut processed = 0usize;

    while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
        if line.trim().is_empty() {
            continue;
        }

        let incoming: IncomingEvent = match serde_json::from_str(&line) {
            Ok(incoming) => incoming,
            Err(e) => {
                warn!(error = %e, "Skipping malformed event line");
                continue;
            }
        };

        let outcome = monitor.on_event(incoming.id, &incoming.event).await;
        processed += 1;

        println!(
            "{}",
            json!({
                "id": incoming.id,
                "matched": outcome.matched,
                "sent": outcome.report.sent,
                "skipped": outcome.report.skipped,
                "failed": outcome.report.failed,
            })
        );
    }

    info!(events = processed, "Input exhausted, shutting down");
    Ok(())
}

/// Initialize logging based on configuration
///
/// Returns the appender guard when logging to a file.
fn init_logging(log_config: &LoggingConfig) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log_config.level));

    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();
    let mut guard = None;

    if matches!(log_config.target, LogTarget::Console | LogTarget::Both) {
        // stdout carries results, so console logs go to stderr
        layers.push(fmt_layer(&log_config.format, std::io::stderr));
    }

    if matches!(log_config.target, LogTarget::File | LogTarget::Both) {
        let (writer, file_guard) = create_file_writer(log_config);
        layers.push(fmt_layer(&log_config.format, writer));
        guard = Some(file_guard);
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(env_filter)
        .init();

    guard
}

fn fmt_layer<W>(format: &LogFormat, writer: W) -> Box<dyn Layer<Registry> + Send + Sync>
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    match format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_target(true)
            .with_writer(writer)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_target(false)
            .with_writer(writer)
            .boxed(),
        LogFormat::Pretty => fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .with_writer(writer)
            .boxed(),
    }
}

/// Create a file writer with optional daily rotation
fn create_file_writer(
    log_config: &LoggingConfig,
) -> (
    tracing_appender::non_blocking::NonBlocking,
    tracing_appender::non_blocking::WorkerGuard,
) {
    if let Err(e) = std::fs::create_dir_all(&log_config.log_dir) {
        eprintln!(
            "Warning: Failed to create log directory {:?}: {}",
            log_config.log_dir, e
        );
    }

    let file_appender = if log_config.daily_rotation {
        tracing_appender::rolling::daily(&log_config.log_dir, &log_config.log_prefix)
    } else {
        tracing_appender::rolling::never(&log_config.log_dir, &log_config.log_prefix)
    };

    tracing_appender::non_blocking(file_appender)
}

fn ensure_data_directory(config: &AppConfig) -> Result<()> {
    if let Some(path) = config.database.url.strip_prefix("sqlite://") {
        if let Some(parent) = Path::new(path).parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).context("Failed to create data directory")?;
                info!("Created data directory: {:?}", parent);
            }
        }
    }
    Ok(())
}

fn print_help() {
    println!(
        r#"Activity Alerts {}

USAGE:
    activity-alerts [OPTIONS] < events.ndjson

Each input line is a JSON object {{"id": <event id>, "event": {{...}}}}.
For every event one JSON line with the matched rule ids and delivery
counts is written to stdout.

OPTIONS:
    -h, --help              Print this help message
    -V, --version           Print version information
    --rules <FILE>          Store the rules in FILE (a JSON array) before
                            reading events

ENVIRONMENT:
    ACTIVITY_ALERTS_CONFIG          Path to configuration file
    ACTIVITY_ALERTS_DATABASE_URL    Overrides database.url
    ACTIVITY_ALERTS_LOG_LEVEL       Overrides logging.level
    ACTIVITY_ALERTS_CACHE_ENABLED   Overrides cache.enabled
    ACTIVITY_ALERTS_SMTP_HOST       Enables email alerts through this relay

CONFIGURATION:
    The configuration file is looked up in the following order:
    1. Path specified by ACTIVITY_ALERTS_CONFIG
    2. ./activity-alerts.yaml
    3. ./config/activity-alerts.yaml
    4. /etc/activity-alerts/config.yaml
    5. <user config dir>/activity-alerts/config.yaml"#,
        env!("CARGO_PKG_VERSION")
    );
}
