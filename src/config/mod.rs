//! Configuration management
//!
//! YAML configuration with:
//! - Multiple configuration file locations
//! - Environment variable overrides
//! - Default values for all settings

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::models::UserId;

/// Main application configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub alerts: AlertsConfig,
    /// Roles of known users, consulted by `author_role` triggers
    #[serde(default)]
    pub users: HashMap<UserId, Vec<String>>,
}

/// Database configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_database_url() -> String {
    "sqlite://./data/activity-alerts.db".to_string()
}

fn default_max_connections() -> u32 {
    5
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            max_connections: default_max_connections(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
    /// Log output target (console or file)
    #[serde(default = "default_log_target")]
    pub target: LogTarget,
    /// Directory for log files (used when target is "file")
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    /// Log file name prefix
    #[serde(default = "default_log_prefix")]
    pub log_prefix: String,
    /// Enable daily log rotation
    #[serde(default = "default_log_rotation")]
    pub daily_rotation: bool,
}

/// Log output target
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LogTarget {
    /// Log to stderr
    #[default]
    Console,
    /// Log to file with optional rotation
    File,
    /// Log to both console and file
    Both,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
    Compact,
}

impl LogFormat {
    fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => LogFormat::Json,
            "compact" => LogFormat::Compact,
            _ => LogFormat::Pretty,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> LogFormat {
    LogFormat::Pretty
}

fn default_log_target() -> LogTarget {
    LogTarget::Console
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("/var/log/activity-alerts")
}

fn default_log_prefix() -> String {
    "activity-alerts".to_string()
}

fn default_log_rotation() -> bool {
    true
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            target: default_log_target(),
            log_dir: default_log_dir(),
            log_prefix: default_log_prefix(),
            daily_rotation: default_log_rotation(),
        }
    }
}

/// Compiled-rule cache configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheConfig {
    /// Disable to compile every active rule on each event
    #[serde(default = "default_cache_enabled")]
    pub enabled: bool,
    /// Entry lifetime in seconds; 0 keeps entries until invalidated
    #[serde(default)]
    pub ttl_secs: u64,
}

fn default_cache_enabled() -> bool {
    true
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: default_cache_enabled(),
            ttl_secs: 0,
        }
    }
}

/// Alert delivery configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AlertsConfig {
    /// Default timeout for webhook and Slack requests
    #[serde(default = "default_webhook_timeout")]
    pub webhook_timeout_secs: u64,
    /// Shared secret used to sign webhook payloads
    #[serde(default)]
    pub webhook_secret: Option<String>,
    /// SMTP relay; email alerts are disabled without it
    #[serde(default)]
    pub smtp: Option<SmtpConfig>,
}

fn default_webhook_timeout() -> u64 {
    10
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            webhook_timeout_secs: default_webhook_timeout(),
            webhook_secret: None,
            smtp: None,
        }
    }
}

/// SMTP relay settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SmtpConfig {
    pub host: String,
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default = "default_smtp_from")]
    pub from: String,
    /// Use STARTTLS; disable only for local relays
    #[serde(default = "default_starttls")]
    pub starttls: bool,
}

fn default_smtp_port() -> u16 {
    587
}

fn default_smtp_from() -> String {
    "activity-alerts@localhost".to_string()
}

fn default_starttls() -> bool {
    true
}

impl SmtpConfig {
    fn with_host(host: String) -> Self {
        Self {
            host,
            port: default_smtp_port(),
            username: None,
            password: None,
            from: default_smtp_from(),
            starttls: default_starttls(),
        }
    }
}

impl AppConfig {
    /// Load configuration from file and environment variables
    ///
    /// Configuration is loaded in the following order (later overrides earlier):
    /// 1. Default values
    /// 2. Configuration file (YAML)
    /// 3. Environment variables (prefixed with ACTIVITY_ALERTS_)
    pub fn load() -> Result<Self> {
        // Try to load .env file if it exists
        let _ = dotenvy::dotenv();

        let config_path = std::env::var("ACTIVITY_ALERTS_CONFIG")
            .map(PathBuf::from)
            .ok()
            .or_else(Self::find_config_file);

        let mut config = match config_path {
            Some(ref path) if path.exists() => {
                eprintln!("[CONFIG] Loading configuration from: {:?}", path);
                Self::from_file(path)?
            }
            Some(ref path) => {
                eprintln!("[CONFIG] Config file not found: {:?}, using defaults", path);
                AppConfig::default()
            }
            None => {
                eprintln!("[CONFIG] No config file found, using defaults");
                AppConfig::default()
            }
        };

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Parse a YAML configuration file without applying overrides
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        serde_norway::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {:?}", path))
    }

    /// Find the configuration file in standard locations
    fn find_config_file() -> Option<PathBuf> {
        let paths = [
            // Current directory
            PathBuf::from("activity-alerts.yaml"),
            PathBuf::from("config/activity-alerts.yaml"),
            // System config directory
            PathBuf::from("/etc/activity-alerts/config.yaml"),
            // User config directory
            dirs::config_dir()
                .map(|p| p.join("activity-alerts/config.yaml"))
                .unwrap_or_default(),
        ];

        paths.into_iter().find(|p| p.exists())
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("ACTIVITY_ALERTS_DATABASE_URL") {
            self.database.url = url;
        }

        if let Ok(level) = std::env::var("ACTIVITY_ALERTS_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("ACTIVITY_ALERTS_LOG_FORMAT") {
            self.logging.format = LogFormat::parse(&format);
        }

        if let Ok(enabled) = std::env::var("ACTIVITY_ALERTS_CACHE_ENABLED") {
            if let Ok(enabled) = enabled.parse() {
                self.cache.enabled = enabled;
            }
        }

        if let Ok(secret) = std::env::var("ACTIVITY_ALERTS_WEBHOOK_SECRET") {
            self.alerts.webhook_secret = Some(secret);
        }
        if let Ok(host) = std::env::var("ACTIVITY_ALERTS_SMTP_HOST") {
            match self.alerts.smtp.as_mut() {
                Some(smtp) => smtp.host = host,
                None => self.alerts.smtp = Some(SmtpConfig::with_host(host)),
            }
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.database.url.is_empty() {
            anyhow::bail!("Database URL cannot be empty");
        }

        if self.database.max_connections == 0 {
            anyhow::bail!("Database max_connections cannot be 0");
        }

        if self.alerts.webhook_timeout_secs == 0 {
            anyhow::bail!("Webhook timeout cannot be 0");
        }

        if let Some(ref smtp) = self.alerts.smtp {
            if smtp.host.is_empty() {
                anyhow::bail!("SMTP host cannot be empty");
            }
            if smtp.port == 0 {
                anyhow::bail!("SMTP port cannot be 0");
            }
        }

        if matches!(self.alerts.webhook_secret.as_deref(), Some("")) {
            anyhow::bail!("Webhook secret cannot be empty when set");
        }

        Ok(())
    }
}
