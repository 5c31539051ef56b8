//! Error types and handling
//!
//! `CompileError` describes why a single rule could not be compiled; it never
//! escapes the compiler as a fatal error. `AppError` covers the collaborators
//! around the core: storage, cache, delivery and configuration.

use thiserror::Error;

use crate::models::GroupId;

/// Reasons a rule's stored records cannot be turned into a condition tree
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    /// A trigger or group references a group that does not exist
    #[error("unknown group {group}")]
    UnknownGroup { group: GroupId },

    /// Following parent links from a group never reaches the root
    #[error("group {group} is part of a parent cycle")]
    GroupCycle { group: GroupId },

    /// The rule has no triggers, so its condition would match everything
    #[error("rule has no triggers")]
    EmptyCondition,
}

/// Application error types
#[derive(Debug, Error)]
pub enum AppError {
    /// Rule source or counter store failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// Cache backend failure
    #[error("Cache error: {0}")]
    Cache(String),

    /// Alert adapter could not deliver
    #[error("Delivery error: {0}")]
    Delivery(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// A stored record could not be decoded
    #[error("Invalid record: {0}")]
    InvalidRecord(String),
}

// Implement From for common error types

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => AppError::Storage("Record not found".to_string()),
            _ => AppError::Storage(err.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for AppError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        AppError::Storage(format!("Migration failed: {}", err))
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            AppError::Delivery("Request timed out".to_string())
        } else if err.is_connect() {
            AppError::Delivery("Failed to connect".to_string())
        } else {
            AppError::Delivery(err.to_string())
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::InvalidRecord(format!("JSON parsing error: {}", err))
    }
}

impl From<lettre::error::Error> for AppError {
    fn from(err: lettre::error::Error) -> Self {
        AppError::Delivery(format!("Failed to build email: {}", err))
    }
}

impl From<lettre::address::AddressError> for AppError {
    fn from(err: lettre::address::AddressError) -> Self {
        AppError::Delivery(format!("Invalid email address: {}", err))
    }
}

impl From<lettre::transport::smtp::Error> for AppError {
    fn from(err: lettre::transport::smtp::Error) -> Self {
        AppError::Delivery(format!("SMTP error: {}", err))
    }
}

/// Result type alias for fallible operations
pub type AppResult<T> = Result<T, AppError>;
