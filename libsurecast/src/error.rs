//! Error types for Surecast

use serde::Serialize;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, SurecastError>;

#[derive(Error, Debug)]
pub enum SurecastError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl SurecastError {
    /// Returns the appropriate exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            SurecastError::InvalidInput(_) => 3,
            SurecastError::Dispatch(DispatchError::TerminalRejection(_)) => 2,
            SurecastError::Dispatch(_) => 1,
            SurecastError::Config(_) => 1,
            SurecastError::Storage(_) => 1,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

/// Failures of the durable backings (files, SQLite).
///
/// Stores degrade these to "no cached value" on reads; they only surface
/// to callers on writes.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Database operation failed: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("Migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Typed outcome of a failed outbound action.
///
/// Serializes as `{"kind": "...", "reason": "..."}` in outcome reports.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "reason", rename_all = "snake_case")]
pub enum DispatchError {
    #[error("Transient transport failure: {0}")]
    RetryableTransport(String),

    #[error("Duplicate content rejected: {0}")]
    DuplicateContent(String),

    #[error("Rejected by platform: {0}")]
    TerminalRejection(String),

    #[error("Rate limit exceeded: {0}")]
    RateLimited(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_code_invalid_input() {
        let error = SurecastError::InvalidInput("Empty content".to_string());
        assert_eq!(error.exit_code(), 3);
    }

    #[test]
    fn test_exit_code_terminal_rejection() {
        let error = SurecastError::Dispatch(DispatchError::TerminalRejection(
            "401 Unauthorized".to_string(),
        ));
        assert_eq!(error.exit_code(), 2);
    }

    #[test]
    fn test_exit_code_other_dispatch_errors() {
        for err in [
            DispatchError::RetryableTransport("timeout".to_string()),
            DispatchError::DuplicateContent("dup".to_string()),
            DispatchError::RateLimited("429".to_string()),
        ] {
            assert_eq!(SurecastError::Dispatch(err).exit_code(), 1);
        }
    }

    #[test]
    fn test_exit_code_config_and_storage() {
        let config = SurecastError::Config(ConfigError::MissingField("storage".to_string()));
        assert_eq!(config.exit_code(), 1);

        let storage = SurecastError::Storage(StorageError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "File not found",
        )));
        assert_eq!(storage.exit_code(), 1);
    }

    #[test]
    fn test_error_message_formatting() {
        let error = SurecastError::Dispatch(DispatchError::DuplicateContent(
            "You are not allowed to create a Tweet with duplicate content.".to_string(),
        ));
        assert_eq!(
            error.to_string(),
            "Dispatch error: Duplicate content rejected: You are not allowed to create a Tweet with duplicate content."
        );

        let config = ConfigError::InvalidValue {
            field: "storage.backend".to_string(),
            reason: "expected 'file' or 'sqlite'".to_string(),
        };
        assert_eq!(
            config.to_string(),
            "Invalid value for storage.backend: expected 'file' or 'sqlite'"
        );
    }

    #[test]
    fn test_dispatch_error_serializes_kind_and_reason() {
        let json = serde_json::to_value(DispatchError::TerminalRejection("401".to_string())).unwrap();
        assert_eq!(json, serde_json::json!({"kind": "terminal_rejection", "reason": "401"}));
    }

    #[test]
    fn test_error_conversion_from_dispatch_error() {
        let err: SurecastError = DispatchError::RateLimited("slow down".to_string()).into();
        match err {
            SurecastError::Dispatch(DispatchError::RateLimited(msg)) => {
                assert_eq!(msg, "slow down");
            }
            _ => panic!("Expected SurecastError::Dispatch"),
        }
    }
}
