//! Error types for the ALG harness
//!
//! Errors are resolved at the nearest step or test-case boundary. The
//! orchestrator only needs to tell two classes apart: assertion-style
//! failures (observed evidence differs from what was expected) and
//! everything else.

use std::io;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the harness
#[derive(Error, Debug)]
pub enum Error {
    // === Remote Host Errors ===
    #[error("Failed to connect to {target}: {reason}")]
    ConnectionFailed { target: String, reason: String },

    #[error("Remote command on {target} failed with status {status:?}: {command} ({stderr})")]
    RemoteCommand {
        target: String,
        command: String,
        status: Option<i32>,
        stderr: String,
    },

    #[error("File transfer with {target} failed for '{path}': {reason}")]
    TransferFailed {
        target: String,
        path: String,
        reason: String,
    },

    #[error("Failed to start {name} process: {reason}")]
    ProcessStartFailed { name: String, reason: String },

    #[error("Command timed out after {0} seconds")]
    Timeout(u64),

    // === REST API Errors ===
    #[error("API key '{key}' not found in {file}")]
    UnknownApi { key: String, file: String },

    #[error("API call failed: {0}")]
    Api(String),

    // === Oracle Errors ===
    #[error("Assertion failed: {0}")]
    Assertion(String),

    #[error("Invalid search pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    #[error("Invalid config path '{path}': {reason}")]
    InvalidTreePath { path: String, reason: String },

    // === Configuration Errors ===
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(String),

    // === IO Errors ===
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to read file '{path}': {error}")]
    FileRead { path: String, error: String },

    // === Serialization Errors ===
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    // === Internal Errors ===
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create an assertion failure
    pub fn assertion(message: impl Into<String>) -> Self {
        Self::Assertion(message.into())
    }

    /// Create a connection failure for a target
    pub fn connection_failed(target: &str, reason: impl std::fmt::Display) -> Self {
        Self::ConnectionFailed {
            target: target.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Create a file read error that keeps the path
    pub fn file_read(path: &std::path::Path, error: io::Error) -> Self {
        Self::FileRead {
            path: path.display().to_string(),
            error: error.to_string(),
        }
    }

    /// Create an error for a config value that must be set
    pub fn missing_config(section: &str, field: &str) -> Self {
        Self::Config(format!("[{section}] {field} is not configured"))
    }

    /// Assertion-style failures are expected outcomes of a test and are
    /// reported without a source chain
    pub fn is_assertion(&self) -> bool {
        matches!(self, Self::Assertion(_))
    }
}

/// Render an error together with its `source()` chain, one cause per line.
///
/// This is what gets logged for unexpected failures in place of a stack
/// trace.
pub fn error_chain(error: &(dyn std::error::Error + 'static)) -> String {
    let mut rendered = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        rendered.push_str("\n  caused by: ");
        rendered.push_str(&cause.to_string());
        source = cause.source();
    }
    rendered
}
