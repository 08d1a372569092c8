//! Error types for netreach
//!
//! Connection errors are caught by the plan executor and judged against the
//! expected outcome of each test case. Everything else is fatal and ends the
//! run with a non-zero exit status.

use std::io;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for netreach
#[derive(Error, Debug)]
pub enum Error {
    // === Test Plan Errors ===
    #[error("Failed to read test plan '{path}': {error}")]
    PlanRead { path: String, error: String },

    #[error("Invalid test plan: {0}")]
    PlanParse(String),

    // === Inventory Errors ===
    #[error("Failed to read inventory '{path}': {error}")]
    InventoryRead { path: String, error: String },

    #[error("Invalid inventory: {0}")]
    InventoryParse(String),

    #[error("No inventory configured. Pass --inventory or create {0}")]
    InventoryMissing(String),

    // === Configuration Errors ===
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(String),

    #[error("System domain is not set. Pass --domain or set 'system_domain' in the config file")]
    DomainMissing,

    // === SSH Errors ===
    #[error("SSH client '{0}' not found in PATH")]
    SshNotFound(String),

    #[error("Failed to spawn ssh: {0}")]
    SshSpawn(#[source] io::Error),

    #[error("Could not connect to {host}: {reason}")]
    ConnectFailed { host: String, reason: String },

    #[error("Session to {0} is not connected")]
    NotConnected(String),

    #[error("Command '{command}' on {host} exited with {status}: {stderr}")]
    CommandFailed {
        host: String,
        command: String,
        status: String,
        stderr: String,
    },

    #[error("Command on {host} returned '{actual}', expected '{expected}'")]
    UnexpectedOutput {
        host: String,
        expected: String,
        actual: String,
    },

    #[error("ssh to {host} timed out after {secs} seconds")]
    Timeout { host: String, secs: u64 },

    // === IO Errors ===
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    // === Serialization Errors ===
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create a connection failure for a host
    pub fn connect_failed(host: &str, reason: &str) -> Self {
        Self::ConnectFailed {
            host: host.to_string(),
            reason: reason.trim().to_string(),
        }
    }

    /// Create a timeout error for a host
    pub fn timeout(host: &str, secs: u64) -> Self {
        Self::Timeout {
            host: host.to_string(),
            secs,
        }
    }

    /// Create an unexpected output error
    pub fn unexpected_output(host: &str, expected: &str, actual: &str) -> Self {
        Self::UnexpectedOutput {
            host: host.to_string(),
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }

    /// Whether this error came from talking to a remote host rather than from
    /// local setup
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Error::ConnectFailed { .. }
                | Error::NotConnected(_)
                | Error::CommandFailed { .. }
                | Error::UnexpectedOutput { .. }
                | Error::Timeout { .. }
        )
    }
}
