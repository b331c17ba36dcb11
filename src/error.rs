//! Error types for the command gateway.
//!
//! Startup failures (`ConfigAccess`) are fatal to the service. Everything else
//! is recovered at the gateway boundary and turned into a text response.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Command registry not found at {}", .0.display())]
    ConfigMissing(PathBuf),

    #[error("Command registry at {} is corrupt: {reason}", path.display())]
    ConfigCorrupt { path: PathBuf, reason: String },

    #[error("Failed to save command registry: {0}")]
    ConfigSaveFailed(String),

    #[error("Cannot read and write command registry at {}: {source}", path.display())]
    ConfigAccess {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Command '{0}' not found")]
    CommandNotFound(String),

    #[error("Command '{0}' is disabled")]
    CommandDisabled(String),

    #[error("Invalid confirmation token for command '{0}'")]
    InvalidConfirmationToken(String),

    #[error("Command execution failed: {0}")]
    Execution(String),

    #[error("Log partition {} is unreadable: {reason}", path.display())]
    LogPartitionUnreadable { path: PathBuf, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, GatewayError>;
