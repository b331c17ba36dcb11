//! Runtime configuration for the gateway.
//!
//! All settings come from environment variables with defaults rooted at
//! `~/.cmd-gateway/`, so the binary runs with no setup at all.

use std::path::{Path, PathBuf};
use std::time::Duration;

/// Locations and knobs the gateway needs at startup.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// JSON file holding the command registry.
    pub registry_path: PathBuf,
    /// Directory holding the daily audit partitions.
    pub log_dir: PathBuf,
    /// Directory for diagnostic tracing output.
    pub trace_dir: PathBuf,
    /// Listening identifier, only used for display and audit.
    pub port: String,
    /// Upper bound on a single command's runtime. `None` never interrupts.
    pub exec_timeout: Option<Duration>,
}

impl GatewayConfig {
    /// Build a config for an explicit registry file and audit directory.
    ///
    /// Diagnostics go to a `trace` directory next to the audit logs.
    pub fn new(registry_path: impl Into<PathBuf>, log_dir: impl Into<PathBuf>) -> Self {
        let log_dir = log_dir.into();
        let trace_dir = log_dir
            .parent()
            .map(|p| p.join("trace"))
            .unwrap_or_else(|| PathBuf::from("trace"));
        Self {
            registry_path: registry_path.into(),
            log_dir,
            trace_dir,
            port: "stdio".to_string(),
            exec_timeout: None,
        }
    }

    /// Read the configuration from `CMD_GATEWAY_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let home = lookup("CMD_GATEWAY_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(default_home);

        let path_or = |key: &str, fallback: &str| -> PathBuf {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(|| home.join(fallback))
        };

        let exec_timeout = lookup("CMD_GATEWAY_EXEC_TIMEOUT_SECS")
            .and_then(|v| v.trim().parse::<u64>().ok())
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs);

        Self {
            registry_path: path_or("CMD_GATEWAY_REGISTRY", "commands.json"),
            log_dir: path_or("CMD_GATEWAY_LOG_DIR", "logs"),
            trace_dir: path_or("CMD_GATEWAY_TRACE_DIR", "trace"),
            port: lookup("CMD_GATEWAY_PORT").unwrap_or_else(|| "stdio".to_string()),
            exec_timeout,
        }
    }

    pub fn registry_path(&self) -> &Path {
        &self.registry_path
    }

    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }
}

fn default_home() -> PathBuf {
    let home = std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    home.join(".cmd-gateway")
}
