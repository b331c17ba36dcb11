//! Audit event envelope and the closed vocabulary of event kinds.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::registry::CommandPatch;

pub const STATUS_SUCCESS: &str = "success";
pub const STATUS_FAILED: &str = "failed";

/// One immutable audit record.
///
/// On disk the kind payload is flattened next to the envelope fields, e.g.
/// `{"timestamp": "...", "pid": 42, "action": "command_executed", "command": "dir", ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEvent {
    pub timestamp: String,
    pub pid: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(flatten)]
    pub kind: EventKind,
}

/// Every decision or lifecycle step the gateway records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum EventKind {
    ServiceStarted {
        port: String,
        version: String,
    },
    ServiceStopped {
        reason: String,
    },
    ServiceTerminated {
        signal: String,
    },
    ServiceInitialized {
        commands_count: usize,
    },
    UncaughtException {
        error: String,
    },
    ConfigFileCreated {
        path: String,
    },
    ConfigLoaded {
        commands_count: usize,
    },
    ConfigLoadFailed {
        error: String,
    },
    ConfigSaved {
        commands_count: usize,
    },
    ConfigSaveFailed {
        error: String,
    },
    ConfigFileChanged {
        path: String,
        event_type: String,
    },
    CommandNotFound {
        command: String,
    },
    /// Shared by the gate (blocked run, `command` set) and by the management
    /// `disable` action (`name` set).
    CommandDisabled {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        command: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
    },
    DangerousCommandAttempt {
        command: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        args: Option<String>,
    },
    DangerousCommandConfirmed {
        command: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        args: Option<String>,
    },
    DangerousCommandRejected {
        command: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        args: Option<String>,
        reason: String,
    },
    CommandExecuted {
        command: String,
        name: String,
        status: String,
        execution_time: u64,
        output_length: usize,
    },
    CommandFailed {
        command: String,
        name: String,
        status: String,
        execution_time: u64,
        error: String,
    },
    CommandsQueried {
        filter: String,
        detailed: bool,
        count: usize,
    },
    QueryFailed {
        error: String,
    },
    CommandAdded {
        name: String,
    },
    CommandUpdated {
        name: String,
        changes: CommandPatch,
    },
    CommandRemoved {
        name: String,
    },
    CommandEnabled {
        name: String,
    },
    CommandListed {
        count: usize,
    },
    ManagementFailed {
        operation: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        error: String,
    },
    LogsQueried {
        limit: usize,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        filter: Option<String>,
        count: usize,
    },
    LogQueryFailed {
        error: String,
    },
}

impl EventKind {
    /// The `action` tag written for this kind.
    pub fn action(&self) -> &'static str {
        match self {
            EventKind::ServiceStarted { .. } => "service_started",
            EventKind::ServiceStopped { .. } => "service_stopped",
            EventKind::ServiceTerminated { .. } => "service_terminated",
            EventKind::ServiceInitialized { .. } => "service_initialized",
            EventKind::UncaughtException { .. } => "uncaught_exception",
            EventKind::ConfigFileCreated { .. } => "config_file_created",
            EventKind::ConfigLoaded { .. } => "config_loaded",
            EventKind::ConfigLoadFailed { .. } => "config_load_failed",
            EventKind::ConfigSaved { .. } => "config_saved",
            EventKind::ConfigSaveFailed { .. } => "config_save_failed",
            EventKind::ConfigFileChanged { .. } => "config_file_changed",
            EventKind::CommandNotFound { .. } => "command_not_found",
            EventKind::CommandDisabled { .. } => "command_disabled",
            EventKind::DangerousCommandAttempt { .. } => "dangerous_command_attempt",
            EventKind::DangerousCommandConfirmed { .. } => "dangerous_command_confirmed",
            EventKind::DangerousCommandRejected { .. } => "dangerous_command_rejected",
            EventKind::CommandExecuted { .. } => "command_executed",
            EventKind::CommandFailed { .. } => "command_failed",
            EventKind::CommandsQueried { .. } => "commands_queried",
            EventKind::QueryFailed { .. } => "query_failed",
            EventKind::CommandAdded { .. } => "command_added",
            EventKind::CommandUpdated { .. } => "command_updated",
            EventKind::CommandRemoved { .. } => "command_removed",
            EventKind::CommandEnabled { .. } => "command_enabled",
            EventKind::CommandListed { .. } => "command_listed",
            EventKind::ManagementFailed { .. } => "management_failed",
            EventKind::LogsQueried { .. } => "logs_queried",
            EventKind::LogQueryFailed { .. } => "log_query_failed",
        }
    }
}

impl AuditEvent {
    /// Stamp `kind` with the current time and process id.
    pub fn new(kind: EventKind) -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            pid: std::process::id(),
            request_id: None,
            kind,
        }
    }

    pub fn with_request(mut self, request_id: Option<&str>) -> Self {
        self.request_id = request_id.map(str::to_string);
        self
    }

    pub fn action(&self) -> &'static str {
        self.kind.action()
    }

    pub fn command(&self) -> Option<&str> {
        match &self.kind {
            EventKind::CommandNotFound { command }
            | EventKind::DangerousCommandAttempt { command, .. }
            | EventKind::DangerousCommandConfirmed { command, .. }
            | EventKind::DangerousCommandRejected { command, .. }
            | EventKind::CommandExecuted { command, .. }
            | EventKind::CommandFailed { command, .. } => Some(command.as_str()),
            EventKind::CommandDisabled { command, .. } => command.as_deref(),
            _ => None,
        }
    }

    pub fn name(&self) -> Option<&str> {
        match &self.kind {
            EventKind::CommandExecuted { name, .. }
            | EventKind::CommandFailed { name, .. }
            | EventKind::CommandAdded { name }
            | EventKind::CommandUpdated { name, .. }
            | EventKind::CommandRemoved { name }
            | EventKind::CommandEnabled { name } => Some(name.as_str()),
            EventKind::CommandDisabled { name, .. } | EventKind::ManagementFailed { name, .. } => {
                name.as_deref()
            }
            _ => None,
        }
    }

    pub fn status(&self) -> Option<&str> {
        match &self.kind {
            EventKind::CommandExecuted { status, .. } | EventKind::CommandFailed { status, .. } => {
                Some(status.as_str())
            }
            _ => None,
        }
    }

    /// Substring match against `action`, `command` or `name`.
    pub fn matches(&self, filter: &str) -> bool {
        self.action().contains(filter)
            || self.command().is_some_and(|c| c.contains(filter))
            || self.name().is_some_and(|n| n.contains(filter))
    }

    /// One-line rendering: `timestamp [action] Command: x Name: y Status: z`.
    pub fn summary(&self) -> String {
        let mut line = format!("{} [{}]", self.timestamp, self.action());
        if let Some(command) = self.command() {
            line.push_str(&format!(" Command: {}", command));
        }
        if let Some(name) = self.name() {
            line.push_str(&format!(" Name: {}", name));
        }
        if let Some(status) = self.status() {
            line.push_str(&format!(" Status: {}", status));
        }
        line
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn executed() -> AuditEvent {
        AuditEvent::new(EventKind::CommandExecuted {
            command: "dir /tmp".to_string(),
            name: "dir".to_string(),
            status: STATUS_SUCCESS.to_string(),
            execution_time: 12,
            output_length: 340,
        })
    }

    #[test]
    fn test_flat_wire_shape() {
        let event = executed().with_request(Some("req-1"));
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["action"], "command_executed");
        assert_eq!(json["command"], "dir /tmp");
        assert_eq!(json["executionTime"], 12);
        assert_eq!(json["outputLength"], 340);
        assert_eq!(json["requestId"], "req-1");
        assert_eq!(json["pid"], std::process::id());
        assert!(json["timestamp"].as_str().unwrap().ends_with('Z'));
    }

    #[test]
    fn test_reads_back_what_it_writes() {
        let event = AuditEvent::new(EventKind::CommandUpdated {
            name: "echo".to_string(),
            changes: CommandPatch {
                dangerous: Some(true),
                ..Default::default()
            },
        });
        let raw = serde_json::to_string(&event).unwrap();
        let parsed: AuditEvent = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed, event);
    }

    #[test]
    fn test_action_tag_agrees_with_serde() {
        let kinds = vec![
            EventKind::ConfigLoadFailed { error: "x".to_string() },
            EventKind::CommandDisabled { command: None, name: Some("dir".to_string()) },
            EventKind::DangerousCommandRejected {
                command: "format".to_string(),
                args: None,
                reason: "invalid_token".to_string(),
            },
            EventKind::LogsQueried { limit: 5, filter: None, count: 0 },
        ];
        for kind in kinds {
            let json = serde_json::to_value(&kind).unwrap();
            assert_eq!(json["action"], kind.action());
        }
    }

    #[test]
    fn test_filter_matches_action_command_or_name() {
        let event = executed();
        assert!(event.matches("executed"));
        assert!(event.matches("/tmp"));
        assert!(event.matches("dir"));
        assert!(!event.matches("failed"));

        let removed = AuditEvent::new(EventKind::CommandRemoved { name: "backup".to_string() });
        assert!(removed.matches("back"));
        assert!(removed.command().is_none());
    }

    #[test]
    fn test_summary_line() {
        let line = executed().summary();
        assert!(line.contains("[command_executed]"));
        assert!(line.contains("Command: dir /tmp"));
        assert!(line.contains("Name: dir"));
        assert!(line.ends_with("Status: success"));

        let started = AuditEvent::new(EventKind::ServiceStarted {
            port: "stdio".to_string(),
            version: "0.1.0".to_string(),
        });
        assert!(started.summary().ends_with("[service_started]"));
    }

    #[test]
    fn test_unknown_action_is_rejected() {
        let raw = r#"{"timestamp":"2024-01-01T00:00:00.000Z","pid":1,"action":"made_up"}"#;
        assert!(serde_json::from_str::<AuditEvent>(raw).is_err());
    }
}
