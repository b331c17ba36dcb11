//! Gateway facade: the operations the transport layer calls.
//!
//! Each operation loads the registry from disk, decides, acts, records exactly
//! the audit events that describe what happened, and returns a text block.
//! No per-request failure escapes as an error.

pub mod format;
#[cfg(all(test, unix))]
mod tests;

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::audit::{AuditEvent, AuditLog, EventKind, MAX_QUERY_LIMIT, STATUS_FAILED, STATUS_SUCCESS};
use crate::error::{GatewayError, Result};
use crate::registry::{CommandDefinition, CommandPatch, RegistryStore};
use crate::security::{self, GateDecision};
use crate::shell::ShellRunner;

/// Log entries returned when the caller gives no limit.
pub const DEFAULT_LOG_LIMIT: usize = 50;

/// Text handed back to the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayResponse {
    pub text: String,
    /// Set only when a dangerous command is waiting for the confirmation phrase.
    pub requires_confirmation: bool,
}

impl GatewayResponse {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            requires_confirmation: false,
        }
    }

    pub fn confirmation(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            requires_confirmation: true,
        }
    }
}

/// Which registry entries `query_commands` returns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandFilter {
    #[default]
    All,
    Enabled,
    Disabled,
    Dangerous,
}

impl CommandFilter {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandFilter::All => "all",
            CommandFilter::Enabled => "enabled",
            CommandFilter::Disabled => "disabled",
            CommandFilter::Dangerous => "dangerous",
        }
    }

    pub fn matches(&self, def: &CommandDefinition) -> bool {
        match self {
            CommandFilter::All => true,
            CommandFilter::Enabled => def.enabled,
            CommandFilter::Disabled => !def.enabled,
            CommandFilter::Dangerous => def.dangerous,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ManageAction {
    Add,
    Update,
    Remove,
    Enable,
    Disable,
    List,
}

impl ManageAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ManageAction::Add => "add",
            ManageAction::Update => "update",
            ManageAction::Remove => "remove",
            ManageAction::Enable => "enable",
            ManageAction::Disable => "disable",
            ManageAction::List => "list",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteRequest {
    pub name: String,
    #[serde(default)]
    pub args: Option<String>,
    #[serde(default)]
    pub confirmation_token: Option<String>,
    #[serde(default)]
    pub request_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryCommandsRequest {
    #[serde(default)]
    pub filter: CommandFilter,
    #[serde(default)]
    pub detailed: bool,
    #[serde(default)]
    pub request_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManageCommandRequest {
    pub action: ManageAction,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(flatten)]
    pub patch: CommandPatch,
    #[serde(default)]
    pub request_id: Option<String>,
}

impl ManageCommandRequest {
    pub fn new(action: ManageAction, name: Option<&str>) -> Self {
        Self {
            action,
            name: name.map(str::to_string),
            patch: CommandPatch::default(),
            request_id: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryLogsRequest {
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub filter: Option<String>,
    #[serde(default)]
    pub request_id: Option<String>,
}

/// Registry change made by a management action.
enum Mutation {
    Added,
    Updated(CommandPatch),
    Removed,
    Enabled,
    Disabled,
}

pub struct Gateway {
    registry: RegistryStore,
    audit: Arc<dyn AuditLog>,
    runner: ShellRunner,
    port: String,
}

impl Gateway {
    pub fn new(registry: RegistryStore, audit: Arc<dyn AuditLog>, runner: ShellRunner) -> Self {
        Self {
            registry,
            audit,
            runner,
            port: "stdio".to_string(),
        }
    }

    pub fn with_port(mut self, port: impl Into<String>) -> Self {
        self.port = port.into();
        self
    }

    pub fn registry(&self) -> &RegistryStore {
        &self.registry
    }

    pub fn audit(&self) -> Arc<dyn AuditLog> {
        Arc::clone(&self.audit)
    }

    fn record(&self, kind: EventKind, request_id: Option<&str>) {
        self.audit.record(AuditEvent::new(kind).with_request(request_id));
    }

    // ---------------------------------------------------------------------
    // Lifecycle
    // ---------------------------------------------------------------------

    /// Prepare the registry for serving.
    ///
    /// Seeds the default registry on first run and verifies the file is
    /// readable and writable. Only the access check is fatal; a registry that
    /// fails to load is recorded and the service starts with zero commands.
    pub fn initialize(&self) -> Result<usize> {
        match self.registry.bootstrap() {
            Ok(true) => self.record(
                EventKind::ConfigFileCreated {
                    path: self.registry.path().display().to_string(),
                },
                None,
            ),
            Ok(false) => {}
            Err(e) => warn!("Could not seed command registry: {}", e),
        }

        self.registry.check_access()?;

        let count = match self.registry.load() {
            Ok(commands) => {
                self.record(EventKind::ConfigLoaded { commands_count: commands.len() }, None);
                commands.len()
            }
            Err(e) => {
                warn!("Command registry failed to load: {}", e);
                self.record(EventKind::ConfigLoadFailed { error: e.to_string() }, None);
                0
            }
        };
        self.record(EventKind::ServiceInitialized { commands_count: count }, None);
        info!("Gateway initialized with {} commands", count);
        Ok(count)
    }

    pub fn record_started(&self) {
        self.record(
            EventKind::ServiceStarted {
                port: self.port.clone(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            None,
        );
    }

    pub fn record_stopped(&self, reason: &str) {
        self.record(EventKind::ServiceStopped { reason: reason.to_string() }, None);
    }

    pub fn record_terminated(&self, signal: &str) {
        self.record(EventKind::ServiceTerminated { signal: signal.to_string() }, None);
    }

    pub fn record_uncaught(&self, error: &str, request_id: Option<&str>) {
        self.record(EventKind::UncaughtException { error: error.to_string() }, request_id);
    }

    // ---------------------------------------------------------------------
    // Operations
    // ---------------------------------------------------------------------

    /// Gate and, when allowed, run a registry command.
    pub async fn execute(&self, req: &ExecuteRequest) -> GatewayResponse {
        let rid = req.request_id.as_deref();
        let commands = match self.registry.load() {
            Ok(commands) => commands,
            Err(e) => {
                self.record(EventKind::ConfigLoadFailed { error: e.to_string() }, rid);
                return GatewayResponse::text(format!("Error: could not load command registry: {}", e));
            }
        };

        let name = req.name.trim();
        let args = req.args.as_deref().map(str::trim).filter(|a| !a.is_empty());
        let entry = commands.iter().find(|c| c.name == name);

        let decision = security::evaluate(entry, req.confirmation_token.as_deref());
        if let Some(kind) = decision.audit_kind(name, args) {
            self.record(kind, rid);
        }

        match decision {
            GateDecision::Allowed { .. } => {
                let line = format::command_line(name, args);
                self.run_and_record(name, &line, rid).await
            }
            GateDecision::Blocked(reason) => {
                info!("Refused: {}", reason.error(name));
                GatewayResponse::text(format::blocked(name, reason))
            }
            GateDecision::PendingConfirmation { prompt, consequences } => {
                let line = format::command_line(name, args);
                GatewayResponse::confirmation(format::confirmation_request(&line, &prompt, &consequences))
            }
        }
    }

    async fn run_and_record(&self, name: &str, line: &str, rid: Option<&str>) -> GatewayResponse {
        match self.runner.run(line).await {
            Ok(outcome) => {
                self.record(
                    EventKind::CommandExecuted {
                        command: line.to_string(),
                        name: name.to_string(),
                        status: STATUS_SUCCESS.to_string(),
                        execution_time: millis(outcome.elapsed),
                        output_length: outcome.output.len(),
                    },
                    rid,
                );
                GatewayResponse::text(outcome.output)
            }
            Err(failure) => {
                warn!("{}", GatewayError::from(failure.clone()));
                self.record(
                    EventKind::CommandFailed {
                        command: line.to_string(),
                        name: name.to_string(),
                        status: STATUS_FAILED.to_string(),
                        execution_time: millis(failure.elapsed),
                        error: failure.message.clone(),
                    },
                    rid,
                );
                GatewayResponse::text(format!("Error executing '{}': {}", line, failure.message))
            }
        }
    }

    /// List registry entries matching a filter.
    pub fn query_commands(&self, req: &QueryCommandsRequest) -> GatewayResponse {
        let rid = req.request_id.as_deref();
        let commands = match self.registry.load() {
            Ok(commands) => commands,
            Err(e) => {
                self.record(EventKind::ConfigLoadFailed { error: e.to_string() }, rid);
                self.record(EventKind::QueryFailed { error: e.to_string() }, rid);
                return GatewayResponse::text(format!("Error querying commands: {}", e));
            }
        };

        let matched: Vec<&CommandDefinition> =
            commands.iter().filter(|c| req.filter.matches(c)).collect();
        self.record(
            EventKind::CommandsQueried {
                filter: req.filter.as_str().to_string(),
                detailed: req.detailed,
                count: matched.len(),
            },
            rid,
        );
        GatewayResponse::text(format::command_list(&matched, req.filter, req.detailed))
    }

    /// Add, update, remove, enable, disable or list registry entries.
    pub fn manage_command(&self, req: &ManageCommandRequest) -> GatewayResponse {
        let rid = req.request_id.as_deref();
        let operation = req.action.as_str();
        let name = req.name.as_deref().map(str::trim).filter(|n| !n.is_empty());

        let mut commands = match self.registry.load() {
            Ok(commands) => commands,
            Err(e) => {
                self.record(EventKind::ConfigLoadFailed { error: e.to_string() }, rid);
                self.fail_management(operation, name, &e.to_string(), rid);
                return GatewayResponse::text(format!("Error managing commands: {}", e));
            }
        };

        if req.action == ManageAction::List {
            self.record(EventKind::CommandListed { count: commands.len() }, rid);
            return GatewayResponse::text(format::registry_overview(&commands));
        }

        let Some(name) = name else {
            let message = format!("A command name is required for the '{}' action.", operation);
            self.fail_management(operation, None, &message, rid);
            return GatewayResponse::text(format!("Error: {}", message));
        };

        let mutation = match apply_action(&mut commands, req.action, name, &req.patch) {
            Ok(mutation) => mutation,
            Err(message) => {
                self.fail_management(operation, Some(name), &message, rid);
                return GatewayResponse::text(format!("Error: {}", message));
            }
        };

        let saved = self.registry.save(&commands);
        match &saved {
            Ok(()) => self.record(EventKind::ConfigSaved { commands_count: commands.len() }, rid),
            Err(e) => {
                warn!("Registry change for '{}' not persisted: {}", name, e);
                self.record(EventKind::ConfigSaveFailed { error: e.to_string() }, rid);
            }
        }

        let owned = name.to_string();
        let (kind, mut text) = match mutation {
            Mutation::Added => (
                EventKind::CommandAdded { name: owned },
                format!("Command '{}' added successfully.", name),
            ),
            Mutation::Updated(changes) => (
                EventKind::CommandUpdated { name: owned, changes },
                format!("Command '{}' updated successfully.", name),
            ),
            Mutation::Removed => (
                EventKind::CommandRemoved { name: owned },
                format!("Command '{}' removed successfully.", name),
            ),
            Mutation::Enabled => (
                EventKind::CommandEnabled { name: owned },
                format!("Command '{}' enabled.", name),
            ),
            Mutation::Disabled => (
                EventKind::CommandDisabled { command: None, name: Some(owned) },
                format!("Command '{}' disabled.", name),
            ),
        };
        self.record(kind, rid);

        if let Err(e) = saved {
            text.push_str(&format!("\nWarning: change applied in memory but not persisted: {}", e));
        }
        GatewayResponse::text(text)
    }

    fn fail_management(&self, operation: &str, name: Option<&str>, error: &str, rid: Option<&str>) {
        self.record(
            EventKind::ManagementFailed {
                operation: operation.to_string(),
                name: name.map(str::to_string),
                error: error.to_string(),
            },
            rid,
        );
    }

    /// Recent audit events, newest first, one summary line each.
    pub fn query_logs(&self, req: &QueryLogsRequest) -> GatewayResponse {
        let rid = req.request_id.as_deref();
        let limit = req.limit.unwrap_or(DEFAULT_LOG_LIMIT).clamp(1, MAX_QUERY_LIMIT);
        let filter = req.filter.as_deref().map(str::trim).filter(|f| !f.is_empty());

        match self.audit.query(limit, filter) {
            Ok(events) => {
                self.record(
                    EventKind::LogsQueried {
                        limit,
                        filter: filter.map(str::to_string),
                        count: events.len(),
                    },
                    rid,
                );
                GatewayResponse::text(format::log_lines(&events))
            }
            Err(e) => {
                self.record(EventKind::LogQueryFailed { error: e.to_string() }, rid);
                GatewayResponse::text(format!("Error querying logs: {}", e))
            }
        }
    }

    /// Every definition as pretty JSON.
    pub fn list_definitions(&self) -> GatewayResponse {
        let rendered = self
            .registry
            .load()
            .and_then(|commands| serde_json::to_string_pretty(&commands).map_err(GatewayError::from));
        match rendered {
            Ok(json) => GatewayResponse::text(json),
            Err(e) => GatewayResponse::text(format!("Error reading command registry: {}", e)),
        }
    }

    /// One definition as pretty JSON.
    pub fn get_definition(&self, name: &str) -> GatewayResponse {
        let commands = match self.registry.load() {
            Ok(commands) => commands,
            Err(e) => return GatewayResponse::text(format!("Error reading command registry: {}", e)),
        };
        match commands.iter().find(|c| c.name == name.trim()) {
            Some(def) => match serde_json::to_string_pretty(def) {
                Ok(json) => GatewayResponse::text(json),
                Err(e) => GatewayResponse::text(format!("Error rendering command '{}': {}", name, e)),
            },
            None => GatewayResponse::text(format!("Command '{}' not found", name.trim())),
        }
    }
}

/// Apply one mutating action in place. Errors are user-facing messages.
fn apply_action(
    commands: &mut Vec<CommandDefinition>,
    action: ManageAction,
    name: &str,
    patch: &CommandPatch,
) -> std::result::Result<Mutation, String> {
    let position = commands.iter().position(|c| c.name == name);
    let not_found = || format!("Command '{}' not found.", name);

    match action {
        ManageAction::Add => {
            if position.is_some() {
                return Err(format!("Command '{}' already exists.", name));
            }
            commands.push(CommandDefinition::from_patch(name, patch));
            Ok(Mutation::Added)
        }
        ManageAction::Update => {
            let idx = position.ok_or_else(not_found)?;
            if patch.is_empty() {
                return Err(format!("No changes specified for command '{}'.", name));
            }
            commands[idx].apply(patch);
            Ok(Mutation::Updated(patch.clone()))
        }
        ManageAction::Remove => {
            let idx = position.ok_or_else(not_found)?;
            commands.remove(idx);
            Ok(Mutation::Removed)
        }
        ManageAction::Enable | ManageAction::Disable => {
            let idx = position.ok_or_else(not_found)?;
            let enable = action == ManageAction::Enable;
            commands[idx].enabled = enable;
            Ok(if enable { Mutation::Enabled } else { Mutation::Disabled })
        }
        ManageAction::List => Err("'list' does not modify the registry.".to_string()),
    }
}

fn millis(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}
