//! End-to-end scenarios for the gateway facade.

use std::fs;
use std::sync::Arc;

use chrono::NaiveDate;
use tempfile::TempDir;

use crate::audit::{AuditEvent, AuditLog, EventKind, FileAuditLog, MemoryAuditLog, STATUS_FAILED};
use crate::gateway::{
    CommandFilter, ExecuteRequest, Gateway, ManageAction, ManageCommandRequest, QueryCommandsRequest,
    QueryLogsRequest,
};
use crate::registry::{default_commands, CommandDefinition, CommandPatch, RegistryStore};
use crate::security::CONFIRMATION_PHRASE;
use crate::shell::ShellRunner;

struct Fixture {
    dir: TempDir,
    gateway: Gateway,
    audit: Arc<MemoryAuditLog>,
    store: RegistryStore,
}

impl Fixture {
    fn registry_bytes(&self) -> Vec<u8> {
        fs::read(self.store.path()).unwrap()
    }
}

/// echo: safe. printf: dangerous and enabled. false: safe, always fails.
/// format: the default dangerous, disabled entry.
fn test_commands() -> Vec<CommandDefinition> {
    vec![
        CommandDefinition {
            description: "Print text".to_string(),
            ..CommandDefinition::new("echo")
        },
        CommandDefinition {
            description: "Formatted print".to_string(),
            dangerous: true,
            confirmation_prompt: "printf can print anything. Continue?".to_string(),
            consequences: "Text appears on stdout.".to_string(),
            ..CommandDefinition::new("printf")
        },
        CommandDefinition::new("false"),
        default_commands().remove(2),
    ]
}

fn fixture(commands: &[CommandDefinition]) -> Fixture {
    let dir = TempDir::new().unwrap();
    let store = RegistryStore::new(dir.path().join("commands.json"));
    store.save(commands).unwrap();
    let audit = Arc::new(MemoryAuditLog::new());
    let gateway = Gateway::new(store.clone(), audit.clone(), ShellRunner::new());
    Fixture {
        dir,
        gateway,
        audit,
        store,
    }
}

fn execute(name: &str, args: Option<&str>, token: Option<&str>) -> ExecuteRequest {
    ExecuteRequest {
        name: name.to_string(),
        args: args.map(str::to_string),
        confirmation_token: token.map(str::to_string),
        request_id: Some("req-1".to_string()),
    }
}

fn manage(action: ManageAction, name: &str, patch: CommandPatch) -> ManageCommandRequest {
    ManageCommandRequest {
        patch,
        ..ManageCommandRequest::new(action, Some(name))
    }
}

fn names(fx: &Fixture) -> Vec<String> {
    fx.store.load().unwrap().into_iter().map(|c| c.name).collect()
}

// ---------------------------------------------------------------------
// execute
// ---------------------------------------------------------------------

#[tokio::test]
async fn test_safe_command_runs_and_is_audited_once() {
    let fx = fixture(&default_commands());

    let response = fx.gateway.execute(&execute("echo", Some("hello gateway"), None)).await;

    assert_eq!(response.text, "hello gateway\n");
    assert!(!response.requires_confirmation);
    assert_eq!(fx.audit.actions(), vec!["command_executed"]);
    let event = &fx.audit.events()[0];
    assert_eq!(event.command(), Some("echo hello gateway"));
    assert_eq!(event.request_id.as_deref(), Some("req-1"));
    match &event.kind {
        EventKind::CommandExecuted { output_length, .. } => assert_eq!(*output_length, 14),
        other => panic!("Expected CommandExecuted, got {:?}", other),
    }
}

#[tokio::test]
async fn test_dangerous_without_token_asks_for_confirmation() {
    let fx = fixture(&test_commands());

    let response = fx.gateway.execute(&execute("printf", Some("ran"), None)).await;

    assert!(response.requires_confirmation);
    assert!(response.text.contains("printf ran"));
    assert!(response.text.contains("printf can print anything. Continue?"));
    assert!(response.text.contains("Text appears on stdout."));
    assert!(response.text.contains(CONFIRMATION_PHRASE));
    assert_eq!(fx.audit.actions(), vec!["dangerous_command_attempt"]);
}

#[tokio::test]
async fn test_wrong_token_is_rejected_without_running() {
    let fx = fixture(&test_commands());

    for token in ["yes", "confirm", "CONFIRM"] {
        let response = fx.gateway.execute(&execute("printf", Some("ran"), Some(token))).await;
        assert!(!response.requires_confirmation);
        assert!(response.text.contains("Invalid confirmation token"));
    }
    assert_eq!(fx.audit.actions(), vec!["dangerous_command_rejected"; 3]);
}

#[tokio::test]
async fn test_confirmed_dangerous_command_runs() {
    let fx = fixture(&test_commands());

    let response = fx
        .gateway
        .execute(&execute("printf", Some("'%s' ran"), Some(CONFIRMATION_PHRASE)))
        .await;

    assert_eq!(response.text, "ran");
    assert_eq!(fx.audit.actions(), vec!["dangerous_command_confirmed", "command_executed"]);
    assert_eq!(fx.audit.events()[1].command(), Some("printf '%s' ran"));
}

#[tokio::test]
async fn test_failing_command_is_audited_as_failed() {
    let fx = fixture(&test_commands());

    let response = fx.gateway.execute(&execute("false", None, None)).await;

    assert!(response.text.starts_with("Error executing 'false'"));
    assert_eq!(fx.audit.actions(), vec!["command_failed"]);
    assert_eq!(fx.audit.events()[0].status(), Some(STATUS_FAILED));
}

#[tokio::test]
async fn test_unknown_and_disabled_commands_are_blocked() {
    let fx = fixture(&test_commands());

    let response = fx.gateway.execute(&execute("rm", Some("-rf /"), None)).await;
    assert!(response.text.contains("'rm' is not in the registry"));

    let response = fx
        .gateway
        .execute(&execute("format", Some("C:"), Some(CONFIRMATION_PHRASE)))
        .await;
    assert!(response.text.contains("'format' is currently disabled"));

    assert_eq!(fx.audit.actions(), vec!["command_not_found", "command_disabled"]);
}

#[tokio::test]
async fn test_registry_is_reread_on_every_request() {
    let fx = fixture(&test_commands());
    let response = fx.gateway.execute(&execute("echo", Some("one"), None)).await;
    assert_eq!(response.text, "one\n");

    // Another writer disables echo between requests.
    let mut commands = fx.store.load().unwrap();
    commands[0].enabled = false;
    fx.store.save(&commands).unwrap();

    let response = fx.gateway.execute(&execute("echo", Some("two"), None)).await;
    assert!(response.text.contains("disabled"));
}

#[tokio::test]
async fn test_corrupt_registry_degrades_to_message() {
    let fx = fixture(&test_commands());
    fs::write(fx.store.path(), "not json").unwrap();

    let response = fx.gateway.execute(&execute("echo", Some("x"), None)).await;

    assert!(response.text.starts_with("Error: could not load command registry"));
    assert_eq!(fx.audit.actions(), vec!["config_load_failed"]);
}

// ---------------------------------------------------------------------
// query_commands
// ---------------------------------------------------------------------

#[test]
fn test_query_commands_filters() {
    let fx = fixture(&test_commands());
    let query = |filter| {
        fx.gateway
            .query_commands(&QueryCommandsRequest {
                filter,
                ..Default::default()
            })
            .text
    };

    let dangerous = query(CommandFilter::Dangerous);
    assert!(dangerous.contains("- printf [DANGEROUS]"));
    assert!(dangerous.contains("- format [DANGEROUS] [DISABLED]"));
    assert!(!dangerous.contains("- echo"));

    let disabled = query(CommandFilter::Disabled);
    assert!(disabled.contains("- format"));
    assert!(!disabled.contains("- printf"));

    let enabled = query(CommandFilter::Enabled);
    assert!(enabled.contains("- echo"));
    assert!(!enabled.contains("- format"));

    assert_eq!(fx.audit.actions(), vec!["commands_queried"; 3]);
}

#[test]
fn test_queries_leave_registry_untouched() {
    let fx = fixture(&test_commands());
    let before = fx.registry_bytes();

    let detailed = fx.gateway.query_commands(&QueryCommandsRequest {
        filter: CommandFilter::All,
        detailed: true,
        request_id: None,
    });
    assert!(detailed.text.contains("Description: Formatted print"));
    fx.gateway.query_logs(&QueryLogsRequest::default());

    assert_eq!(fx.registry_bytes(), before);
}

// ---------------------------------------------------------------------
// manage_command
// ---------------------------------------------------------------------

#[test]
fn test_add_then_remove_round_trip() {
    let fx = fixture(&test_commands());
    let all = || fx.gateway.query_commands(&QueryCommandsRequest::default()).text;

    let patch = CommandPatch {
        description: Some("Show the date".to_string()),
        example: Some("date +%F".to_string()),
        ..Default::default()
    };
    let response = fx.gateway.manage_command(&manage(ManageAction::Add, "date", patch));
    assert_eq!(response.text, "Command 'date' added successfully.");
    assert!(all().contains("- date"));
    assert_eq!(names(&fx).last().map(String::as_str), Some("date"));

    let response = fx
        .gateway
        .manage_command(&ManageCommandRequest::new(ManageAction::Remove, Some("date")));
    assert_eq!(response.text, "Command 'date' removed successfully.");
    assert!(!all().contains("- date"));

    let actions = fx.audit.actions();
    assert!(actions.contains(&"command_added"));
    assert!(actions.contains(&"command_removed"));
    assert_eq!(actions.iter().filter(|a| **a == "config_saved").count(), 2);
}

#[test]
fn test_duplicate_add_is_rejected_without_saving() {
    let fx = fixture(&default_commands());
    let before = fx.registry_bytes();

    let response = fx
        .gateway
        .manage_command(&ManageCommandRequest::new(ManageAction::Add, Some("dir")));

    assert!(response.text.contains("already exists"));
    assert_eq!(fx.registry_bytes(), before);
    assert_eq!(fx.audit.actions(), vec!["management_failed"]);
}

#[test]
fn test_update_to_safe_clears_confirmation_texts() {
    let fx = fixture(&test_commands());

    let patch = CommandPatch {
        dangerous: Some(false),
        ..Default::default()
    };
    let response = fx.gateway.manage_command(&manage(ManageAction::Update, "printf", patch.clone()));
    assert_eq!(response.text, "Command 'printf' updated successfully.");

    let printf = fx.store.load().unwrap().into_iter().find(|c| c.name == "printf").unwrap();
    assert!(!printf.dangerous);
    assert!(printf.confirmation_prompt.is_empty());
    assert!(printf.consequences.is_empty());

    let updated = fx
        .audit
        .events()
        .into_iter()
        .find(|e| e.action() == "command_updated")
        .unwrap();
    assert_eq!(
        updated.kind,
        EventKind::CommandUpdated {
            name: "printf".to_string(),
            changes: patch
        }
    );
}

#[test]
fn test_update_requires_changes() {
    let fx = fixture(&test_commands());
    let before = fx.registry_bytes();

    let response = fx
        .gateway
        .manage_command(&ManageCommandRequest::new(ManageAction::Update, Some("echo")));

    assert!(response.text.contains("No changes specified"));
    assert_eq!(fx.registry_bytes(), before);
}

#[test]
fn test_unknown_names_and_missing_names() {
    let fx = fixture(&test_commands());
    let before = fx.registry_bytes();

    for action in [ManageAction::Update, ManageAction::Remove, ManageAction::Enable, ManageAction::Disable] {
        let patch = CommandPatch {
            enabled: Some(true),
            ..Default::default()
        };
        let response = fx.gateway.manage_command(&manage(action, "ghost", patch));
        assert_eq!(response.text, "Error: Command 'ghost' not found.", "action {:?}", action);
    }

    let response = fx.gateway.manage_command(&ManageCommandRequest::new(ManageAction::Add, None));
    assert_eq!(response.text, "Error: A command name is required for the 'add' action.");
    let response = fx
        .gateway
        .manage_command(&ManageCommandRequest::new(ManageAction::Remove, Some("  ")));
    assert!(response.text.contains("name is required"));

    assert_eq!(fx.registry_bytes(), before);
    assert_eq!(fx.audit.actions(), vec!["management_failed"; 6]);
}

#[tokio::test]
async fn test_enable_and_disable_toggle_execution() {
    let fx = fixture(&test_commands());

    let response = fx
        .gateway
        .manage_command(&ManageCommandRequest::new(ManageAction::Disable, Some("echo")));
    assert_eq!(response.text, "Command 'echo' disabled.");
    let blocked = fx.gateway.execute(&execute("echo", Some("hi"), None)).await;
    assert!(blocked.text.contains("disabled"));

    fx.gateway
        .manage_command(&ManageCommandRequest::new(ManageAction::Enable, Some("echo")));
    let ran = fx.gateway.execute(&execute("echo", Some("hi"), None)).await;
    assert_eq!(ran.text, "hi\n");

    let disable_event = fx
        .audit
        .events()
        .into_iter()
        .find(|e| e.action() == "command_disabled")
        .unwrap();
    assert_eq!(disable_event.name(), Some("echo"));
    assert_eq!(disable_event.command(), None);
}

#[test]
fn test_list_action_shows_state() {
    let fx = fixture(&test_commands());
    let response = fx
        .gateway
        .manage_command(&ManageCommandRequest::new(ManageAction::List, None));

    assert!(response.text.starts_with("Registered commands (4):"));
    assert!(response.text.contains("- format (disabled) [DANGEROUS] [DISABLED]"));
    assert!(response.text.contains("- echo (enabled): Print text"));
    assert_eq!(fx.audit.actions(), vec!["command_listed"]);
}

#[test]
fn test_save_failure_is_reported_not_raised() {
    let fx = fixture(&test_commands());
    let before = fx.registry_bytes();
    // A directory squatting on the temp path makes the write step fail.
    fs::create_dir(fx.store.path().with_extension("json.tmp")).unwrap();

    let response = fx
        .gateway
        .manage_command(&ManageCommandRequest::new(ManageAction::Add, Some("uptime")));

    assert!(response.text.starts_with("Command 'uptime' added successfully."));
    assert!(response.text.contains("change applied in memory but not persisted"));
    assert_eq!(fx.registry_bytes(), before);
    assert_eq!(fx.audit.actions(), vec!["config_save_failed", "command_added"]);
}

// ---------------------------------------------------------------------
// query_logs
// ---------------------------------------------------------------------

fn failed(name: &str) -> AuditEvent {
    AuditEvent::new(EventKind::CommandFailed {
        command: name.to_string(),
        name: name.to_string(),
        status: STATUS_FAILED.to_string(),
        execution_time: 2,
        error: "exit status 1".to_string(),
    })
}

#[test]
fn test_query_logs_across_partitions() {
    let dir = TempDir::new().unwrap();
    let store = RegistryStore::new(dir.path().join("commands.json"));
    store.save(&default_commands()).unwrap();
    let log_dir = dir.path().join("logs");
    fs::create_dir_all(&log_dir).unwrap();
    let audit = Arc::new(FileAuditLog::new(&log_dir));

    let older = vec![failed("old-1"), failed("old-2"), failed("old-3")];
    let newer = vec![
        failed("new-1"),
        AuditEvent::new(EventKind::CommandAdded { name: "noise".to_string() }),
        failed("new-2"),
    ];
    for (date, events) in [("2024-05-01", &older), ("2024-05-02", &newer)] {
        let path = audit.partition_path(NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap());
        fs::write(path, serde_json::to_vec(events).unwrap()).unwrap();
    }

    let gateway = Gateway::new(store, audit.clone(), ShellRunner::new());
    let response = gateway.query_logs(&QueryLogsRequest {
        limit: Some(3),
        filter: Some("failed".to_string()),
        request_id: None,
    });

    let lines: Vec<&str> = response.text.lines().filter(|l| l.contains('[')).collect();
    assert_eq!(lines.len(), 3);
    assert!(lines.iter().all(|l| l.contains("[command_failed]")));
    assert!(lines[0].contains("Name: new-2"));
    assert!(lines[1].contains("Name: new-1"));
    assert!(lines[2].contains("Name: old-3"));

    // The query itself is recorded in today's partition.
    let latest = audit.query(1, None).unwrap();
    assert_eq!(latest[0].action(), "logs_queried");
}

#[test]
fn test_query_logs_limit_is_clamped() {
    let fx = fixture(&test_commands());
    for limit in [Some(0), Some(5000), None] {
        fx.gateway.query_logs(&QueryLogsRequest {
            limit,
            ..Default::default()
        });
    }
    let limits: Vec<usize> = fx
        .audit
        .events()
        .iter()
        .filter_map(|e| match &e.kind {
            EventKind::LogsQueried { limit, .. } => Some(*limit),
            _ => None,
        })
        .collect();
    assert_eq!(limits, vec![1, 1000, 50]);
}

#[test]
fn test_query_logs_empty() {
    let fx = fixture(&test_commands());
    let response = fx.gateway.query_logs(&QueryLogsRequest::default());
    assert_eq!(response.text, "No log entries found.");
}

// ---------------------------------------------------------------------
// lookups and lifecycle
// ---------------------------------------------------------------------

#[test]
fn test_definition_lookups() {
    let fx = fixture(&test_commands());

    let all: Vec<CommandDefinition> =
        serde_json::from_str(&fx.gateway.list_definitions().text).unwrap();
    assert_eq!(all, test_commands());

    let one: CommandDefinition =
        serde_json::from_str(&fx.gateway.get_definition("printf").text).unwrap();
    assert!(one.dangerous);

    assert_eq!(fx.gateway.get_definition("ghost").text, "Command 'ghost' not found");
    assert!(fx.audit.is_empty());
}

#[test]
fn test_initialize_seeds_registry_once() {
    let dir = TempDir::new().unwrap();
    let audit = Arc::new(MemoryAuditLog::new());
    let store = RegistryStore::new(dir.path().join("state").join("commands.json"));
    let gateway = Gateway::new(store.clone(), audit.clone(), ShellRunner::new()).with_port("3000");

    assert_eq!(gateway.initialize().unwrap(), 3);
    gateway.record_started();
    assert_eq!(
        audit.actions(),
        vec!["config_file_created", "config_loaded", "service_initialized", "service_started"]
    );
    assert_eq!(store.load().unwrap(), default_commands());

    let again = Gateway::new(store, audit.clone(), ShellRunner::new());
    again.initialize().unwrap();
    assert_eq!(audit.actions().iter().filter(|a| **a == "config_file_created").count(), 1);
}

#[test]
fn test_initialize_fails_when_registry_is_inaccessible() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("commands.json");
    fs::create_dir(&path).unwrap();
    let gateway = Gateway::new(
        RegistryStore::new(&path),
        Arc::new(MemoryAuditLog::new()),
        ShellRunner::new(),
    );
    assert!(gateway.initialize().is_err());
}

#[test]
fn test_lifecycle_events() {
    let fx = fixture(&test_commands());
    fx.gateway.record_uncaught("boom", Some("req-9"));
    fx.gateway.record_terminated("SIGTERM");
    fx.gateway.record_stopped("SIGINT");
    assert_eq!(
        fx.audit.actions(),
        vec!["uncaught_exception", "service_terminated", "service_stopped"]
    );
    assert!(fx.dir.path().exists());
}

// ---------------------------------------------------------------------
// audit failures
// ---------------------------------------------------------------------

/// Audit log whose writes always fail.
struct BrokenAuditLog;

impl AuditLog for BrokenAuditLog {
    fn append(&self, _event: &AuditEvent) -> crate::error::Result<()> {
        Err(std::io::Error::other("disk full").into())
    }

    fn query(&self, _limit: usize, _filter: Option<&str>) -> crate::error::Result<Vec<AuditEvent>> {
        Ok(Vec::new())
    }
}

#[tokio::test]
async fn test_audit_failures_never_block_requests() {
    let dir = TempDir::new().unwrap();
    let store = RegistryStore::new(dir.path().join("commands.json"));
    store.save(&test_commands()).unwrap();
    let gateway = Gateway::new(store.clone(), Arc::new(BrokenAuditLog), ShellRunner::new());

    let ran = gateway.execute(&execute("echo", Some("hi"), None)).await;
    assert_eq!(ran.text, "hi\n");

    let confirmed = gateway
        .execute(&execute("printf", Some("ok"), Some(CONFIRMATION_PHRASE)))
        .await;
    assert_eq!(confirmed.text, "ok");

    let added = gateway.manage_command(&ManageCommandRequest::new(ManageAction::Add, Some("date")));
    assert_eq!(added.text, "Command 'date' added successfully.");
    assert!(store.load().unwrap().iter().any(|c| c.name == "date"));

    let logs = gateway.query_logs(&QueryLogsRequest::default());
    assert_eq!(logs.text, "No log entries found.");

    assert_eq!(gateway.initialize().unwrap(), 5);
}
