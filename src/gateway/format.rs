//! Text rendering for gateway responses.

use crate::audit::AuditEvent;
use crate::registry::CommandDefinition;
use crate::security::{BlockReason, CONFIRMATION_PHRASE};

use super::CommandFilter;

/// `name` alone, or `name args` when arguments were supplied.
pub fn command_line(name: &str, args: Option<&str>) -> String {
    match args {
        Some(args) => format!("{} {}", name, args),
        None => name.to_string(),
    }
}

fn markers(def: &CommandDefinition) -> String {
    let mut out = String::new();
    if def.dangerous {
        out.push_str(" [DANGEROUS]");
    }
    if !def.enabled {
        out.push_str(" [DISABLED]");
    }
    out
}

pub fn blocked(name: &str, reason: BlockReason) -> String {
    match reason {
        BlockReason::NotFound => format!(
            "Error: Command '{}' is not in the registry. Use queryCommands to see the available commands.",
            name
        ),
        BlockReason::Disabled => format!("Error: Command '{}' is currently disabled.", name),
        BlockReason::InvalidToken => format!(
            "Error: Invalid confirmation token. Execution of dangerous command '{}' was rejected.",
            name
        ),
    }
}

pub fn confirmation_request(line: &str, prompt: &str, consequences: &str) -> String {
    let mut text = format!("DANGEROUS COMMAND: {}\n", line);
    if !prompt.is_empty() {
        text.push_str(&format!("\n{}\n", prompt));
    }
    if !consequences.is_empty() {
        text.push_str(&format!("\nConsequences: {}\n", consequences));
    }
    text.push_str(&format!(
        "\nTo run it anyway, repeat the request with confirmationToken set to \"{}\".",
        CONFIRMATION_PHRASE
    ));
    text
}

pub fn command_list(matched: &[&CommandDefinition], filter: CommandFilter, detailed: bool) -> String {
    if matched.is_empty() {
        return format!("No commands match filter '{}'.", filter.as_str());
    }
    let mut text = format!(
        "Available commands (filter: {}, {} total):\n",
        filter.as_str(),
        matched.len()
    );
    for def in matched {
        text.push_str(&format!("\n- {}{}", def.name, markers(def)));
        if detailed {
            if !def.description.is_empty() {
                text.push_str(&format!("\n  Description: {}", def.description));
            }
            if !def.example.is_empty() {
                text.push_str(&format!("\n  Example: {}", def.example));
            }
            if def.dangerous && !def.consequences.is_empty() {
                text.push_str(&format!("\n  Consequences: {}", def.consequences));
            }
        }
    }
    text
}

/// Full registry view used by the `list` management action.
pub fn registry_overview(commands: &[CommandDefinition]) -> String {
    if commands.is_empty() {
        return "The command registry is empty.".to_string();
    }
    let mut text = format!("Registered commands ({}):\n", commands.len());
    for def in commands {
        let state = if def.enabled { "enabled" } else { "disabled" };
        text.push_str(&format!("\n- {} ({}){}", def.name, state, markers(def)));
        if !def.description.is_empty() {
            text.push_str(&format!(": {}", def.description));
        }
    }
    text
}

pub fn log_lines(events: &[AuditEvent]) -> String {
    if events.is_empty() {
        return "No log entries found.".to_string();
    }
    let mut text = format!("Recent log entries ({}):\n", events.len());
    for event in events {
        text.push('\n');
        text.push_str(&event.summary());
    }
    text
}
