//! Command registry: the whitelisted commands the gateway may run.
//!
//! The registry is persisted as one ordered JSON array. Every operation goes
//! through [`RegistryStore`] and reads the durable copy; nothing is cached
//! between requests.

mod store;

use serde::{Deserialize, Serialize};

pub use store::RegistryStore;

fn default_enabled() -> bool {
    true
}

/// One whitelisted command.
///
/// `name` is the key and never changes after creation. When `dangerous` is
/// false, `confirmation_prompt` and `consequences` are always empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub example: String,
    #[serde(default)]
    pub dangerous: bool,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub confirmation_prompt: String,
    #[serde(default)]
    pub consequences: String,
}

impl CommandDefinition {
    /// A safe, enabled command with empty text fields.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            example: String::new(),
            dangerous: false,
            enabled: true,
            confirmation_prompt: String::new(),
            consequences: String::new(),
        }
    }

    /// Build a new definition from the fields of an `add` request.
    pub fn from_patch(name: impl Into<String>, patch: &CommandPatch) -> Self {
        let mut def = Self::new(name);
        def.apply(patch);
        def
    }

    /// Apply every field present in `patch`, then restore the danger invariant.
    pub fn apply(&mut self, patch: &CommandPatch) {
        if let Some(description) = &patch.description {
            self.description = description.clone();
        }
        if let Some(example) = &patch.example {
            self.example = example.clone();
        }
        if let Some(dangerous) = patch.dangerous {
            self.dangerous = dangerous;
        }
        if let Some(enabled) = patch.enabled {
            self.enabled = enabled;
        }
        if let Some(prompt) = &patch.confirmation_prompt {
            self.confirmation_prompt = prompt.clone();
        }
        if let Some(consequences) = &patch.consequences {
            self.consequences = consequences.clone();
        }
        self.normalize();
    }

    /// Clear the confirmation texts of a safe command.
    pub fn normalize(&mut self) {
        if !self.dangerous {
            self.confirmation_prompt.clear();
            self.consequences.clear();
        }
    }
}

/// Partial update for a [`CommandDefinition`]. Absent fields are left alone.
///
/// Also serialized into `command_updated` audit events as the `changes` field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CommandPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub example: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dangerous: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confirmation_prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consequences: Option<String>,
}

impl CommandPatch {
    pub fn is_empty(&self) -> bool {
        self.description.is_none()
            && self.example.is_none()
            && self.dangerous.is_none()
            && self.enabled.is_none()
            && self.confirmation_prompt.is_none()
            && self.consequences.is_none()
    }
}

/// Seed content written the first time the service starts.
pub fn default_commands() -> Vec<CommandDefinition> {
    vec![
        CommandDefinition {
            description: "List the contents of a directory".to_string(),
            example: "dir /tmp".to_string(),
            ..CommandDefinition::new("dir")
        },
        CommandDefinition {
            description: "Print text to standard output".to_string(),
            example: "echo hello world".to_string(),
            ..CommandDefinition::new("echo")
        },
        CommandDefinition {
            description: "Format a disk drive".to_string(),
            example: "format C:".to_string(),
            dangerous: true,
            enabled: false,
            confirmation_prompt: "WARNING: formatting erases the target drive. Do you really want to continue?"
                .to_string(),
            consequences: "All data on the target drive will be permanently lost.".to_string(),
            ..CommandDefinition::new("format")
        },
    ]
}
