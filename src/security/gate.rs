//! Confirmation gate for registry commands.
//!
//! The gate is a pure decision over a registry entry and an optional token.
//! It performs no I/O; the caller records the matching audit event.

use crate::audit::EventKind;
use crate::error::GatewayError;
use crate::registry::CommandDefinition;

/// Shared secret that confirms any dangerous command.
///
/// Deliberately global: it is not bound to a command, a request or a time
/// window. Anyone who knows it can confirm every dangerous entry.
pub const CONFIRMATION_PHRASE: &str = "CONFIRM_DANGEROUS_COMMAND";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockReason {
    NotFound,
    Disabled,
    InvalidToken,
}

impl BlockReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlockReason::NotFound => "not_found",
            BlockReason::Disabled => "disabled",
            BlockReason::InvalidToken => "invalid_token",
        }
    }

    pub fn error(self, name: &str) -> GatewayError {
        let name = name.to_string();
        match self {
            BlockReason::NotFound => GatewayError::CommandNotFound(name),
            BlockReason::Disabled => GatewayError::CommandDisabled(name),
            BlockReason::InvalidToken => GatewayError::InvalidConfirmationToken(name),
        }
    }
}

/// Outcome of gating one execution request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    /// Run the command. `confirmed` is set when a dangerous entry was unlocked
    /// with the confirmation phrase.
    Allowed { confirmed: bool },
    /// Refuse without running anything.
    Blocked(BlockReason),
    /// Dangerous entry requested without a token; ask the caller to confirm.
    PendingConfirmation { prompt: String, consequences: String },
}

/// Decide what to do with a request for `entry`.
///
/// # Rules
/// - No entry: blocked (`not_found`)
/// - Disabled entry: blocked (`disabled`)
/// - Safe entry: allowed, any token is ignored
/// - Dangerous entry without token: pending confirmation
/// - Dangerous entry with the wrong token: blocked (`invalid_token`)
/// - Dangerous entry with the phrase: allowed and confirmed
///
/// An empty token counts as no token.
pub fn evaluate(entry: Option<&CommandDefinition>, token: Option<&str>) -> GateDecision {
    let Some(entry) = entry else {
        return GateDecision::Blocked(BlockReason::NotFound);
    };
    if !entry.enabled {
        return GateDecision::Blocked(BlockReason::Disabled);
    }
    if !entry.dangerous {
        return GateDecision::Allowed { confirmed: false };
    }
    match token.filter(|t| !t.is_empty()) {
        None => GateDecision::PendingConfirmation {
            prompt: entry.confirmation_prompt.clone(),
            consequences: entry.consequences.clone(),
        },
        Some(t) if t == CONFIRMATION_PHRASE => GateDecision::Allowed { confirmed: true },
        Some(_) => GateDecision::Blocked(BlockReason::InvalidToken),
    }
}

impl GateDecision {
    /// The audit event this decision must leave behind.
    ///
    /// A plain allowed run records nothing here; the execution itself is audited.
    pub fn audit_kind(&self, name: &str, args: Option<&str>) -> Option<EventKind> {
        let command = name.to_string();
        let args = args.map(str::to_string);
        match self {
            GateDecision::Allowed { confirmed: false } => None,
            GateDecision::Allowed { confirmed: true } => {
                Some(EventKind::DangerousCommandConfirmed { command, args })
            }
            GateDecision::PendingConfirmation { .. } => {
                Some(EventKind::DangerousCommandAttempt { command, args })
            }
            GateDecision::Blocked(BlockReason::NotFound) => Some(EventKind::CommandNotFound { command }),
            GateDecision::Blocked(BlockReason::Disabled) => Some(EventKind::CommandDisabled {
                command: Some(command),
                name: None,
            }),
            GateDecision::Blocked(reason @ BlockReason::InvalidToken) => {
                Some(EventKind::DangerousCommandRejected {
                    command,
                    args,
                    reason: reason.as_str().to_string(),
                })
            }
        }
    }

    pub fn is_allowed(&self) -> bool {
        matches!(self, GateDecision::Allowed { .. })
    }
}
