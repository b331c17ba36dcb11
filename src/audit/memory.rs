//! In-memory audit trail for tests and embedding.

use std::sync::Mutex;

use super::{AuditEvent, AuditLog};
use crate::error::{GatewayError, Result};

#[derive(Default)]
pub struct MemoryAuditLog {
    events: Mutex<Vec<AuditEvent>>,
}

impl MemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything recorded so far, oldest first.
    pub fn events(&self) -> Vec<AuditEvent> {
        if let Ok(events) = self.events.lock() {
            events.clone()
        } else {
            Vec::new()
        }
    }

    /// Action tags recorded so far, oldest first.
    pub fn actions(&self) -> Vec<&'static str> {
        self.events().iter().map(AuditEvent::action).collect()
    }

    pub fn len(&self) -> usize {
        self.events().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AuditLog for MemoryAuditLog {
    fn append(&self, event: &AuditEvent) -> Result<()> {
        let mut events = self
            .events
            .lock()
            .map_err(|_| GatewayError::Io(std::io::Error::other("audit buffer poisoned")))?;
        events.push(event.clone());
        Ok(())
    }

    fn query(&self, limit: usize, filter: Option<&str>) -> Result<Vec<AuditEvent>> {
        Ok(self
            .events()
            .into_iter()
            .rev()
            .filter(|e| filter.is_none_or(|f| e.matches(f)))
            .take(limit)
            .collect())
    }
}
