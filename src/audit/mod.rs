//! Audit trail for every gateway decision.
//!
//! Components talk to the trail through the [`AuditLog`] trait so tests can
//! swap the on-disk [`FileAuditLog`] for a [`MemoryAuditLog`].

mod event;
mod memory;
mod partition;

use tracing::error;

use crate::error::Result;

pub use event::{AuditEvent, EventKind, STATUS_FAILED, STATUS_SUCCESS};
pub use memory::MemoryAuditLog;
pub use partition::FileAuditLog;

/// Upper bound accepted by [`AuditLog::query`] callers.
pub const MAX_QUERY_LIMIT: usize = 1000;

pub trait AuditLog: Send + Sync {
    /// Persist one event.
    fn append(&self, event: &AuditEvent) -> Result<()>;

    /// Up to `limit` events, newest first, optionally keeping only those whose
    /// action, command or name contains `filter`.
    fn query(&self, limit: usize, filter: Option<&str>) -> Result<Vec<AuditEvent>>;

    /// Append without failing the caller. Write errors go to the diagnostic log.
    fn record(&self, event: AuditEvent) {
        if let Err(e) = self.append(&event) {
            error!("Failed to write audit event '{}': {}", event.action(), e);
        }
    }
}
