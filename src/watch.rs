//! Registry file watcher.
//!
//! Records a `config_file_changed` audit event whenever the registry file is
//! touched on disk. Nothing is reloaded: every gateway operation already reads
//! the file fresh. Bursts of events (an editor save, our own tmp+rename) are
//! collapsed by a short debounce window.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use notify::event::ModifyKind;
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher as NotifyWatcher};
use tracing::{debug, info, warn};

use crate::audit::{AuditEvent, AuditLog, EventKind};

/// Minimum gap between two recorded change events.
pub const DEBOUNCE: Duration = Duration::from_millis(500);

/// `"rename"` for creations, removals and renames, `"change"` for content
/// and metadata writes. Access events are ignored.
pub fn classify(kind: &notify::EventKind) -> Option<&'static str> {
    match kind {
        notify::EventKind::Create(_) | notify::EventKind::Remove(_) => Some("rename"),
        notify::EventKind::Modify(ModifyKind::Name(_)) => Some("rename"),
        notify::EventKind::Modify(_) => Some("change"),
        _ => None,
    }
}

/// Drops events that arrive within `window` of the last accepted one.
#[derive(Debug)]
pub struct Debouncer {
    window: Duration,
    last: Option<Instant>,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self { window, last: None }
    }

    pub fn accept(&mut self, now: Instant) -> bool {
        match self.last {
            Some(last) if now.saturating_duration_since(last) < self.window => false,
            _ => {
                self.last = Some(now);
                true
            }
        }
    }
}

pub struct RegistryWatcher {
    _watcher: RecommendedWatcher,
}

impl RegistryWatcher {
    /// Watch the directory holding `registry_path`, non-recursively.
    ///
    /// The parent is watched instead of the file so that atomic replacements
    /// keep being observed after the original inode is gone.
    pub fn new(registry_path: &Path, audit: Arc<dyn AuditLog>) -> Result<Self> {
        let dir = registry_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let file_name: OsString = registry_path
            .file_name()
            .map(|n| n.to_os_string())
            .context("registry path has no file name")?;
        let shown_path = registry_path.display().to_string();
        let debouncer = Mutex::new(Debouncer::new(DEBOUNCE));

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => {
                let Some(event_type) = classify(&event.kind) else {
                    return;
                };
                if !event.paths.iter().any(|p| p.file_name() == Some(file_name.as_os_str())) {
                    return;
                }
                let accepted = match debouncer.lock() {
                    Ok(mut d) => d.accept(Instant::now()),
                    Err(poisoned) => poisoned.into_inner().accept(Instant::now()),
                };
                if !accepted {
                    debug!("Debounced registry event: {:?}", event.kind);
                    return;
                }
                info!("Registry file changed ({}): {}", event_type, shown_path);
                audit.record(AuditEvent::new(EventKind::ConfigFileChanged {
                    path: shown_path.clone(),
                    event_type: event_type.to_string(),
                }));
            }
            Err(e) => warn!("Watch error: {:?}", e),
        })?;

        watcher
            .watch(&dir, RecursiveMode::NonRecursive)
            .with_context(|| format!("failed to watch {}", dir.display()))?;

        info!("Registry watcher started on {}", dir.display());
        Ok(Self { _watcher: watcher })
    }
}
