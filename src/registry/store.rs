//! Disk persistence for the command registry.
//!
//! Saves go through a temporary file that is renamed over the live file, so a
//! crash mid-write leaves the previous registry intact. Every save gets its own
//! temporary file. Concurrent load-mutate-save sequences are not serialized:
//! the last writer wins.

use std::fs::{self, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, info};

use super::{default_commands, CommandDefinition};
use crate::error::{GatewayError, Result};

static NEXT_STORE_ID: AtomicU64 = AtomicU64::new(0);

/// Handle on the registry file. Holds no command state of its own.
///
/// Clones share one temp-file sequence.
#[derive(Debug, Clone)]
pub struct RegistryStore {
    path: PathBuf,
    id: u64,
    tmp_seq: Arc<AtomicU64>,
}

impl RegistryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            id: NEXT_STORE_ID.fetch_add(1, Ordering::Relaxed),
            tmp_seq: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Seed the registry with [`default_commands`] if the file is absent.
    ///
    /// Returns `true` when the file was created by this call.
    pub fn bootstrap(&self) -> Result<bool> {
        if self.exists() {
            return Ok(false);
        }
        ensure_parent_dir(&self.path)?;
        self.save(&default_commands())?;
        info!("Created default command registry at {}", self.path.display());
        Ok(true)
    }

    /// Verify the registry file can be opened for both reading and writing.
    ///
    /// Opens without truncating, so the check never alters the file.
    pub fn check_access(&self) -> Result<()> {
        OpenOptions::new()
            .read(true)
            .write(true)
            .open(&self.path)
            .map(|_| ())
            .map_err(|source| GatewayError::ConfigAccess {
                path: self.path.clone(),
                source,
            })
    }

    /// Read the whole registry from disk.
    pub fn load(&self) -> Result<Vec<CommandDefinition>> {
        let raw = match fs::read(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(GatewayError::ConfigMissing(self.path.clone()));
            }
            Err(e) => return Err(e.into()),
        };
        let value: serde_json::Value =
            serde_json::from_slice(&raw).map_err(|e| self.corrupt(e.to_string()))?;
        if !value.is_array() {
            return Err(self.corrupt("expected an array of command definitions".to_string()));
        }
        let commands: Vec<CommandDefinition> =
            serde_json::from_value(value).map_err(|e| self.corrupt(e.to_string()))?;
        debug!("Loaded {} commands from {}", commands.len(), self.path.display());
        Ok(commands)
    }

    /// Replace the registry on disk with `commands`, preserving their order.
    pub fn save(&self, commands: &[CommandDefinition]) -> Result<()> {
        let data = serde_json::to_vec_pretty(commands)?;
        let tmp = self.tmp_path(self.tmp_seq.fetch_add(1, Ordering::Relaxed));
        write_atomic(&self.path, &tmp, &data)
    }

    /// `commands.json.<pid>.<store>.<seq>.tmp`, unique within the process.
    fn tmp_path(&self, seq: u64) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(format!(".{}.{}.{}.tmp", std::process::id(), self.id, seq));
        self.path.with_file_name(name)
    }

    /// Temp file the next [`save`](Self::save) on this store will use.
    #[cfg(test)]
    pub(crate) fn next_tmp_path(&self) -> PathBuf {
        self.tmp_path(self.tmp_seq.load(Ordering::Relaxed))
    }

    fn corrupt(&self, reason: String) -> GatewayError {
        GatewayError::ConfigCorrupt {
            path: self.path.clone(),
            reason,
        }
    }
}

fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

fn write_atomic(path: &Path, tmp: &Path, data: &[u8]) -> Result<()> {
    fs::write(tmp, data).map_err(|e| {
        GatewayError::ConfigSaveFailed(format!("failed to write temp file {}: {}", tmp.display(), e))
    })?;
    if let Err(e) = fs::rename(tmp, path) {
        // Leave the live file untouched and drop the orphaned temp copy.
        if let Err(cleanup) = fs::remove_file(tmp) {
            debug!("Could not remove {}: {}", tmp.display(), cleanup);
        }
        return Err(GatewayError::ConfigSaveFailed(format!(
            "failed to replace {} with {}: {}",
            path.display(),
            tmp.display(),
            e
        )));
    }
    Ok(())
}
