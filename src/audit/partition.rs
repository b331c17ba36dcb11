//! Date-partitioned audit storage.
//!
//! One JSON array per local calendar day, named `YYYY-MM-DD.json`. Appending
//! reads the whole day, pushes the event and rewrites the file through a
//! temporary copy. Appends from this process are serialized; separate
//! processes writing the same directory can still overwrite each other.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use chrono::{Local, NaiveDate};
use tracing::{debug, warn};

use super::{AuditEvent, AuditLog};
use crate::error::{GatewayError, Result};

const PARTITION_DATE_FORMAT: &str = "%Y-%m-%d";

pub struct FileAuditLog {
    dir: PathBuf,
    write_lock: Mutex<()>,
    tmp_seq: AtomicU64,
}

impl FileAuditLog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            write_lock: Mutex::new(()),
            tmp_seq: AtomicU64::new(0),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn partition_path(&self, date: NaiveDate) -> PathBuf {
        self.dir
            .join(format!("{}.json", date.format(PARTITION_DATE_FORMAT)))
    }

    fn append_to(&self, path: &Path, event: &AuditEvent) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        // An unreadable partition is never overwritten.
        let mut events = read_partition(path)?;
        events.push(serde_json::to_value(event)?);

        let data = serde_json::to_vec_pretty(&events)?;
        let seq = self.tmp_seq.fetch_add(1, Ordering::Relaxed);
        let tmp = path.with_extension(format!("json.{}.{}.tmp", std::process::id(), seq));
        fs::write(&tmp, data)?;
        if let Err(e) = fs::rename(&tmp, path) {
            if let Err(cleanup) = fs::remove_file(&tmp) {
                debug!("Could not remove {}: {}", tmp.display(), cleanup);
            }
            return Err(e.into());
        }
        Ok(())
    }

    /// Partition files, newest date first. Other files in the directory are ignored.
    fn partitions_newest_first(&self) -> Result<Vec<PathBuf>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut dated: Vec<(NaiveDate, PathBuf)> = fs::read_dir(&self.dir)?
            .flatten()
            .filter_map(|entry| {
                let path = entry.path();
                if path.extension().and_then(|e| e.to_str()) != Some("json") {
                    return None;
                }
                let stem = path.file_stem()?.to_str()?;
                let date = NaiveDate::parse_from_str(stem, PARTITION_DATE_FORMAT).ok()?;
                Some((date, path))
            })
            .collect();
        dated.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(dated.into_iter().map(|(_, path)| path).collect())
    }
}

impl AuditLog for FileAuditLog {
    fn append(&self, event: &AuditEvent) -> Result<()> {
        let path = self.partition_path(Local::now().date_naive());
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| GatewayError::Io(std::io::Error::other("audit write lock poisoned")))?;
        self.append_to(&path, event)
    }

    fn query(&self, limit: usize, filter: Option<&str>) -> Result<Vec<AuditEvent>> {
        let mut found = Vec::new();
        for path in self.partitions_newest_first()? {
            let raw_events = match read_partition(&path) {
                Ok(events) => events,
                Err(e) => {
                    warn!("Skipping audit partition: {}", e);
                    continue;
                }
            };
            // Newest entries sit at the end of a partition.
            for raw in raw_events.into_iter().rev() {
                let event: AuditEvent = match serde_json::from_value(raw) {
                    Ok(event) => event,
                    Err(e) => {
                        debug!("Skipping malformed event in {}: {}", path.display(), e);
                        continue;
                    }
                };
                if filter.is_none_or(|f| event.matches(f)) {
                    found.push(event);
                }
            }
            if found.len() >= limit {
                break;
            }
        }
        found.truncate(limit);
        Ok(found)
    }
}

/// Events stored in one partition. A missing file is an empty partition.
fn read_partition(path: &Path) -> Result<Vec<serde_json::Value>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let unreadable = |reason: String| GatewayError::LogPartitionUnreadable {
        path: path.to_path_buf(),
        reason,
    };
    let raw = fs::read_to_string(path).map_err(|e| unreadable(e.to_string()))?;
    match serde_json::from_str::<serde_json::Value>(&raw).map_err(|e| unreadable(e.to_string()))? {
        serde_json::Value::Array(events) => Ok(events),
        _ => Err(unreadable("expected an array of events".to_string())),
    }
}
