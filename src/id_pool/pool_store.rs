//! Durable representation of the allocated id set
//!
//! The store is a JSON array of integers, written sorted. Every save rewrites
//! the whole file through a temporary file in the same directory followed by
//! an atomic rename, so a crash mid-write leaves either the old or the new
//! set on disk and never a truncated one.

use super::pool_errors::{PoolError, PoolResult};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// What to do when the persisted set cannot be parsed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CorruptionPolicy {
    /// Refuse to start; reissuing ids could mint duplicates
    #[default]
    Abort,
    /// Operator-approved reset to an empty pool. The unreadable file is kept
    /// next to the store with a `.corrupt` suffix.
    ResetToEmpty,
}

/// Older stores wrote ids as strings; both forms are accepted on load.
#[derive(Deserialize)]
#[serde(untagged)]
enum StoredId {
    Number(u32),
    Text(String),
}

#[derive(Debug, Clone)]
pub struct PoolStore {
    path: PathBuf,
    capacity: u32,
    policy: CorruptionPolicy,
}

impl PoolStore {
    pub fn new(path: impl Into<PathBuf>, capacity: u32, policy: CorruptionPolicy) -> Self {
        Self {
            path: path.into(),
            capacity,
            policy,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn policy(&self) -> CorruptionPolicy {
        self.policy
    }

    /// Load the allocated set. A missing file is a fresh pool.
    pub fn load(&self) -> PoolResult<BTreeSet<u32>> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No identifier store yet, starting empty");
                return Ok(BTreeSet::new());
            }
            Err(e) => return Err(PoolError::io(&self.path, e)),
        };

        match self.parse(&raw) {
            Ok(ids) => {
                debug!(path = %self.path.display(), allocated = ids.len(), "Identifier store loaded");
                Ok(ids)
            }
            Err(reason) => match self.policy {
                CorruptionPolicy::Abort => Err(PoolError::StorageCorrupt {
                    path: self.path.clone(),
                    reason,
                }),
                CorruptionPolicy::ResetToEmpty => {
                    let backup = self.backup_path();
                    std::fs::copy(&self.path, &backup).map_err(|e| PoolError::io(&backup, e))?;
                    warn!(
                        path = %self.path.display(),
                        backup = %backup.display(),
                        reason = %reason,
                        "Identifier store corrupt, resetting to empty by operator request"
                    );
                    Ok(BTreeSet::new())
                }
            },
        }
    }

    fn parse(&self, raw: &str) -> Result<BTreeSet<u32>, String> {
        let entries: Vec<StoredId> = serde_json::from_str(raw).map_err(|e| e.to_string())?;
        let mut ids = BTreeSet::new();
        for entry in entries {
            let id = match entry {
                StoredId::Number(n) => n,
                StoredId::Text(s) => s
                    .trim()
                    .parse::<u32>()
                    .map_err(|_| format!("non-numeric id {:?}", s))?,
            };
            if id == 0 || id > self.capacity {
                return Err(format!("id {} outside [1, {}]", id, self.capacity));
            }
            if !ids.insert(id) {
                return Err(format!("duplicate id {}", id));
            }
        }
        Ok(ids)
    }

    /// Atomically replace the persisted set
    pub fn save(&self, ids: &BTreeSet<u32>) -> PoolResult<()> {
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir).map_err(|e| PoolError::io(&dir, e))?;

        let body = serde_json::to_string(&ids.iter().collect::<Vec<_>>())
            .map_err(|e| PoolError::io(&self.path, std::io::Error::other(e)))?;

        let mut tmp = tempfile::NamedTempFile::new_in(&dir).map_err(|e| PoolError::io(&dir, e))?;
        tmp.write_all(body.as_bytes())
            .and_then(|_| tmp.as_file().sync_all())
            .map_err(|e| PoolError::io(tmp.path(), e))?;
        tmp.persist(&self.path)
            .map_err(|e| PoolError::io(&self.path, e.error))?;

        debug!(path = %self.path.display(), allocated = ids.len(), "Identifier store saved");
        Ok(())
    }

    fn backup_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".corrupt");
        self.path.with_file_name(name)
    }
}
