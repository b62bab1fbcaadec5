//! Point-in-time snapshots of the whole data root, kept under `.backup/`.
//!
//! A snapshot is a plain directory copy named after the local time it was
//! taken. A SHA-256 fingerprint over every path and file body lets
//! `backup_now` skip the copy when nothing changed since the previous one.
//!
//! Neither backup nor restore is transactional. An interrupted restore
//! leaves the root partially restored.
use std::{
    fs,
    path::{Path, PathBuf},
};

use chrono::{Local, NaiveDateTime};
use log::{debug, error, info, trace, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use walkdir::WalkDir;

use crate::{copy_recursively, ensure_dir, remove_path, FleetingError, Result};

/// Snapshot store, relative to the data root.
pub const BACKUP_DIR: &str = ".backup";

const SNAPSHOT_ID_FORMAT: &str = "%Y%m%d-%H%M%S";

static SNAPSHOT_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{8}-\d{6}(-\d{3})?$").expect("snapshot id pattern is valid"));

/// A snapshot as shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotInfo {
    pub id: String,
    /// `YYYY-MM-DD HH:MM:SS` taken from the id
    pub label: String,
}

/// Result of a backup request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackupOutcome {
    /// The root fingerprint matched the previous backup; nothing was copied.
    Unchanged,
    Created { id: String, hash: String },
}

impl BackupOutcome {
    pub fn performed(&self) -> bool {
        matches!(self, BackupOutcome::Created { .. })
    }
}

pub fn snapshot_label(id: &str) -> String {
    id.get(..15)
        .and_then(|stamp| NaiveDateTime::parse_from_str(stamp, SNAPSHOT_ID_FORMAT).ok())
        .map(|at| at.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| id.to_string())
}

#[derive(Debug, Clone)]
pub struct BackupManager {
    root: PathBuf,
    store: PathBuf,
}

impl BackupManager {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let store = root.join(BACKUP_DIR);
        Self { root, store }
    }

    pub fn store_dir(&self) -> &Path {
        &self.store
    }

    /// Hex SHA-256 over the data root, excluding the snapshot store.
    ///
    /// Files are visited in sorted order at every level; for each one the
    /// relative path, a NUL, the raw bytes and another NUL are hashed.
    pub fn snapshot_hash(&self) -> Result<String> {
        let mut hasher = Sha256::new();
        if !self.root.exists() {
            return Ok(hex::encode(hasher.finalize()));
        }

        let walker = WalkDir::new(&self.root)
            .min_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| !(entry.depth() == 1 && entry.file_name() == BACKUP_DIR));

        let mut files = 0usize;
        for entry in walker {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let relative = relative_key(&self.root, entry.path())?;
            hasher.update(relative.as_bytes());
            hasher.update(b"\0");
            hasher.update(fs::read(entry.path())?);
            hasher.update(b"\0");
            files += 1;
        }

        let digest = hex::encode(hasher.finalize());
        trace!("Fingerprinted {} files: {}", files, digest);
        Ok(digest)
    }

    /// Copies the data root into a new snapshot unless its fingerprint
    /// equals `last_hash`, then prunes down to `keep` snapshots (at least 1).
    pub fn backup_now(&self, last_hash: Option<&str>, keep: u32) -> Result<BackupOutcome> {
        let hash = self.snapshot_hash()?;
        if last_hash == Some(hash.as_str()) {
            info!("Data root unchanged since last backup, skipping");
            return Ok(BackupOutcome::Unchanged);
        }

        ensure_dir(&self.store)?;
        let id = self.next_snapshot_id()?;
        let target = self.store.join(&id);
        fs::create_dir(&target).map_err(|e| {
            error!("Failed to create snapshot dir {}: {}", target.display(), e);
            FleetingError::BackupFailed {
                message: format!("cannot create {}: {}", target.display(), e),
            }
        })?;

        let mut copied = 0;
        for entry in self.root_entries(&self.root)? {
            let name = entry.file_name().map(Path::new).unwrap_or(Path::new(""));
            copied += copy_recursively(&entry, &target.join(name)).map_err(|e| {
                error!("Snapshot {} incomplete: {}", id, e);
                FleetingError::BackupFailed {
                    message: format!("copying {} failed: {}", entry.display(), e),
                }
            })?;
        }

        let removed = self.prune(keep)?;
        info!(
            "Snapshot {} created with {} files ({} old snapshots pruned)",
            id, copied, removed
        );
        Ok(BackupOutcome::Created { id, hash })
    }

    /// Replaces the data root with the contents of snapshot `id`.
    ///
    /// `false` when no such snapshot exists.
    pub fn restore(&self, id: &str) -> Result<bool> {
        let source = self.snapshot_path(id)?;
        if !source.is_dir() {
            warn!("Snapshot {} not found, nothing restored", id);
            return Ok(false);
        }

        for entry in self.root_entries(&self.root)? {
            remove_path(&entry).map_err(|e| {
                error!("Failed to clear {}: {}", entry.display(), e);
                FleetingError::RestoreFailed {
                    message: format!("cannot remove {}: {}", entry.display(), e),
                }
            })?;
        }

        let mut copied = 0;
        for entry in self.root_entries(&source)? {
            let name = entry.file_name().map(Path::new).unwrap_or(Path::new(""));
            copied += copy_recursively(&entry, &self.root.join(name)).map_err(|e| {
                error!("Restore of {} stopped part way: {}", id, e);
                FleetingError::RestoreFailed {
                    message: format!("copying {} failed: {}", entry.display(), e),
                }
            })?;
        }

        info!("Restored {} files from snapshot {}", copied, id);
        Ok(true)
    }

    /// `false` when no such snapshot exists.
    pub fn delete_snapshot(&self, id: &str) -> Result<bool> {
        let path = self.snapshot_path(id)?;
        if !path.is_dir() {
            return Ok(false);
        }
        fs::remove_dir_all(&path)?;
        info!("Deleted snapshot {}", id);
        Ok(true)
    }

    /// Newest first.
    pub fn list_snapshots(&self) -> Result<Vec<SnapshotInfo>> {
        let mut ids = self.snapshot_ids()?;
        ids.reverse();
        Ok(ids
            .into_iter()
            .map(|id| SnapshotInfo {
                label: snapshot_label(&id),
                id,
            })
            .collect())
    }

    /// Removes the oldest snapshots beyond `keep` (never fewer than one kept).
    pub fn prune(&self, keep: u32) -> Result<usize> {
        let keep = keep.max(1) as usize;
        let ids = self.snapshot_ids()?;
        if ids.len() <= keep {
            return Ok(0);
        }

        let excess = ids.len() - keep;
        for id in &ids[..excess] {
            fs::remove_dir_all(self.store.join(id))?;
            debug!("Pruned snapshot {}", id);
        }
        Ok(excess)
    }

    /// Snapshot ids, oldest first.
    fn snapshot_ids(&self) -> Result<Vec<String>> {
        if !self.store.exists() {
            return Ok(Vec::new());
        }
        let mut ids = Vec::new();
        for entry in fs::read_dir(&self.store)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            if entry.file_type()?.is_dir() && SNAPSHOT_ID.is_match(&name) {
                ids.push(name);
            }
        }
        ids.sort();
        Ok(ids)
    }

    fn snapshot_path(&self, id: &str) -> Result<PathBuf> {
        if !SNAPSHOT_ID.is_match(id) {
            error!("Rejected snapshot id: {}", id);
            return Err(FleetingError::InvalidSnapshotId { id: id.to_string() });
        }
        Ok(self.store.join(id))
    }

    /// The wall-clock id, unless an existing snapshot sorts at or after it
    /// (same second, clock set back). Then the highest id gets a higher
    /// `-NNN` suffix, so retention never prunes the snapshot being written.
    fn next_snapshot_id(&self) -> Result<String> {
        let base = Local::now().format(SNAPSHOT_ID_FORMAT).to_string();
        let ids = self.snapshot_ids()?;
        let Some(highest) = ids.last() else {
            return Ok(base);
        };
        if base.as_str() > highest.as_str() {
            return Ok(base);
        }

        let (stamp, suffix) = highest.split_at(15);
        let used = suffix
            .strip_prefix('-')
            .and_then(|n| n.parse::<u32>().ok())
            .unwrap_or(0);
        if stamp != base {
            warn!(
                "Snapshot {} is newer than the clock; numbering after it",
                highest
            );
        }
        Ok(format!("{}-{:03}", stamp, used + 1))
    }

    /// Top-level entries of `dir`, skipping the snapshot store.
    fn root_entries(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut entries = Vec::new();
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            if entry.file_name() == BACKUP_DIR {
                continue;
            }
            entries.push(entry.path());
        }
        entries.sort();
        Ok(entries)
    }
}

/// `/`-separated path of `path` below `root`.
fn relative_key(root: &Path, path: &Path) -> Result<String> {
    let relative = path
        .strip_prefix(root)
        .map_err(|e| FleetingError::BackupFailed {
            message: format!("{} is outside the data root: {}", path.display(), e),
        })?;
    Ok(relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/"))
}
