use std::path::{Path, PathBuf};

use chrono::Local;
use log::{debug, error, info, warn};

use crate::{
    backup::BackupManager, ensure_dir, next_free_timestamp, private_tags, save_attachment,
    BackupSchedule, BackupUnit, FleetingError, GlobalConfig, HistoryEntry, HistoryLog,
    PartitionStore, PrivateVault, Record, Result, SearchHit, SearchQuery, SidecarFile,
    SnapshotInfo, TagIndex, VaultSession, VaultSettings,
};

/// The record engine for one data root.
///
/// Every call is synchronous and blocking. Mutating calls take `&mut self`;
/// callers that share an engine (the backup scheduler, for one) wrap it in
/// a single mutex so writes and snapshots never interleave.
pub struct RecordStorage {
    /// Machine-level configuration
    config: GlobalConfig,

    /// Where `config` is persisted
    config_path: PathBuf,

    /// Key derivation cost for the vault
    vault_settings: VaultSettings,

    partitions: PartitionStore,
    tags: TagIndex,
    history: HistoryLog,
    vault: PrivateVault,
    backups: BackupManager,

    /// Private unlock state, never persisted
    session: VaultSession,
}

impl RecordStorage {
    /// Opens the data root named by `config`, creating it if needed.
    ///
    /// # Arguments
    ///
    /// * `config` - The loaded machine configuration
    /// * `config_path` - Where configuration changes are saved
    pub fn open(config: GlobalConfig, config_path: PathBuf) -> Result<Self> {
        Self::open_with(config, config_path, VaultSettings::default())
    }

    /// Like [`RecordStorage::open`], with explicit vault key-derivation cost.
    pub fn open_with(
        config: GlobalConfig,
        config_path: PathBuf,
        vault_settings: VaultSettings,
    ) -> Result<Self> {
        let root = config.storage_dir.clone();
        info!("Opening record storage at {}", root.display());
        ensure_dir(&root)?;

        let sidecar = SidecarFile::new(&root);
        let storage = Self {
            partitions: PartitionStore::new(&root),
            tags: TagIndex::new(sidecar.clone()),
            history: HistoryLog::new(sidecar),
            vault: PrivateVault::new(&root, vault_settings),
            backups: BackupManager::new(&root),
            session: VaultSession::new(),
            config,
            config_path,
            vault_settings,
        };

        // Partitions may have been edited by hand since the last run.
        storage.tags.rebuild(&storage.partitions)?;
        Ok(storage)
    }

    pub fn root(&self) -> &Path {
        self.partitions.root()
    }

    /// Month ids with a partition file, newest first.
    pub fn list_partitions(&self) -> Result<Vec<String>> {
        self.partitions.list_partition_ids()
    }

    /// Records newest first. `month` is ignored for the private space, which
    /// reads as empty while locked.
    pub fn list_records(&self, month: Option<&str>, is_private: bool) -> Result<Vec<Record>> {
        if is_private {
            return Ok(self.private_records_newest_first());
        }
        self.partitions.list(month)
    }

    /// Private records newest first, failing loudly instead of reading a
    /// locked or undecryptable vault as empty.
    pub fn try_list_private_records(&self) -> Result<Vec<Record>> {
        let mut records = self.vault.try_read_all(&self.session)?;
        records.reverse();
        Ok(records)
    }

    /// Stores a new record and returns it with its assigned timestamp.
    pub fn add_record(&mut self, content: &str, is_private: bool) -> Result<Record> {
        if !is_private {
            let record = self.partitions.append(content)?;
            self.tags.rebuild(&self.partitions)?;
            return Ok(record);
        }

        let mut records = self.vault.try_read_all(&self.session)?;
        let timestamp = next_free_timestamp(Local::now().naive_local(), |candidate| {
            Ok(records.iter().any(|r| r.timestamp == candidate))
        })?;
        let record = Record::new(timestamp, content);
        records.push(record.clone());
        self.vault.write_all(&self.session, &records)?;
        info!("Added private record {}", record.timestamp);
        Ok(record)
    }

    /// Replaces a record's content.
    ///
    /// Public edits push the previous content onto the record's history and
    /// refresh the tag index. `false` when the record is not found.
    pub fn edit_record(
        &mut self,
        month: Option<&str>,
        timestamp: &str,
        new_content: &str,
        is_private: bool,
    ) -> Result<bool> {
        if !is_private {
            let Some(prior) = self.partitions.edit(month, timestamp, new_content)? else {
                return Ok(false);
            };
            self.history.record(timestamp, &prior)?;
            self.tags.rebuild(&self.partitions)?;
            return Ok(true);
        }

        let mut records = self.vault.try_read_all(&self.session)?;
        let Some(record) = records.iter_mut().find(|r| r.timestamp == timestamp) else {
            debug!("No private record {} to edit", timestamp);
            return Ok(false);
        };
        record.content = new_content.to_string();
        self.vault.write_all(&self.session, &records)?;
        info!("Edited private record {}", timestamp);
        Ok(true)
    }

    /// Deletes a record.
    ///
    /// Public: `false` only when the month has no file, `true` otherwise even
    /// if no record matched. Private: `true` when a record was removed.
    pub fn delete_record(
        &mut self,
        month: Option<&str>,
        timestamp: &str,
        is_private: bool,
    ) -> Result<bool> {
        if !is_private {
            let existed = self.partitions.delete(month, timestamp)?;
            if existed {
                self.tags.rebuild(&self.partitions)?;
            }
            return Ok(existed);
        }

        let mut records = self.vault.try_read_all(&self.session)?;
        let Some(idx) = records.iter().position(|r| r.timestamp == timestamp) else {
            return Ok(false);
        };
        records.remove(idx);
        self.vault.write_all(&self.session, &records)?;
        info!("Deleted private record {}", timestamp);
        Ok(true)
    }

    /// Searches every partition (newest month first) or the private vault.
    pub fn search_records(&self, query: &str, is_private: bool) -> Result<Vec<SearchHit>> {
        let query = SearchQuery::parse(query);
        info!("Searching {} space", if is_private { "private" } else { "public" });

        if is_private {
            return Ok(self
                .private_records_newest_first()
                .into_iter()
                .filter(|r| query.matches(&r.content))
                .map(|record| SearchHit { month: None, record })
                .collect());
        }

        let mut hits = Vec::new();
        for month in self.partitions.list_partition_ids()? {
            for record in self.partitions.list(Some(&month))? {
                if query.matches(&record.content) {
                    hits.push(SearchHit {
                        month: Some(month.clone()),
                        record,
                    });
                }
            }
        }
        debug!("Search matched {} records", hits.len());
        Ok(hits)
    }

    /// Sorted tags in use. Private tags are computed from the vault on every
    /// call and are empty while locked.
    pub fn list_tags(&self, is_private: bool) -> Result<Vec<String>> {
        if is_private {
            return Ok(private_tags(&self.private_records_newest_first()));
        }
        self.tags.list()
    }

    /// Previous versions of a public record, most recent first.
    pub fn get_history(&self, timestamp: &str) -> Result<Vec<HistoryEntry>> {
        self.history.get(timestamp)
    }

    /// Unlocks (or on first use, creates) the private vault for this session.
    pub fn unlock_private(&mut self, passphrase: &str) -> Result<bool> {
        let unlocked = self.vault.unlock(&mut self.session, passphrase)?;
        if !unlocked {
            warn!("Private vault unlock failed");
        }
        Ok(unlocked)
    }

    /// Ends the private session.
    pub fn lock_private(&mut self) {
        self.session.lock();
    }

    pub fn is_private_unlocked(&self) -> bool {
        self.session.is_unlocked()
    }

    /// Saves a pasted attachment and returns its path relative to the root.
    pub fn save_attachment(&mut self, bytes: &[u8], extension: &str) -> Result<String> {
        save_attachment(self.root(), bytes, extension)
    }

    /// Snapshots the data root unless nothing changed since the last
    /// snapshot. Returns whether a snapshot was written.
    pub fn backup_now(&mut self) -> Result<bool> {
        let outcome = self.backups.backup_now(
            self.config.last_backup_hash.as_deref(),
            self.config.backup_keep,
        )?;

        if let crate::BackupOutcome::Created { id, hash } = outcome {
            self.config.last_backup_hash = Some(hash.clone());
            let root = self.config.storage_dir.clone();
            self.update_config_file(|on_disk| {
                if on_disk.storage_dir == root {
                    on_disk.last_backup_hash = Some(hash);
                } else {
                    warn!(
                        "Config now names {}, not recording baseline for {}",
                        on_disk.storage_dir.display(),
                        root.display()
                    );
                }
            })?;
            info!("Backup {} recorded as new baseline", id);
            return Ok(true);
        }
        Ok(false)
    }

    /// Snapshots, newest first.
    pub fn list_backups(&self) -> Result<Vec<SnapshotInfo>> {
        self.backups.list_snapshots()
    }

    pub fn delete_backup(&mut self, id: &str) -> Result<bool> {
        self.backups.delete_snapshot(id)
    }

    /// Replaces the data root with snapshot `id`. The private session is
    /// locked afterwards since the vault may have changed underneath it.
    pub fn restore_backup(&mut self, id: &str) -> Result<bool> {
        let restored = self.backups.restore(id)?;
        if restored {
            self.session.lock();
            info!("Data root restored from {}", id);
        }
        Ok(restored)
    }

    pub fn backup_config(&self) -> BackupSchedule {
        self.config.backup_schedule()
    }

    /// Updates backup timing and retention and persists them. Rescheduling a
    /// running timer is the scheduler's job.
    pub fn set_backup_config(
        &mut self,
        interval: i64,
        unit: BackupUnit,
        keep: u32,
    ) -> Result<BackupSchedule> {
        let schedule = BackupSchedule {
            interval,
            unit,
            keep,
        };
        self.config.set_backup_schedule(schedule);
        self.update_config_file(|on_disk| on_disk.set_backup_schedule(schedule))?;
        info!("Backup schedule set to {:?}", schedule);
        Ok(schedule)
    }

    pub fn global_config(&self) -> &GlobalConfig {
        &self.config
    }

    /// Replaces the configuration. Moving the data root re-targets every
    /// component, locks the private session and forgets the backup baseline.
    /// The file is only written once the new root has opened.
    pub fn set_global_config(&mut self, mut config: GlobalConfig) -> Result<()> {
        if config.storage_dir != self.config.storage_dir {
            config.last_backup_hash = None;
            self.retarget(config.clone())?;
            return config.save(&self.config_path);
        }

        config.last_backup_hash = self.config.last_backup_hash.clone();
        config.save(&self.config_path)?;
        self.config = config;
        Ok(())
    }

    /// Re-reads the config file so changes made by another process take
    /// effect here. Returns the backup schedule now in force.
    pub fn reload_config(&mut self) -> Result<BackupSchedule> {
        if !self.config_path.exists() {
            return Ok(self.backup_config());
        }

        let on_disk = GlobalConfig::load(&self.config_path)?;
        if on_disk.storage_dir != self.config.storage_dir {
            self.retarget(on_disk)?;
        } else if on_disk != self.config {
            debug!("Config reloaded from {}", self.config_path.display());
            self.config = on_disk;
        }
        Ok(self.backup_config())
    }

    fn retarget(&mut self, config: GlobalConfig) -> Result<()> {
        info!(
            "Data root moving from {} to {}",
            self.config.storage_dir.display(),
            config.storage_dir.display()
        );
        let reopened = Self::open_with(config, self.config_path.clone(), self.vault_settings)
            .map_err(|e| {
                error!("Failed to open new data root: {}", e);
                e
            })?;
        *self = reopened;
        Ok(())
    }

    /// Applies `change` to the config file as it is on disk now, so fields
    /// written by another process survive. Without a file the in-memory
    /// config is the starting point.
    fn update_config_file(&self, change: impl FnOnce(&mut GlobalConfig)) -> Result<()> {
        let mut on_disk = if self.config_path.exists() {
            GlobalConfig::load(&self.config_path)?
        } else {
            self.config.clone()
        };
        change(&mut on_disk);
        on_disk.save(&self.config_path)
    }

    fn private_records_newest_first(&self) -> Vec<Record> {
        let mut records = self.vault.read_all(&self.session);
        records.reverse();
        records
    }
}

impl std::fmt::Debug for RecordStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordStorage")
            .field("root", &self.root())
            .field("private_unlocked", &self.session.is_unlocked())
            .finish()
    }
}

/// Drops the line ending that stdin input carries. Content that is only
/// whitespace is rejected; anything else is kept as typed.
pub fn require_content(content: &str) -> Result<&str> {
    if content.trim().is_empty() {
        return Err(FleetingError::ApplicationError {
            message: "record content is empty".to_string(),
        });
    }
    let content = content
        .strip_suffix('\n')
        .map(|rest| rest.strip_suffix('\r').unwrap_or(rest))
        .unwrap_or(content);
    Ok(content)
}
