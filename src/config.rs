use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use clap::ValueEnum;
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::{write_atomic, FleetingError, Result};

const CONFIG_DIR_NAME: &str = "fleeting";
const CONFIG_FILE_NAME: &str = "config.json";

/// Unit of the backup interval.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BackupUnit {
    Hours,
    #[default]
    Days,
}

impl BackupUnit {
    fn seconds(self) -> u64 {
        match self {
            BackupUnit::Hours => 60 * 60,
            BackupUnit::Days => 24 * 60 * 60,
        }
    }
}

/// Backup timing and retention, as edited in settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupSchedule {
    /// Non-positive disables scheduled backups
    pub interval: i64,
    pub unit: BackupUnit,
    /// Snapshots to keep; anything below 1 keeps 1
    pub keep: u32,
}

/// Longest period between scheduled backups (100 years).
pub const MAX_BACKUP_PERIOD: Duration = Duration::from_secs(100 * 365 * 86400);

impl BackupSchedule {
    /// Time between scheduled backups, `None` when disabled. Capped at
    /// [`MAX_BACKUP_PERIOD`].
    pub fn period(&self) -> Option<Duration> {
        if self.interval <= 0 {
            return None;
        }
        let secs = (self.interval as u64).saturating_mul(self.unit.seconds());
        Some(Duration::from_secs(secs).min(MAX_BACKUP_PERIOD))
    }
}

/// Machine-level settings, kept outside the data root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalConfig {
    /// Data root holding partitions, the vault, attachments and snapshots
    pub storage_dir: PathBuf,

    #[serde(default = "default_backup_interval")]
    pub backup_interval: i64,

    #[serde(default)]
    pub backup_unit: BackupUnit,

    #[serde(default = "default_backup_keep")]
    pub backup_keep: u32,

    /// Fingerprint of the data root at the last snapshot
    #[serde(default)]
    pub last_backup_hash: Option<String>,
}

fn default_backup_interval() -> i64 {
    1
}

fn default_backup_keep() -> u32 {
    10
}

/// `~/Documents/fleeting`, falling back to the home directory.
pub fn default_storage_dir() -> PathBuf {
    dirs::document_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(CONFIG_DIR_NAME)
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            storage_dir: default_storage_dir(),
            backup_interval: default_backup_interval(),
            backup_unit: BackupUnit::default(),
            backup_keep: default_backup_keep(),
            last_backup_hash: None,
        }
    }
}

impl GlobalConfig {
    /// `<config dir>/fleeting/config.json`
    pub fn default_path() -> Result<PathBuf> {
        dirs::config_dir()
            .map(|dir| dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
            .ok_or_else(|| FleetingError::ConfigError {
                message: "no configuration directory on this platform".to_string(),
            })
    }

    /// Reads the config at `path`; a missing file gives the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let text = fs::read_to_string(path)?;
        serde_json::from_str(&text).map_err(|e| FleetingError::ConfigError {
            message: format!("{}: {}", path.display(), e),
        })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        write_atomic(path, json.as_bytes())?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }

    pub fn backup_schedule(&self) -> BackupSchedule {
        BackupSchedule {
            interval: self.backup_interval,
            unit: self.backup_unit,
            keep: self.backup_keep,
        }
    }

    pub fn set_backup_schedule(&mut self, schedule: BackupSchedule) {
        self.backup_interval = schedule.interval;
        self.backup_unit = schedule.unit;
        self.backup_keep = schedule.keep;
    }
}
