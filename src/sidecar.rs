//! The structured sidecar kept next to the partitions:
//! `{ "tags": [...], "history": { "<timestamp>": [HistoryEntry, ...] } }`.
use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use log::{debug, error};
use serde::{Deserialize, Serialize};

use crate::{write_atomic, FleetingError, HistoryEntry, Result};

pub const SIDECAR_FILE: &str = "meta.json";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Sidecar {
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub history: BTreeMap<String, Vec<HistoryEntry>>,
}

/// Location of the sidecar inside a data root.
#[derive(Debug, Clone)]
pub struct SidecarFile {
    path: PathBuf,
}

impl SidecarFile {
    pub fn new(root: &Path) -> Self {
        Self {
            path: root.join(SIDECAR_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Missing file reads as an empty sidecar.
    pub fn load(&self) -> Result<Sidecar> {
        if !self.path.exists() {
            return Ok(Sidecar::default());
        }
        let text = fs::read_to_string(&self.path).map_err(|e| {
            error!("Failed to read sidecar {}: {}", self.path.display(), e);
            FleetingError::Io(e)
        })?;
        if text.trim().is_empty() {
            return Ok(Sidecar::default());
        }
        Ok(serde_json::from_str(&text)?)
    }

    pub fn save(&self, sidecar: &Sidecar) -> Result<()> {
        let json = serde_json::to_string_pretty(sidecar)?;
        write_atomic(&self.path, json.as_bytes())?;
        debug!("Sidecar saved to {}", self.path.display());
        Ok(())
    }

    /// Load, apply `change`, save.
    pub fn update<T>(&self, change: impl FnOnce(&mut Sidecar) -> T) -> Result<T> {
        let mut sidecar = self.load()?;
        let out = change(&mut sidecar);
        self.save(&sidecar)?;
        Ok(out)
    }
}
