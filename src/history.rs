//! Bounded edit history, keyed by record timestamp.
//!
//! Only public records have history. Private edits leave no trace in the
//! plaintext sidecar.
use log::debug;

use crate::{now_timestamp, HistoryEntry, Result, SidecarFile};

/// Entries kept per record.
pub const HISTORY_LIMIT: usize = 10;

#[derive(Debug, Clone)]
pub struct HistoryLog {
    sidecar: SidecarFile,
}

impl HistoryLog {
    pub fn new(sidecar: SidecarFile) -> Self {
        Self { sidecar }
    }

    /// Pushes `prior_content` as the newest entry for `timestamp`, evicting
    /// the oldest beyond [`HISTORY_LIMIT`].
    pub fn record(&self, timestamp: &str, prior_content: &str) -> Result<()> {
        let entry = HistoryEntry {
            edited_at: now_timestamp(),
            content: prior_content.to_string(),
        };

        let kept = self.sidecar.update(|sidecar| {
            let entries = sidecar.history.entry(timestamp.to_string()).or_default();
            entries.insert(0, entry);
            entries.truncate(HISTORY_LIMIT);
            entries.len()
        })?;

        debug!("History for {} now holds {} entries", timestamp, kept);
        Ok(())
    }

    /// Most recent first; empty when the record was never edited.
    pub fn get(&self, timestamp: &str) -> Result<Vec<HistoryEntry>> {
        Ok(self
            .sidecar
            .load()?
            .history
            .remove(timestamp)
            .unwrap_or_default())
    }
}
