//! Monthly partition files, `<YYYY>-<MM>.md` in the data root.
//!
//! Files hold records oldest first; every list this module returns is
//! newest first. Edits and deletes rewrite the whole file. That is linear
//! in the size of one month, which stays small for hand-written notes.
use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};

use chrono::{Local, NaiveDateTime};
use log::{debug, error, info, trace};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::{
    codec, ensure_dir, next_free_timestamp, write_atomic, FleetingError, Record, Result,
};

static PARTITION_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{4}-\d{2}$").expect("partition id pattern is valid"));

static PARTITION_FILE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{4}-\d{2})\.md$").expect("partition file pattern is valid"));

/// `YYYY-MM` of the current local month.
pub fn current_month_id() -> String {
    Local::now().format("%Y-%m").to_string()
}

pub fn is_partition_id(id: &str) -> bool {
    PARTITION_ID.is_match(id)
}

#[derive(Debug, Clone)]
pub struct PartitionStore {
    root: PathBuf,
}

impl PartitionStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `None` resolves to the current month.
    pub fn resolve_partition_file(&self, month: Option<&str>) -> Result<PathBuf> {
        match month {
            Some(id) if is_partition_id(id) => Ok(self.partition_path(id)),
            Some(id) => {
                error!("Rejected partition id: {}", id);
                Err(FleetingError::InvalidPartitionId { id: id.to_string() })
            }
            None => Ok(self.partition_path(&current_month_id())),
        }
    }

    fn partition_path(&self, id: &str) -> PathBuf {
        self.root.join(format!("{}.md", id))
    }

    /// Month ids that have a file, newest first.
    pub fn list_partition_ids(&self) -> Result<Vec<String>> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }

        let mut ids = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name();
            if let Some(caps) = PARTITION_FILE.captures(&name.to_string_lossy()) {
                ids.push(caps[1].to_string());
            }
        }

        ids.sort_unstable_by(|a, b| b.cmp(a));
        trace!("Found {} partitions", ids.len());
        Ok(ids)
    }

    /// Records of one month, newest first. A month without a file is empty.
    pub fn list(&self, month: Option<&str>) -> Result<Vec<Record>> {
        let path = self.resolve_partition_file(month)?;
        let mut records = self.load(&path)?.unwrap_or_default();
        records.reverse();
        Ok(records)
    }

    /// Appends a new record stamped with the current local time.
    pub fn append(&self, content: &str) -> Result<Record> {
        self.append_at(Local::now().naive_local(), content)
    }

    /// Appends a record stamped `at`, or the next free second after it.
    pub fn append_at(&self, at: NaiveDateTime, content: &str) -> Result<Record> {
        let timestamp = next_free_timestamp(at, |candidate| {
            let path = self.partition_path(&candidate[..7]);
            Ok(self
                .load(&path)?
                .is_some_and(|records| records.iter().any(|r| r.timestamp == candidate)))
        })?;
        let record = Record::new(timestamp, content);
        let path = self.partition_path(&record.timestamp[..7]);

        ensure_dir(&self.root)?;
        let needs_newline = fs::read(&path)
            .map(|bytes| bytes.last().is_some_and(|b| *b != b'\n'))
            .unwrap_or(false);

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| {
                error!("Failed to open partition {}: {}", path.display(), e);
                FleetingError::Io(e)
            })?;

        let mut block = String::new();
        if needs_newline {
            block.push('\n');
        }
        block.push_str(&codec::serialize_record(&record));
        file.write_all(block.as_bytes())?;
        file.flush()?;

        info!("Appended record {} to {}", record.timestamp, path.display());
        Ok(record)
    }

    /// Removes the record keyed `timestamp`.
    ///
    /// `false` only when the partition file does not exist; a missing
    /// record in an existing file still reports `true`.
    pub fn delete(&self, month: Option<&str>, timestamp: &str) -> Result<bool> {
        let path = self.resolve_partition_file(month)?;
        let Some(mut records) = self.load(&path)? else {
            debug!("Delete skipped, no partition at {}", path.display());
            return Ok(false);
        };

        match records.iter().position(|r| r.timestamp == timestamp) {
            Some(idx) => {
                records.remove(idx);
                self.rewrite(&path, &records)?;
                info!("Deleted record {} from {}", timestamp, path.display());
            }
            None => debug!("No record {} in {}", timestamp, path.display()),
        }

        Ok(true)
    }

    /// Replaces the content of the record keyed `timestamp`.
    ///
    /// Returns the content it had before, or `None` when there is no such
    /// file or record.
    pub fn edit(
        &self,
        month: Option<&str>,
        timestamp: &str,
        new_content: &str,
    ) -> Result<Option<String>> {
        let path = self.resolve_partition_file(month)?;
        let Some(mut records) = self.load(&path)? else {
            return Ok(None);
        };

        let Some(record) = records.iter_mut().find(|r| r.timestamp == timestamp) else {
            debug!("No record {} to edit in {}", timestamp, path.display());
            return Ok(None);
        };

        let prior = std::mem::replace(&mut record.content, new_content.to_string());
        self.rewrite(&path, &records)?;
        info!("Edited record {} in {}", timestamp, path.display());
        Ok(Some(prior))
    }

    /// File order, or `None` if the partition was never created.
    fn load(&self, path: &Path) -> Result<Option<Vec<Record>>> {
        if !path.exists() {
            return Ok(None);
        }
        let text = fs::read_to_string(path).map_err(|e| {
            error!("Failed to read partition {}: {}", path.display(), e);
            FleetingError::Io(e)
        })?;
        Ok(Some(codec::parse(&text)))
    }

    fn rewrite(&self, path: &Path, records: &[Record]) -> Result<()> {
        write_atomic(path, codec::serialize(records).as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse_timestamp;
    use tempfile::TempDir;

    fn at(ts: &str) -> NaiveDateTime {
        parse_timestamp(ts).unwrap()
    }

    #[test]
    fn missing_partition_lists_empty() {
        let temp = TempDir::new().unwrap();
        let store = PartitionStore::new(temp.path());
        assert!(store.list(None).unwrap().is_empty());
        assert!(store.list(Some("1999-01")).unwrap().is_empty());
        assert!(store.list_partition_ids().unwrap().is_empty());
    }

    #[test]
    fn append_then_list_newest_first() {
        let temp = TempDir::new().unwrap();
        let store = PartitionStore::new(temp.path());

        let a = store.append_at(at("2026-10-01 08:00:00"), "first").unwrap();
        let b = store.append_at(at("2026-10-02 08:00:00"), "second").unwrap();

        assert_eq!(store.list(Some("2026-10")).unwrap(), vec![b, a]);
        let raw = fs::read_to_string(temp.path().join("2026-10.md")).unwrap();
        assert!(raw.starts_with("## 2026-10-01 08:00:00\nfirst\n"));
    }

    #[test]
    fn append_uses_current_month_and_returns_listed_record() {
        let temp = TempDir::new().unwrap();
        let store = PartitionStore::new(temp.path());

        let record = store.append("Buy milk #todo").unwrap();
        let listed = store.list(None).unwrap();

        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0], record);
        assert_eq!(record.month_id(), Some(current_month_id().as_str()));
    }

    #[test]
    fn same_second_appends_get_distinct_keys() {
        let temp = TempDir::new().unwrap();
        let store = PartitionStore::new(temp.path());

        let a = store.append_at(at("2026-10-01 08:00:00"), "a").unwrap();
        let b = store.append_at(at("2026-10-01 08:00:00"), "b").unwrap();

        assert_eq!(a.timestamp, "2026-10-01 08:00:00");
        assert_eq!(b.timestamp, "2026-10-01 08:00:01");
    }

    #[test]
    fn append_repairs_missing_trailing_newline() {
        let temp = TempDir::new().unwrap();
        let store = PartitionStore::new(temp.path());
        fs::write(
            temp.path().join("2026-10.md"),
            "## 2026-10-01 08:00:00\nhand edited",
        )
        .unwrap();

        store.append_at(at("2026-10-02 08:00:00"), "next").unwrap();

        let listed = store.list(Some("2026-10")).unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[1].content, "hand edited");
    }

    #[test]
    fn partition_ids_are_descending_and_filtered() {
        let temp = TempDir::new().unwrap();
        let store = PartitionStore::new(temp.path());
        store.append_at(at("2025-12-31 23:00:00"), "old").unwrap();
        store.append_at(at("2026-02-01 00:00:00"), "new").unwrap();
        fs::write(temp.path().join("notes.md"), "").unwrap();
        fs::write(temp.path().join("2026-1.md"), "").unwrap();
        fs::create_dir(temp.path().join("2026-05.md")).unwrap();

        assert_eq!(store.list_partition_ids().unwrap(), vec!["2026-02", "2025-12"]);
    }

    #[test]
    fn delete_removes_only_the_matching_record() {
        let temp = TempDir::new().unwrap();
        let store = PartitionStore::new(temp.path());
        let a = store.append_at(at("2026-10-01 08:00:00"), "keep\n---\nme").unwrap();
        let b = store.append_at(at("2026-10-02 08:00:00"), "drop").unwrap();
        let c = store.append_at(at("2026-10-03 08:00:00"), "keep too").unwrap();

        assert!(store.delete(Some("2026-10"), &b.timestamp).unwrap());
        assert_eq!(store.list(Some("2026-10")).unwrap(), vec![c, a]);
    }

    #[test]
    fn delete_reports_missing_file_but_not_missing_record() {
        let temp = TempDir::new().unwrap();
        let store = PartitionStore::new(temp.path());
        assert!(!store.delete(Some("2026-10"), "2026-10-01 08:00:00").unwrap());

        store.append_at(at("2026-10-01 08:00:00"), "x").unwrap();
        assert!(store.delete(Some("2026-10"), "2026-10-09 09:09:09").unwrap());
        assert_eq!(store.list(Some("2026-10")).unwrap().len(), 1);
    }

    #[test]
    fn edit_returns_prior_content() {
        let temp = TempDir::new().unwrap();
        let store = PartitionStore::new(temp.path());
        let a = store.append_at(at("2026-10-01 08:00:00"), "before").unwrap();

        let prior = store.edit(Some("2026-10"), &a.timestamp, "after").unwrap();
        assert_eq!(prior.as_deref(), Some("before"));
        assert_eq!(store.list(Some("2026-10")).unwrap()[0].content, "after");

        assert!(store
            .edit(Some("2026-10"), "2026-10-05 00:00:00", "x")
            .unwrap()
            .is_none());
        assert!(store
            .edit(Some("2026-09"), &a.timestamp, "x")
            .unwrap()
            .is_none());
    }

    #[test]
    fn rejects_malformed_month_ids() {
        let temp = TempDir::new().unwrap();
        let store = PartitionStore::new(temp.path());
        assert!(matches!(
            store.list(Some("../etc")),
            Err(FleetingError::InvalidPartitionId { .. })
        ));
    }
}
