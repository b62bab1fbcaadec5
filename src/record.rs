//! Core data structures for the fleeting engine.
//!
//! A record is a short note keyed by the second it was written. The
//! timestamp string is the identity within its container (a monthly
//! partition or the private vault).
use serde::{Deserialize, Serialize};

/// A single user note.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// `YYYY-MM-DD HH:MM:SS`, local time
    pub timestamp: String,
    /// Markdown body, stored verbatim
    pub content: String,
}

impl Record {
    pub fn new(timestamp: impl Into<String>, content: impl Into<String>) -> Self {
        Record {
            timestamp: timestamp.into(),
            content: content.into(),
        }
    }

    /// The `YYYY-MM` partition this record belongs to, derived from its timestamp.
    pub fn month_id(&self) -> Option<&str> {
        self.timestamp.get(..7)
    }
}

/// A superseded version of a record's content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    /// When the content was replaced
    pub edited_at: String,
    /// The content as it was before that edit
    pub content: String,
}

/// A search result. `month` is `None` for records from the private vault.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub month: Option<String>,
    #[serde(flatten)]
    pub record: Record,
}
