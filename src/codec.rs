//! Text representation of a record list.
//!
//! Each record is written as a heading line, its content and a sentinel:
//!
//! ```text
//! ## 2026-10-17 09:30:00
//! Buy milk #todo
//! <!-- fleeting:end -->
//! ```
//!
//! Boundaries are found only by looking ahead for the next heading line, so
//! nothing a user types inside a record can split it. The sentinel is
//! stripped when present but never used to find where a record ends.
use chrono::{DateTime, Duration, Local, NaiveDateTime, TimeZone};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::{Record, Result};

/// Fixed-width, second resolution.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Closes every serialized record. An HTML comment, so markdown viewers hide it.
pub const RECORD_SENTINEL: &str = "<!-- fleeting:end -->";

/// Separator line written by the older delimiter-split format.
const LEGACY_SEPARATOR: &str = "---";

static HEADING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^## (\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2})$").expect("heading pattern is valid")
});

/// Parses a partition or vault body into records, in file order.
///
/// Text before the first heading is discarded.
pub fn parse(text: &str) -> Vec<Record> {
    let mut records = Vec::new();
    let mut current: Option<(String, Vec<&str>)> = None;

    for line in text.split_inclusive('\n') {
        if let Some(caps) = HEADING.captures(strip_eol(line)) {
            if let Some((timestamp, body)) = current.take() {
                records.push(finish_record(timestamp, body));
            }
            current = Some((caps[1].to_string(), Vec::new()));
        } else if let Some((_, body)) = current.as_mut() {
            body.push(line);
        }
    }

    if let Some((timestamp, body)) = current {
        records.push(finish_record(timestamp, body));
    }

    records
}

/// Serializes records in the order given. Callers pass them oldest first.
pub fn serialize(records: &[Record]) -> String {
    records.iter().map(serialize_record).collect()
}

/// One record block, ready to be appended to a partition file.
pub fn serialize_record(record: &Record) -> String {
    format!(
        "## {}\n{}\n{}\n",
        record.timestamp, record.content, RECORD_SENTINEL
    )
}

pub fn format_timestamp<Tz: TimeZone>(instant: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    instant.format(TIMESTAMP_FORMAT).to_string()
}

/// Current local time as a record timestamp.
pub fn now_timestamp() -> String {
    format_timestamp(&Local::now())
}

pub fn parse_timestamp(timestamp: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(timestamp, TIMESTAMP_FORMAT).ok()
}

/// First timestamp at or after `start`, stepping whole seconds, that
/// `is_taken` rejects. Keeps the key unique when two records land in the
/// same second.
pub fn next_free_timestamp(
    start: NaiveDateTime,
    mut is_taken: impl FnMut(&str) -> Result<bool>,
) -> Result<String> {
    let mut instant = start;
    loop {
        let timestamp = instant.format(TIMESTAMP_FORMAT).to_string();
        if !is_taken(&timestamp)? {
            return Ok(timestamp);
        }
        instant += Duration::seconds(1);
    }
}

fn strip_eol(line: &str) -> &str {
    line.trim_end_matches(['\n', '\r'])
}

fn finish_record(timestamp: String, mut body: Vec<&str>) -> Record {
    // The terminator line tells whether the block was written with CRLF.
    let mut terminator = None;

    // Blank lines after the sentinel come from hand edits; drop them with it.
    let last_filled = body.iter().rposition(|line| !strip_eol(line).is_empty());
    match last_filled {
        Some(idx) if strip_eol(body[idx]) == RECORD_SENTINEL => {
            terminator = Some(body[idx]);
            body.truncate(idx);
        }
        _ => {
            if let Some(&line) = body.last() {
                if strip_eol(line) == LEGACY_SEPARATOR {
                    terminator = Some(line);
                    body.pop();
                }
            }
        }
    }

    let eol = match terminator {
        Some(line) if line.ends_with("\r\n") => "\r\n",
        _ => "\n",
    };
    let mut content = body.concat();
    if content.ends_with(eol) {
        content.truncate(content.len() - eol.len());
    }

    Record { timestamp, content }
}
