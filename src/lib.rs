//! Fleeting note-taking engine
//!
//! Short timestamped markdown records stored in monthly partition files,
//! with a derived tag index, bounded edit history, an encrypted private
//! space and change-detecting snapshots of the data root.

mod attachments;
mod backup;
mod backup_scheduler;
mod cli;
pub mod codec;
mod config;
mod errors;
mod helper;
mod history;
mod partition;
mod record;
mod search;
mod sidecar;
mod storage;
mod tags;
mod types;
mod vault;

// Re-export key components
pub use attachments::*;
pub use backup::*;
pub use backup_scheduler::*;
pub use cli::*;
pub use codec::{
    format_timestamp, next_free_timestamp, now_timestamp, parse_timestamp, RECORD_SENTINEL,
    TIMESTAMP_FORMAT,
};
pub use config::*;
pub use errors::*;
pub use helper::*;
pub use history::*;
pub use partition::*;
pub use record::*;
pub use search::*;
pub use sidecar::*;
pub use storage::*;
pub use tags::*;
pub use types::*;
pub use vault::*;
