//! Shared types for the fleeting application.
//!
//! Holds the crate-wide `Result` alias and the CLI subcommands.
use std::path::PathBuf;

use clap::Subcommand;

use crate::{BackupUnit, FleetingError};

/// A specialized Result type for fleeting operations.
pub type Result<T> = std::result::Result<T, FleetingError>;

/// Available subcommands for the fleeting application
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List months that have records, newest first
    Months,

    /// List records, newest first
    List {
        /// Month to list (YYYY-MM), defaults to the current month
        #[clap(short, long)]
        month: Option<String>,

        /// Use the encrypted private space
        #[clap(short, long)]
        private: bool,

        /// Format output as JSON
        #[clap(short, long)]
        json: bool,
    },

    /// Add a record stamped with the current time
    Add {
        /// Record content; read from stdin when omitted
        content: Option<String>,

        /// Use the encrypted private space
        #[clap(short, long)]
        private: bool,
    },

    /// Replace a record's content
    Edit {
        /// Timestamp of the record ("YYYY-MM-DD HH:MM:SS")
        timestamp: String,

        /// New content; read from stdin when omitted
        content: Option<String>,

        /// Month holding the record, derived from the timestamp when omitted
        #[clap(short, long)]
        month: Option<String>,

        /// Use the encrypted private space
        #[clap(short, long)]
        private: bool,
    },

    /// Delete a record
    Delete {
        /// Timestamp of the record ("YYYY-MM-DD HH:MM:SS")
        timestamp: String,

        /// Month holding the record, derived from the timestamp when omitted
        #[clap(short, long)]
        month: Option<String>,

        /// Use the encrypted private space
        #[clap(short, long)]
        private: bool,

        /// Skip confirmation prompt
        #[clap(short, long)]
        force: bool,
    },

    /// Search records by words and #tags
    Search {
        /// Search query, e.g. "milk #todo"
        query: String,

        /// Use the encrypted private space
        #[clap(short, long)]
        private: bool,

        /// Limit the number of search results (0 means no limit)
        #[clap(short = 'n', long, default_value_t = 0)]
        limit: usize,

        /// Format output as JSON
        #[clap(short, long)]
        json: bool,
    },

    /// List tags in use
    Tags {
        /// Use the encrypted private space
        #[clap(short, long)]
        private: bool,
    },

    /// Show previous versions of a public record
    History {
        /// Timestamp of the record ("YYYY-MM-DD HH:MM:SS")
        timestamp: String,
    },

    /// Check a passphrase against the private vault, creating it on first use
    UnlockCheck,

    /// Copy a file into the attachment directory and print its markdown link
    Attach {
        /// File to attach
        file: PathBuf,
    },

    /// Snapshot the data root now
    Backup,

    /// List snapshots, newest first
    Backups,

    /// Replace the data root with a snapshot
    Restore {
        /// Snapshot id (YYYYMMDD-HHMMSS)
        id: String,

        /// Skip confirmation prompt
        #[clap(short, long)]
        force: bool,
    },

    /// Delete a snapshot
    DeleteBackup {
        /// Snapshot id (YYYYMMDD-HHMMSS)
        id: String,
    },

    /// Show or change backup timing and retention
    BackupConfig {
        /// Interval between scheduled backups; 0 disables them
        #[clap(short, long)]
        interval: Option<i64>,

        /// Unit of the interval
        #[clap(short, long, value_enum)]
        unit: Option<BackupUnit>,

        /// Snapshots to keep
        #[clap(short, long)]
        keep: Option<u32>,
    },

    /// Show the configuration, or move the data root
    Config {
        /// New data root directory
        #[clap(long)]
        storage_dir: Option<PathBuf>,
    },

    /// Run scheduled backups until interrupted
    Daemon,
}
