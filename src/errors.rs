//! Error types for the fleeting record engine.
//!
//! Missing partitions and snapshots are not errors: those operations report
//! `Ok(false)` or an empty list. Everything here is a failure the caller
//! has to see.

use std::{io, path::PathBuf};

use thiserror::Error;

/// The main error type for the fleeting engine.
#[derive(Error, Debug)]
pub enum FleetingError {
    /// Errors related to file I/O operations.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Errors related to serialization/deserialization of JSON sidecars and config.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Directory traversal failed while hashing or copying the data root.
    #[error("Directory walk error: {0}")]
    Walk(#[from] walkdir::Error),

    /// A month id that does not look like `YYYY-MM`.
    #[error("Invalid partition id: {id}")]
    InvalidPartitionId { id: String },

    /// A snapshot id that could escape the backup store.
    #[error("Invalid snapshot id: {id}")]
    InvalidSnapshotId { id: String },

    /// A private operation was attempted without an unlocked session.
    #[error("Private vault is locked")]
    VaultLocked,

    /// Wrong passphrase or tampered ciphertext. The two are not told apart.
    #[error("Private vault authentication failed")]
    VaultAuthentication,

    /// The vault file does not decompose into `nonce:tag:ciphertext`.
    #[error("Malformed vault encoding: {message}")]
    MalformedVault { message: String },

    /// Key derivation or cipher setup failed.
    #[error("Crypto error: {message}")]
    Crypto { message: String },

    /// Errors related to backup operations.
    #[error("Backup failed: {message}")]
    BackupFailed { message: String },

    /// Error when attempting to restore from a snapshot.
    #[error("Restore failed: {message}")]
    RestoreFailed { message: String },

    /// Errors related to configuration.
    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    /// Directory creation or access failed.
    #[error("Failed to create or access directory: {path}")]
    DirectoryError { path: PathBuf },

    /// Generic application error with a custom message.
    #[error("{message}")]
    ApplicationError { message: String },
}

impl FleetingError {
    /// True for the failures `unlock` folds into a plain `false`.
    pub fn is_vault_auth_failure(&self) -> bool {
        matches!(
            self,
            FleetingError::VaultAuthentication | FleetingError::MalformedVault { .. }
        )
    }
}
