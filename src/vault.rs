//! The private vault: one AES-256-GCM encrypted file holding a record list.
//!
//! On disk the vault is `private.enc`, either empty (never unlocked) or
//! `hex(nonce):hex(tag):hex(ciphertext)`. The Argon2id salt sits next to it
//! in `private.salt`, generated when the vault is first created.
//!
//! Unlocking derives the key and keeps it in a [`VaultSession`] owned by
//! the caller. Nothing about the passphrase is process-global.
use std::{
    fs,
    path::{Path, PathBuf},
};

use aes_gcm::{
    aead::{AeadInPlace, KeyInit},
    Aes256Gcm, Nonce, Tag,
};
use argon2::{Algorithm, Argon2, Params, Version};
use log::{debug, error, info, warn};
use rand::{rngs::OsRng, RngCore};
use zeroize::Zeroizing;

use crate::{codec, write_atomic, FleetingError, Record, Result};

pub const VAULT_FILE: &str = "private.enc";
pub const SALT_FILE: &str = "private.salt";

const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;
const SALT_LEN: usize = 16;
const MIN_SALT_LEN: usize = 8;

/// Argon2id cost parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VaultSettings {
    /// Memory in KiB
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for VaultSettings {
    fn default() -> Self {
        Self {
            memory_kib: Params::DEFAULT_M_COST,
            iterations: Params::DEFAULT_T_COST,
            parallelism: Params::DEFAULT_P_COST,
        }
    }
}

impl VaultSettings {
    fn params(&self) -> Result<Params> {
        Params::new(
            self.memory_kib,
            self.iterations,
            self.parallelism,
            Some(KEY_LEN),
        )
        .map_err(|e| FleetingError::Crypto {
            message: format!("Invalid key derivation parameters: {}", e),
        })
    }
}

/// Unlocked state for one session. Holds the derived key only.
#[derive(Default)]
pub struct VaultSession {
    key: Option<Zeroizing<[u8; KEY_LEN]>>,
}

impl VaultSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_unlocked(&self) -> bool {
        self.key.is_some()
    }

    /// Forgets the key. Private reads return nothing until the next unlock.
    pub fn lock(&mut self) {
        if self.key.take().is_some() {
            debug!("Private session locked");
        }
    }

    fn key(&self) -> Result<&[u8; KEY_LEN]> {
        self.key.as_deref().ok_or(FleetingError::VaultLocked)
    }
}

impl std::fmt::Debug for VaultSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultSession")
            .field("unlocked", &self.is_unlocked())
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct PrivateVault {
    path: PathBuf,
    salt_path: PathBuf,
    settings: VaultSettings,
}

impl PrivateVault {
    pub fn new(root: &Path, settings: VaultSettings) -> Self {
        Self {
            path: root.join(VAULT_FILE),
            salt_path: root.join(SALT_FILE),
            settings,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the vault has been created. An empty file counts as absent.
    pub fn exists(&self) -> Result<bool> {
        if !self.path.exists() {
            return Ok(false);
        }
        Ok(!fs::read_to_string(&self.path)?.trim().is_empty())
    }

    /// Opens the vault for this session.
    ///
    /// The first unlock creates an empty vault under `passphrase` and always
    /// succeeds. Afterwards a wrong passphrase and a damaged file both give
    /// `false`, and leave the session locked.
    pub fn unlock(&self, session: &mut VaultSession, passphrase: &str) -> Result<bool> {
        session.lock();

        if !self.exists()? {
            let mut salt = [0u8; SALT_LEN];
            OsRng.fill_bytes(&mut salt);
            write_atomic(&self.salt_path, hex::encode(salt).as_bytes())?;

            session.key = Some(self.derive_key(passphrase, &salt)?);
            self.write_all(session, &[])?;
            info!("Created private vault at {}", self.path.display());
            return Ok(true);
        }

        let Some(salt) = self.load_salt()? else {
            warn!("Private vault has no usable salt; cannot unlock");
            return Ok(false);
        };
        let key = self.derive_key(passphrase, &salt)?;

        let encoded = fs::read_to_string(&self.path)?;
        match open(&key, encoded.trim()) {
            Ok(_) => {
                session.key = Some(key);
                info!("Private vault unlocked");
                Ok(true)
            }
            Err(e) if e.is_vault_auth_failure() => {
                debug!("Private vault unlock rejected: {}", e);
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// All private records, or an empty list if the session is locked or the
    /// vault cannot be decrypted. Use [`PrivateVault::try_read_all`] to tell
    /// those cases apart from an empty vault.
    pub fn read_all(&self, session: &VaultSession) -> Vec<Record> {
        match self.try_read_all(session) {
            Ok(records) => records,
            Err(e) => {
                warn!("Private vault unreadable, treating as empty: {}", e);
                Vec::new()
            }
        }
    }

    /// All private records in file order, oldest first.
    pub fn try_read_all(&self, session: &VaultSession) -> Result<Vec<Record>> {
        let key = session.key()?;
        if !self.exists()? {
            return Ok(Vec::new());
        }

        let encoded = fs::read_to_string(&self.path)?;
        let plaintext = open(key, encoded.trim())?;
        let text = String::from_utf8(plaintext).map_err(|_| FleetingError::MalformedVault {
            message: "decrypted vault is not UTF-8".to_string(),
        })?;
        Ok(codec::parse(&text))
    }

    /// Re-encrypts the full list under a fresh nonce and replaces the file.
    pub fn write_all(&self, session: &VaultSession, records: &[Record]) -> Result<()> {
        let key = session.key()?;
        let plaintext = codec::serialize(records);
        let encoded = seal(key, plaintext.as_bytes())?;
        write_atomic(&self.path, encoded.as_bytes())?;
        debug!("Private vault rewritten with {} records", records.len());
        Ok(())
    }

    fn load_salt(&self) -> Result<Option<Vec<u8>>> {
        if !self.salt_path.exists() {
            return Ok(None);
        }
        let text = fs::read_to_string(&self.salt_path)?;
        match hex::decode(text.trim()) {
            Ok(salt) if salt.len() >= MIN_SALT_LEN => Ok(Some(salt)),
            _ => {
                error!("Salt file {} is malformed", self.salt_path.display());
                Ok(None)
            }
        }
    }

    fn derive_key(&self, passphrase: &str, salt: &[u8]) -> Result<Zeroizing<[u8; KEY_LEN]>> {
        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, self.settings.params()?);
        let mut key = Zeroizing::new([0u8; KEY_LEN]);
        argon2
            .hash_password_into(passphrase.as_bytes(), salt, key.as_mut_slice())
            .map_err(|e| FleetingError::Crypto {
                message: format!("Key derivation failed: {}", e),
            })?;
        Ok(key)
    }
}

fn cipher(key: &[u8; KEY_LEN]) -> Result<Aes256Gcm> {
    Aes256Gcm::new_from_slice(key).map_err(|e| FleetingError::Crypto {
        message: format!("AES key init failed: {}", e),
    })
}

/// Encrypts to `hex(nonce):hex(tag):hex(ciphertext)`.
fn seal(key: &[u8; KEY_LEN], plaintext: &[u8]) -> Result<String> {
    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);

    let mut buffer = plaintext.to_vec();
    let tag = cipher(key)?
        .encrypt_in_place_detached(Nonce::from_slice(&nonce), b"", &mut buffer)
        .map_err(|e| FleetingError::Crypto {
            message: format!("AES-GCM encrypt failed: {}", e),
        })?;

    Ok(format!(
        "{}:{}:{}",
        hex::encode(nonce),
        hex::encode(tag),
        hex::encode(buffer)
    ))
}

/// Decrypts and authenticates the colon-joined encoding.
fn open(key: &[u8; KEY_LEN], encoded: &str) -> Result<Vec<u8>> {
    let fields: Vec<&str> = encoded.split(':').collect();
    let [nonce_hex, tag_hex, ciphertext_hex] = fields.as_slice() else {
        return Err(FleetingError::MalformedVault {
            message: format!("expected 3 fields, found {}", fields.len()),
        });
    };

    let decode = |name: &str, field: &str| {
        hex::decode(field).map_err(|e| FleetingError::MalformedVault {
            message: format!("{} is not hex: {}", name, e),
        })
    };
    let nonce = decode("nonce", *nonce_hex)?;
    let tag = decode("tag", *tag_hex)?;
    let mut buffer = decode("ciphertext", *ciphertext_hex)?;

    if nonce.len() != NONCE_LEN || tag.len() != TAG_LEN {
        return Err(FleetingError::MalformedVault {
            message: format!("nonce/tag lengths {}/{}", nonce.len(), tag.len()),
        });
    }

    cipher(key)?
        .decrypt_in_place_detached(
            Nonce::from_slice(&nonce),
            b"",
            &mut buffer,
            Tag::from_slice(&tag),
        )
        .map_err(|_| FleetingError::VaultAuthentication)?;

    Ok(buffer)
}

#[cfg(test)]
pub(crate) fn fast_settings() -> VaultSettings {
    VaultSettings {
        memory_kib: 8,
        iterations: 1,
        parallelism: 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn vault(dir: &TempDir) -> PrivateVault {
        PrivateVault::new(dir.path(), fast_settings())
    }

    fn records() -> Vec<Record> {
        vec![
            Record::new("2026-10-01 08:00:00", "secret #diary"),
            Record::new("2026-10-02 08:00:00", "another\n---\nline"),
        ]
    }

    #[test]
    fn first_unlock_bootstraps_an_empty_vault() {
        let temp = TempDir::new().unwrap();
        let vault = vault(&temp);
        let mut session = VaultSession::new();

        assert!(!vault.exists().unwrap());
        assert!(vault.unlock(&mut session, "anything").unwrap());
        assert!(session.is_unlocked());
        assert!(vault.exists().unwrap());
        assert!(temp.path().join(SALT_FILE).exists());
        assert!(vault.try_read_all(&session).unwrap().is_empty());

        let raw = fs::read_to_string(vault.path()).unwrap();
        assert_eq!(raw.split(':').count(), 3);
    }

    #[test]
    fn empty_file_counts_as_absent() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join(VAULT_FILE), "").unwrap();
        let vault = vault(&temp);
        let mut session = VaultSession::new();

        assert!(vault.unlock(&mut session, "pw").unwrap());
    }

    #[test]
    fn correct_passphrase_reads_back_last_write() {
        let temp = TempDir::new().unwrap();
        let vault = vault(&temp);
        let mut session = VaultSession::new();
        vault.unlock(&mut session, "correct horse").unwrap();
        vault.write_all(&session, &records()).unwrap();

        let mut fresh = VaultSession::new();
        assert!(vault.unlock(&mut fresh, "correct horse").unwrap());
        assert_eq!(vault.read_all(&fresh), records());
    }

    #[test]
    fn wrong_passphrase_fails_and_leaves_session_locked() {
        let temp = TempDir::new().unwrap();
        let vault = vault(&temp);
        let mut session = VaultSession::new();
        vault.unlock(&mut session, "right").unwrap();
        vault.write_all(&session, &records()).unwrap();

        assert!(!vault.unlock(&mut session, "wrong").unwrap());
        assert!(!session.is_unlocked());
        assert!(vault.read_all(&session).is_empty());
        assert!(matches!(
            vault.try_read_all(&session),
            Err(FleetingError::VaultLocked)
        ));
        assert!(matches!(
            vault.write_all(&session, &[]),
            Err(FleetingError::VaultLocked)
        ));
    }

    #[test]
    fn every_write_uses_a_fresh_nonce() {
        let temp = TempDir::new().unwrap();
        let vault = vault(&temp);
        let mut session = VaultSession::new();
        vault.unlock(&mut session, "pw").unwrap();

        vault.write_all(&session, &records()).unwrap();
        let first = fs::read_to_string(vault.path()).unwrap();
        vault.write_all(&session, &records()).unwrap();
        let second = fs::read_to_string(vault.path()).unwrap();

        assert_ne!(first.split(':').next(), second.split(':').next());
    }

    #[test]
    fn tampered_ciphertext_is_an_authentication_failure() {
        let temp = TempDir::new().unwrap();
        let vault = vault(&temp);
        let mut session = VaultSession::new();
        vault.unlock(&mut session, "pw").unwrap();
        vault.write_all(&session, &records()).unwrap();

        let raw = fs::read_to_string(vault.path()).unwrap();
        let mut fields: Vec<String> = raw.split(':').map(str::to_string).collect();
        let flipped = if fields[2].starts_with('0') { "1" } else { "0" };
        fields[2].replace_range(0..1, flipped);
        fs::write(vault.path(), fields.join(":")).unwrap();

        assert!(matches!(
            vault.try_read_all(&session),
            Err(FleetingError::VaultAuthentication)
        ));
        assert!(vault.read_all(&session).is_empty());
        assert!(!vault.unlock(&mut session, "pw").unwrap());
    }

    #[test]
    fn malformed_encoding_is_rejected_like_a_wrong_key() {
        let temp = TempDir::new().unwrap();
        let vault = vault(&temp);
        let mut session = VaultSession::new();
        vault.unlock(&mut session, "pw").unwrap();

        fs::write(vault.path(), "zz:not-hex").unwrap();
        assert!(matches!(
            vault.try_read_all(&session),
            Err(FleetingError::MalformedVault { .. })
        ));
        assert!(!vault.unlock(&mut session, "pw").unwrap());

        fs::write(vault.path(), "00:00:00").unwrap();
        assert!(!vault.unlock(&mut session, "pw").unwrap());
    }

    #[test]
    fn salts_differ_between_vaults() {
        let a = TempDir::new().unwrap();
        let b = TempDir::new().unwrap();
        vault(&a).unlock(&mut VaultSession::new(), "same").unwrap();
        vault(&b).unlock(&mut VaultSession::new(), "same").unwrap();

        let salt_a = fs::read_to_string(a.path().join(SALT_FILE)).unwrap();
        let salt_b = fs::read_to_string(b.path().join(SALT_FILE)).unwrap();
        assert_ne!(salt_a, salt_b);
    }
}
