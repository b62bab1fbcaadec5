//! Pasted attachments, stored in `.image/` under the data root so that
//! snapshots pick them up.
use std::path::{Path, PathBuf};

use chrono::Local;
use log::info;

use crate::{ensure_dir, write_atomic, FleetingError, Result};

pub const ATTACHMENT_DIR: &str = ".image";

/// Writes `bytes` as `.image/<YYYYMMDDHHMMSSmmm>.<ext>` and returns that
/// path relative to the data root, ready to embed in markdown.
pub fn save_attachment(root: &Path, bytes: &[u8], extension: &str) -> Result<String> {
    let extension: String = extension
        .trim_start_matches('.')
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .collect::<String>()
        .to_ascii_lowercase();
    if extension.is_empty() {
        return Err(FleetingError::ApplicationError {
            message: "attachment needs a file extension".to_string(),
        });
    }

    let dir = root.join(ATTACHMENT_DIR);
    ensure_dir(&dir)?;

    let stamp = Local::now().format("%Y%m%d%H%M%S%3f").to_string();
    let mut name = format!("{}.{}", stamp, extension);
    let mut n = 1;
    while dir.join(&name).exists() {
        name = format!("{}-{}.{}", stamp, n, extension);
        n += 1;
    }

    let path: PathBuf = dir.join(&name);
    write_atomic(&path, bytes)?;
    info!("Saved attachment {} ({} bytes)", path.display(), bytes.len());
    Ok(format!("{}/{}", ATTACHMENT_DIR, name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn saves_under_image_dir_with_clean_extension() {
        let temp = TempDir::new().unwrap();
        let rel = save_attachment(temp.path(), b"png-bytes", ".P/N\\G").unwrap();

        assert!(rel.starts_with(".image/"));
        assert!(rel.ends_with(".png"));
        assert_eq!(fs::read(temp.path().join(&rel)).unwrap(), b"png-bytes");
    }

    #[test]
    fn repeated_saves_do_not_collide() {
        let temp = TempDir::new().unwrap();
        let a = save_attachment(temp.path(), b"a", "jpg").unwrap();
        let b = save_attachment(temp.path(), b"b", "jpg").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn rejects_missing_extension() {
        let temp = TempDir::new().unwrap();
        assert!(save_attachment(temp.path(), b"x", "../").is_err());
    }
}
