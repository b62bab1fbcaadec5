use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use log::{debug, error, trace};
use tempfile::NamedTempFile;
use walkdir::WalkDir;

use crate::{FleetingError, Result};

/// Creates `dir` (and parents) if it does not exist yet.
pub fn ensure_dir(dir: &Path) -> Result<()> {
    if !dir.exists() {
        debug!("Creating directory: {}", dir.display());
        fs::create_dir_all(dir).map_err(|e| {
            error!("Failed to create directory {}: {}", dir.display(), e);
            FleetingError::DirectoryError {
                path: dir.to_path_buf(),
            }
        })?;
    }
    Ok(())
}

/// Replaces `path` with `bytes` via a temp file in the same directory, so a
/// reader never observes a half-written file.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    ensure_dir(dir)?;

    trace!("Creating temporary file in directory: {}", dir.display());
    let mut temp_file = NamedTempFile::new_in(dir).map_err(|e| {
        error!("Failed to create temporary file: {}", e);
        FleetingError::Io(e)
    })?;

    temp_file.write_all(bytes).map_err(|e| {
        error!("Failed to write to temporary file: {}", e);
        FleetingError::Io(e)
    })?;

    temp_file.flush().map_err(|e| {
        error!("Failed to flush temporary file: {}", e);
        FleetingError::Io(e)
    })?;

    temp_file.persist(path).map_err(|e| {
        error!("Failed to persist file {}: {}", path.display(), e.error);
        FleetingError::Io(e.error)
    })?;

    trace!("Wrote {} bytes to {}", bytes.len(), path.display());
    Ok(())
}

/// Copies a file or a whole directory tree from `src` to `dst`.
///
/// Returns the number of files copied.
pub fn copy_recursively(src: &Path, dst: &Path) -> Result<u64> {
    if src.is_file() {
        if let Some(parent) = dst.parent() {
            ensure_dir(parent)?;
        }
        fs::copy(src, dst)?;
        return Ok(1);
    }

    let mut copied = 0;
    for entry in WalkDir::new(src).sort_by_file_name() {
        let entry = entry?;
        let relative = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| FleetingError::ApplicationError {
                message: format!("Path outside of copy source: {}", e),
            })?;
        let target: PathBuf = dst.join(relative);

        if entry.file_type().is_dir() {
            ensure_dir(&target)?;
        } else if entry.file_type().is_file() {
            fs::copy(entry.path(), &target).map_err(|e| {
                error!(
                    "Failed to copy {} to {}: {}",
                    entry.path().display(),
                    target.display(),
                    e
                );
                FleetingError::Io(e)
            })?;
            copied += 1;
        }
    }

    Ok(copied)
}

/// Removes a file or a directory tree.
pub fn remove_path(path: &Path) -> Result<()> {
    let file_type = fs::symlink_metadata(path)?.file_type();
    if file_type.is_dir() {
        fs::remove_dir_all(path)?;
    } else {
        fs::remove_file(path)?;
    }
    debug!("Removed {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn write_atomic_replaces_existing_content() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("file.txt");

        write_atomic(&path, b"one").unwrap();
        write_atomic(&path, b"two").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "two");
        // Only the target remains, no leftover temp files.
        assert_eq!(fs::read_dir(path.parent().unwrap()).unwrap().count(), 1);
    }

    #[test]
    fn copies_and_removes_trees() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src");
        fs::create_dir_all(src.join("a/b")).unwrap();
        fs::write(src.join("top.md"), "top").unwrap();
        fs::write(src.join("a/b/deep.png"), [1u8, 2, 3]).unwrap();

        let dst = temp.path().join("dst");
        assert_eq!(copy_recursively(&src, &dst).unwrap(), 2);
        assert_eq!(fs::read_to_string(dst.join("top.md")).unwrap(), "top");
        assert_eq!(fs::read(dst.join("a/b/deep.png")).unwrap(), vec![1, 2, 3]);

        remove_path(&dst).unwrap();
        remove_path(&src.join("top.md")).unwrap();
        assert!(!dst.exists());
        assert!(!src.join("top.md").exists());
    }
}
