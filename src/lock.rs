//! Exclusive lock on a build root for the duration of a run.

use anyhow::{Context, Result};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use crate::error::BuildError;

pub const LOCK_FILE_NAME: &str = ".toolchain-builder.lock";

/// Held while a run mutates the build root. Released on drop.
#[derive(Debug)]
pub struct BuildLock {
    _file: File,
    path: PathBuf,
}

impl BuildLock {
    /// Take the lock at `lock_path` without waiting.
    pub fn acquire(lock_path: &Path) -> Result<Self> {
        if let Some(parent) = lock_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating '{}'", parent.display()))?;
        }

        // The file is never unlinked: removing a locked file lets a second
        // process lock a fresh inode at the same path.
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(lock_path)
            .with_context(|| format!("opening lock file '{}'", lock_path.display()))?;

        if file.try_lock_exclusive().is_err() {
            return Err(BuildError::LockHeld {
                path: lock_path.to_path_buf(),
            }
            .into());
        }

        Ok(Self {
            _file: file,
            path: lock_path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{build_error, ErrorKind};
    use tempfile::TempDir;

    #[test]
    fn test_second_acquire_fails_until_released() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("base").join(LOCK_FILE_NAME);

        let held = BuildLock::acquire(&path).unwrap();
        assert_eq!(held.path(), path);

        let err = BuildLock::acquire(&path).unwrap_err();
        assert_eq!(build_error(&err).map(|e| e.kind()), Some(ErrorKind::Usage));
        assert!(err.to_string().contains(LOCK_FILE_NAME));

        drop(held);
        assert!(path.exists());
        BuildLock::acquire(&path).unwrap();
    }
}
