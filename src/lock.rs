//! Serializes runs that share one working copy
//!
//! The lock file sits next to the working copy (`<path>.lock`) so it can be
//! taken before the first clone creates the directory itself.

use fd_lock::{RwLock, RwLockWriteGuard};
use std::ffi::OsString;
use std::fs::{File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LockError {
    #[error("another merge run holds {path}; runs against the same working copy must not overlap")]
    Busy { path: PathBuf },
    #[error("cannot lock {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub struct WorkspaceLock {
    lock: RwLock<File>,
    path: PathBuf,
}

impl WorkspaceLock {
    /// Open (creating if needed) the lock file guarding `working_copy`
    pub fn for_working_copy(working_copy: &Path) -> Result<Self, LockError> {
        let path = lock_path(working_copy);

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| LockError::Io {
                path: path.clone(),
                source,
            })?;
        }

        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .map_err(|source| LockError::Io {
                path: path.clone(),
                source,
            })?;

        Ok(Self {
            lock: RwLock::new(file),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Take the exclusive lock without waiting. Held until the guard drops.
    pub fn try_acquire(&mut self) -> Result<RwLockWriteGuard<'_, File>, LockError> {
        let path = &self.path;
        self.lock.try_write().map_err(|source| {
            if source.kind() == ErrorKind::WouldBlock {
                LockError::Busy { path: path.clone() }
            } else {
                LockError::Io {
                    path: path.clone(),
                    source,
                }
            }
        })
    }
}

fn lock_path(working_copy: &Path) -> PathBuf {
    let mut name: OsString = working_copy.as_os_str().to_owned();
    name.push(".lock");
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_lock_path_is_sibling_of_working_copy() {
        assert_eq!(
            lock_path(Path::new("/tmp/target_repo")),
            PathBuf::from("/tmp/target_repo.lock")
        );
        assert_eq!(
            lock_path(Path::new("/srv/repos/target.git")),
            PathBuf::from("/srv/repos/target.git.lock")
        );
    }

    #[test]
    fn test_second_lock_on_same_working_copy_is_busy() {
        let temp_dir = TempDir::new().unwrap();
        let working_copy = temp_dir.path().join("nested").join("target_repo");

        let mut first = WorkspaceLock::for_working_copy(&working_copy).unwrap();
        let guard = first.try_acquire().unwrap();
        assert!(lock_file_exists(&working_copy));

        let mut second = WorkspaceLock::for_working_copy(&working_copy).unwrap();
        assert!(matches!(second.try_acquire(), Err(LockError::Busy { .. })));

        drop(guard);
        assert!(second.try_acquire().is_ok());
    }

    fn lock_file_exists(working_copy: &Path) -> bool {
        lock_path(working_copy).exists()
    }
}
