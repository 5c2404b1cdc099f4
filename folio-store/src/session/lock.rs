use crate::error::{Result, StoreError};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

/// Name of the lock file at the content root.
pub const LOCK_FILE: &str = ".lock";

/// Exclusive advisory lock on a content root, held by a read-write scope.
/// Dropping it removes the lock file and releases the lock.
#[derive(Debug)]
pub(crate) struct RootLock {
    path: PathBuf,
    file: File,
}

impl RootLock {
    /// Take the lock without blocking; `Locked` if another scope holds it.
    pub(crate) fn acquire(root: &Path) -> Result<Self> {
        let path = root.join(LOCK_FILE);
        let file = OpenOptions::new()
            .create(true)
            .truncate(true)
            .write(true)
            .open(&path)?;

        if !try_lock(&file)? {
            return Err(StoreError::Locked {
                root: root.display().to_string(),
            });
        }
        log::debug!("Acquired lock {}", path.display());
        Ok(RootLock { path, file })
    }
}

impl Drop for RootLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            log::warn!("Failed to remove lock file {}: {}", self.path.display(), e);
        }
        if let Err(e) = FileExt::unlock(&self.file) {
            log::warn!("Failed to unlock {}: {}", self.path.display(), e);
        }
        log::debug!("Released lock {}", self.path.display());
    }
}

/// Returns `Ok(false)` if the file is already locked.
fn try_lock(file: &File) -> io::Result<bool> {
    match FileExt::try_lock_exclusive(file) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(false),
        Err(e) if e.raw_os_error() == fs2::lock_contended_error().raw_os_error() => Ok(false),
        Err(e) => Err(e),
    }
}
