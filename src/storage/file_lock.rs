use std::fs::{self, File, OpenOptions};
use std::path::PathBuf;
use tracing::debug;
use crate::core::error::{Error, Result};
use crate::storage::layout::StorageLayout;

/// Engine-level lock file held by the single open writer of a directory
pub struct FileLock {
    pub file: File,
    pub path: PathBuf,
}

impl FileLock {
    pub fn acquire(storage: &StorageLayout) -> Result<Self> {
        let path = storage.lock_path();
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)?;

        if !try_flock(&file) {
            return Err(Error::lock_contention(format!(
                "Index writer lock {} is held by another writer",
                path.display()
            )));
        }

        Ok(FileLock { file, path })
    }

    /// A lock file is present (held or stale)
    pub fn is_locked(storage: &StorageLayout) -> bool {
        storage.lock_path().exists()
    }

    /// Lock file present but no live writer holds it
    pub fn is_stale(storage: &StorageLayout) -> Result<bool> {
        let path = storage.lock_path();
        if !path.exists() {
            return Ok(false);
        }
        let file = OpenOptions::new().write(true).open(&path)?;
        let stale = try_flock(&file);
        if stale {
            unflock(&file);
        }
        Ok(stale)
    }

    pub fn force_unlock(storage: &StorageLayout) -> Result<()> {
        let path = storage.lock_path();
        if path.exists() {
            fs::remove_file(&path)?;
        }
        Ok(())
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        // Remove before unlocking so nobody flocks an orphaned inode
        if let Err(e) = fs::remove_file(&self.path) {
            debug!(path = %self.path.display(), error = %e, "could not remove lock file");
        }
        unflock(&self.file);
    }
}

fn try_flock(file: &File) -> bool {
    #[cfg(unix)]
    {
        use std::os::unix::io::AsRawFd;
        use libc::{flock, LOCK_EX, LOCK_NB};

        let fd = file.as_raw_fd();
        unsafe { flock(fd, LOCK_EX | LOCK_NB) == 0 }
    }
    #[cfg(not(unix))]
    {
        let _ = file;
        true
    }
}

fn unflock(file: &File) {
    #[cfg(unix)]
    {
        use std::os::unix::io::AsRawFd;
        use libc::{flock, LOCK_UN};

        let fd = file.as_raw_fd();
        unsafe {
            flock(fd, LOCK_UN);
        }
    }
    #[cfg(not(unix))]
    {
        let _ = file;
    }
}
