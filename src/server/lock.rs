// src/server/lock.rs

//! Exclusive repository lock
//!
//! A writable repository is held by one process at a time. The lock is an
//! `flock(LOCK_EX)` on `<repo>/lock`, taken when the repository is opened
//! for writing and released when the store is dropped. Transactions opened
//! concurrently against the same store are still told apart by their staging
//! directories.

use crate::Result;
use fs2::FileExt;
use std::fs::{self, File};
use std::path::{Path, PathBuf};

/// Exclusive lock over a repository root
pub struct RepositoryLock {
    /// Kept open to hold the lock
    #[allow(dead_code)]
    file: File,
    path: PathBuf,
}

impl RepositoryLock {
    /// Acquire the lock, blocking until available
    pub fn acquire<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = File::create(&path)?;
        file.lock_exclusive()
            .map_err(|e| crate::Error::IoError(format!("Failed to acquire repository lock: {}", e)))?;

        log::info!("Acquired repository lock at {:?}", path);
        Ok(Self { file, path })
    }

    /// Try to acquire the lock without blocking
    ///
    /// Returns `Ok(None)` when another process holds it.
    pub fn try_acquire<P: AsRef<Path>>(path: P) -> Result<Option<Self>> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = File::create(&path)?;

        match file.try_lock_exclusive() {
            Ok(()) => {
                log::info!("Acquired repository lock at {:?}", path);
                Ok(Some(Self { file, path }))
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                log::debug!("Repository lock already held at {:?}", path);
                Ok(None)
            }
            Err(e) => Err(crate::Error::IoError(format!(
                "Failed to try-acquire repository lock: {}",
                e
            ))),
        }
    }

    /// Whether some process holds the lock
    pub fn is_held<P: AsRef<Path>>(path: P) -> bool {
        let path = path.as_ref();
        let Ok(file) = File::open(path) else {
            return false;
        };

        match file.try_lock_exclusive() {
            Ok(()) => {
                let _ = file.unlock();
                false
            }
            Err(_) => true,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RepositoryLock {
    fn drop(&mut self) {
        log::debug!("Released repository lock at {:?}", self.path);
    }
}
