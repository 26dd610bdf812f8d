use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use tracing::{debug, info};

use crate::error::PersistenceError;

/// Exclusive advisory lock on the ledger's lock file, released on drop.
#[derive(Debug)]
pub struct LedgerLock {
    file: File,
    path: PathBuf,
}

impl LedgerLock {
    /// Blocks until no other session holds the lock.
    pub fn acquire(path: &Path) -> Result<Self, PersistenceError> {
        if let Some(lock) = Self::try_acquire(path)? {
            debug!(path = %path.display(), "history lock acquired");
            return Ok(lock);
        }

        info!(path = %path.display(), "history is locked by another session, waiting");
        let file = open_lock_file(path)?;
        FileExt::lock_exclusive(&file).map_err(|source| PersistenceError::Lock {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), "history lock acquired after waiting");
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    /// Takes the lock only if it is free right now.
    fn try_acquire(path: &Path) -> Result<Option<Self>, PersistenceError> {
        let file = open_lock_file(path)?;
        match FileExt::try_lock_exclusive(&file) {
            Ok(()) => Ok(Some(Self {
                file,
                path: path.to_path_buf(),
            })),
            Err(err) if err.raw_os_error() == fs2::lock_contended_error().raw_os_error() => {
                Ok(None)
            }
            Err(source) => Err(PersistenceError::Lock {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for LedgerLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
        debug!(path = %self.path.display(), "history lock released");
    }
}

fn open_lock_file(path: &Path) -> Result<File, PersistenceError> {
    let io_err = |source: std::io::Error| PersistenceError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_err)?;
    }
    OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(path)
        .map_err(io_err)
}
