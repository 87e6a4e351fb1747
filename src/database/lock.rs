//! Cross-process ownership of a queue database
//!
//! Only one process may mutate a queue database at a time. The owner holds an
//! exclusive advisory lock on `<database>.lock` for as long as its queue is open;
//! the OS releases it when the process exits, so a crash never leaves a stale lock.

use anyhow::{Context, Result};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::utils::error::TubeloaderError;

/// Exclusive lock on a queue database, released on drop
#[derive(Debug)]
pub struct QueueLock {
    file: File,
    path: PathBuf,
}

impl QueueLock {
    /// Take the lock for `db_path` without waiting.
    ///
    /// Fails with [`TubeloaderError::QueueLocked`] when another process (or another
    /// open queue in this one) already owns the database.
    pub fn acquire(db_path: &Path) -> Result<Self> {
        let path = lock_path(db_path);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .with_context(|| format!("Failed to open lock file {}", path.display()))?;

        if file.try_lock_exclusive().is_err() {
            return Err(TubeloaderError::QueueLocked(db_path.to_path_buf()).into());
        }

        debug!("Acquired queue lock {}", path.display());
        Ok(Self { file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for QueueLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
        debug!("Released queue lock {}", self.path.display());
    }
}

fn lock_path(db_path: &Path) -> PathBuf {
    let mut name = db_path.as_os_str().to_owned();
    name.push(".lock");
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_second_owner_is_refused() {
        let dir = tempdir().unwrap();
        let db = dir.path().join("queue.db");

        let lock = QueueLock::acquire(&db).unwrap();
        assert_eq!(lock.path(), dir.path().join("queue.db.lock"));

        let err = QueueLock::acquire(&db).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<TubeloaderError>(),
            Some(TubeloaderError::QueueLocked(_))
        ));
    }

    #[test]
    fn test_lock_is_released_on_drop() {
        let dir = tempdir().unwrap();
        let db = dir.path().join("nested").join("queue.db");

        drop(QueueLock::acquire(&db).unwrap());
        assert!(QueueLock::acquire(&db).is_ok());
    }

    #[test]
    fn test_databases_lock_independently() {
        let dir = tempdir().unwrap();
        let _first = QueueLock::acquire(&dir.path().join("a.db")).unwrap();
        assert!(QueueLock::acquire(&dir.path().join("b.db")).is_ok());
    }
}
