//! Lock files guarding quarantine and restore of a single path.
//!
//! One lock file per original path, created exclusively inside the
//! vault's lock directory. Two operations on different paths may run
//! concurrently; two on the same path cannot. Locks left behind by a
//! crashed process go stale by mtime and are broken on next acquire.

use crate::core::error::{Error, QuarantineFailure, Result};
use crate::utils::hash::ContentHasher;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

/// Age after which a lock file is considered abandoned.
const STALE_AFTER: Duration = Duration::from_secs(10 * 60);

/// RAII lock on one original path. Released on drop.
#[derive(Debug)]
pub struct PathLock {
    lock_path: PathBuf,
}

impl PathLock {
    /// Acquire the lock for `target` inside `lock_dir`.
    pub fn acquire(lock_dir: &Path, target: &Path) -> Result<Self> {
        fs::create_dir_all(lock_dir).map_err(|e| Error::file_write(lock_dir, e))?;

        let name = format!(
            "{}.lock",
            ContentHasher::md5_bytes(target.to_string_lossy().as_bytes())
        );
        let lock_path = lock_dir.join(name);

        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&lock_path)
        {
            Ok(mut file) => {
                // Record the holder for diagnostics; content is advisory.
                let _ = writeln!(file, "{}\n{}", std::process::id(), target.display());
                Ok(Self { lock_path })
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                if Self::is_stale(&lock_path) {
                    log::warn!(
                        "breaking stale lock for {} ({})",
                        target.display(),
                        lock_path.display()
                    );
                    let _ = fs::remove_file(&lock_path);
                    return Self::acquire_fresh(&lock_path, target);
                }
                Err(Error::quarantine_failed(target, QuarantineFailure::LockFailed))
            }
            Err(e) => Err(Error::file_write(&lock_path, e)),
        }
    }

    fn acquire_fresh(lock_path: &Path, target: &Path) -> Result<Self> {
        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(lock_path)
        {
            Ok(mut file) => {
                let _ = writeln!(file, "{}\n{}", std::process::id(), target.display());
                Ok(Self {
                    lock_path: lock_path.to_path_buf(),
                })
            }
            Err(_) => Err(Error::quarantine_failed(
                target,
                QuarantineFailure::LockFailed,
            )),
        }
    }

    fn is_stale(lock_path: &Path) -> bool {
        fs::metadata(lock_path)
            .and_then(|m| m.modified())
            .map(|mtime| {
                SystemTime::now()
                    .duration_since(mtime)
                    .map(|age| age > STALE_AFTER)
                    .unwrap_or(false)
            })
            .unwrap_or(false)
    }
}

impl Drop for PathLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.lock_path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                log::warn!("failed to release lock {}: {}", self.lock_path.display(), e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_acquire_and_release() {
        let dir = tempdir().unwrap();
        let target = Path::new("/srv/site/a.php");

        let lock = PathLock::acquire(dir.path(), target).unwrap();
        drop(lock);

        // Re-acquire succeeds after release.
        let _again = PathLock::acquire(dir.path(), target).unwrap();
    }

    #[test]
    fn test_concurrent_same_path_rejected() {
        let dir = tempdir().unwrap();
        let target = Path::new("/srv/site/a.php");

        let _held = PathLock::acquire(dir.path(), target).unwrap();
        let second = PathLock::acquire(dir.path(), target);
        assert!(matches!(
            second,
            Err(Error::QuarantineFailed {
                reason: QuarantineFailure::LockFailed,
                ..
            })
        ));
    }

    #[test]
    fn test_distinct_paths_coexist() {
        let dir = tempdir().unwrap();

        let _a = PathLock::acquire(dir.path(), Path::new("/srv/site/a.php")).unwrap();
        let _b = PathLock::acquire(dir.path(), Path::new("/srv/site/b.php")).unwrap();
    }

    #[test]
    fn test_stale_lock_broken() {
        let dir = tempdir().unwrap();
        let target = Path::new("/srv/site/a.php");

        // Simulate an abandoned lock with an ancient mtime.
        let name = format!(
            "{}.lock",
            ContentHasher::md5_bytes(target.to_string_lossy().as_bytes())
        );
        let lock_path = dir.path().join(&name);
        fs::write(&lock_path, "stale").unwrap();
        let old = SystemTime::now() - Duration::from_secs(3600);
        let file = OpenOptions::new().write(true).open(&lock_path).unwrap();
        file.set_modified(old).unwrap();
        drop(file);

        let lock = PathLock::acquire(dir.path(), target);
        assert!(lock.is_ok());
    }
}
