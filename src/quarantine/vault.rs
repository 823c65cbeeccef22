//! Quarantine vault.
//!
//! Moves suspect files into an encrypted, access-denied store and back
//! out again. The quarantine ordering is fail-safe: the original file
//! is removed only after its record is durably persisted, so a failure
//! at any earlier step leaves the threat in place rather than losing
//! content silently.

use chrono::Utc;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::encryption::VaultCipher;
use super::lock::PathLock;
use super::metadata::{QuarantineMetadata, QuarantineRecord};
use crate::core::config::QuarantineConfig;
use crate::core::error::{Error, QuarantineFailure, Result, RestoreFailure};
use crate::utils::hash::ContentHasher;

/// Extension for encrypted blobs inside the vault.
const BLOB_EXTENSION: &str = "quar";
/// Subdirectory holding blobs.
const BLOBS_DIR: &str = "blobs";
/// Subdirectory holding per-path lock files.
const LOCKS_DIR: &str = "locks";

/// Aggregate vault counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VaultStats {
    pub record_count: usize,
    pub total_size: u64,
}

/// Encrypted quarantine store with size and age governance.
pub struct QuarantineVault {
    base_path: PathBuf,
    cipher: VaultCipher,
    metadata: QuarantineMetadata,
    max_vault_size: u64,
    max_age: Duration,
}

impl QuarantineVault {
    /// Create or open a vault at the configured location.
    pub fn open(config: &QuarantineConfig) -> Result<Self> {
        Self::open_at(&config.quarantine_dir(), config)
    }

    /// Create or open a vault at an explicit path.
    pub fn open_at(base_path: &Path, config: &QuarantineConfig) -> Result<Self> {
        ensure_denied_dir(base_path)?;
        ensure_denied_dir(&base_path.join(BLOBS_DIR))?;
        fs::create_dir_all(base_path.join(LOCKS_DIR))
            .map_err(|e| Error::file_write(base_path.join(LOCKS_DIR), e))?;

        let cipher = VaultCipher::from_key_file(&base_path.join("vault.key"))?;
        let metadata = QuarantineMetadata::open(&base_path.join("vault.db"))?;

        Ok(Self {
            base_path: base_path.to_path_buf(),
            cipher,
            metadata,
            max_vault_size: config.max_vault_size_bytes,
            max_age: Duration::from_secs(config.max_age_secs),
        })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn blobs_dir(&self) -> PathBuf {
        self.base_path.join(BLOBS_DIR)
    }

    fn locks_dir(&self) -> PathBuf {
        self.base_path.join(LOCKS_DIR)
    }

    fn blob_path(&self, record: &QuarantineRecord) -> PathBuf {
        self.blobs_dir().join(&record.blob_name)
    }

    /// Suspend a file into the vault.
    ///
    /// Ordering: lock, read, encrypt, write blob, persist record, and
    /// only then remove the original. Failures before the record is
    /// persisted leave the original untouched.
    pub fn quarantine(&self, path: &Path, threat_type: &str) -> Result<QuarantineRecord> {
        let _lock = PathLock::acquire(&self.locks_dir(), path)?;

        if self.metadata.get_by_path(path)?.is_some() {
            return Err(Error::quarantine_failed(
                path,
                QuarantineFailure::AlreadyQuarantined,
            ));
        }

        let digest = ContentHasher::digest_file(path)?;
        let content = fs::read(path).map_err(|e| Error::file_read(path, e))?;

        let blob = self
            .cipher
            .seal_blob(&content)
            .map_err(|_| Error::quarantine_failed(path, QuarantineFailure::EncryptFailed))?;

        let blob_name = format!(
            "{}-{}.{}",
            Utc::now().format("%Y%m%d%H%M%S"),
            ContentHasher::md5_bytes(path.to_string_lossy().as_bytes()),
            BLOB_EXTENSION
        );
        let blob_path = self.blobs_dir().join(&blob_name);

        if fs::write(&blob_path, &blob).is_err() {
            return Err(Error::quarantine_failed(
                path,
                QuarantineFailure::PersistFailed,
            ));
        }

        let record = QuarantineRecord::new(
            path.to_path_buf(),
            blob_name,
            digest.sha256,
            digest.size,
            digest.mode,
            threat_type.to_string(),
        );

        if let Err(e) = self.metadata.add(&record) {
            // Record is not durable; roll the blob back and leave the
            // original in place.
            if let Err(cleanup) = fs::remove_file(&blob_path) {
                log::warn!(
                    "failed to clean up blob {} after record error: {}",
                    blob_path.display(),
                    cleanup
                );
            }
            log::error!("quarantine record persist failed for {}: {}", path.display(), e);
            return Err(Error::quarantine_failed(
                path,
                QuarantineFailure::PersistFailed,
            ));
        }

        if let Err(e) = fs::remove_file(path) {
            // The record is durable but the original survived. Undo the
            // quarantine so the path invariant holds.
            log::error!(
                "failed to remove original {} after quarantine, rolling back: {}",
                path.display(),
                e
            );
            let _ = self.metadata.remove(&record.id);
            let _ = fs::remove_file(&blob_path);
            return Err(Error::quarantine_failed(
                path,
                QuarantineFailure::PersistFailed,
            ));
        }

        log::info!(
            "quarantined {} ({} bytes, {})",
            path.display(),
            record.file_size,
            threat_type
        );
        Ok(record)
    }

    /// Re-materialize a suspended file at its original path with its
    /// original permissions, then drop the record and blob.
    pub fn restore(&self, id: &str) -> Result<QuarantineRecord> {
        let record = self
            .metadata
            .get(id)?
            .ok_or_else(|| Error::restore_failed(id, RestoreFailure::MissingRecord))?;

        let _lock = PathLock::acquire(&self.locks_dir(), &record.original_path)?;

        let parent = record
            .original_path
            .parent()
            .ok_or_else(|| Error::restore_failed(id, RestoreFailure::TargetDirGone))?;
        if !parent.is_dir() {
            return Err(Error::restore_failed(id, RestoreFailure::TargetDirGone));
        }

        let blob_path = self.blob_path(&record);
        let blob = fs::read(&blob_path).map_err(|e| Error::file_read(&blob_path, e))?;
        let content = self.cipher.open_blob(&blob)?;

        fs::write(&record.original_path, &content)
            .map_err(|e| Error::file_write(&record.original_path, e))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Err(e) = fs::set_permissions(
                &record.original_path,
                fs::Permissions::from_mode(record.file_mode),
            ) {
                log::warn!(
                    "failed to restore permissions on {}: {}",
                    record.original_path.display(),
                    e
                );
            }
        }

        if let Err(e) = self.metadata.remove(id) {
            log::warn!("failed to remove record after restore: {}", e);
        }
        if let Err(e) = fs::remove_file(&blob_path) {
            log::warn!("failed to remove blob after restore: {}", e);
        }

        log::info!("restored {} from quarantine", record.original_path.display());
        Ok(record)
    }

    /// Permanently delete a suspended file and its record.
    pub fn delete(&self, id: &str) -> Result<()> {
        let record = self
            .metadata
            .get(id)?
            .ok_or_else(|| Error::QuarantineItemNotFound(id.to_string()))?;

        self.metadata.remove(id)?;
        if let Err(e) = fs::remove_file(self.blob_path(&record)) {
            if e.kind() != std::io::ErrorKind::NotFound {
                log::warn!("failed to remove blob for deleted record {}: {}", id, e);
            }
        }

        log::info!("deleted quarantine item {} permanently", id);
        Ok(())
    }

    /// Evict entries breaching the age cap, then oldest-first until the
    /// vault fits under the size cap. Returns the eviction count.
    pub fn cleanup_expired(&self) -> Result<usize> {
        let now = Utc::now();
        let mut evicted = 0usize;

        for record in self.metadata.list_oldest_first()? {
            let age = (now - record.quarantined_at)
                .to_std()
                .unwrap_or(Duration::ZERO);
            if age > self.max_age {
                self.delete(&record.id)?;
                evicted += 1;
            }
        }

        let mut total = self.metadata.total_size()?;
        if total > self.max_vault_size {
            for record in self.metadata.list_oldest_first()? {
                if total <= self.max_vault_size {
                    break;
                }
                self.delete(&record.id)?;
                total = total.saturating_sub(record.file_size);
                evicted += 1;
            }
        }

        if evicted > 0 {
            log::info!("evicted {} quarantine item(s)", evicted);
        }
        Ok(evicted)
    }

    /// Look up one record.
    pub fn get(&self, id: &str) -> Result<Option<QuarantineRecord>> {
        self.metadata.get(id)
    }

    /// List all records, newest first.
    pub fn list(&self) -> Result<Vec<QuarantineRecord>> {
        self.metadata.list()
    }

    /// Whether an active record exists for a path.
    pub fn is_quarantined(&self, path: &Path) -> Result<bool> {
        Ok(self.metadata.get_by_path(path)?.is_some())
    }

    /// Aggregate counters.
    pub fn stats(&self) -> Result<VaultStats> {
        Ok(VaultStats {
            record_count: self.metadata.count()?,
            total_size: self.metadata.total_size()?,
        })
    }
}

/// Create a directory that web servers and other users cannot browse:
/// owner-only permissions plus deny rules for Apache-style hosts.
fn ensure_denied_dir(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir).map_err(|e| Error::file_write(dir, e))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(dir, fs::Permissions::from_mode(0o700))
            .map_err(|e| Error::file_write(dir, e))?;
    }

    let htaccess = dir.join(".htaccess");
    if !htaccess.exists() {
        fs::write(&htaccess, "Require all denied\nDeny from all\n")
            .map_err(|e| Error::file_write(&htaccess, e))?;
    }
    let index = dir.join("index.php");
    if !index.exists() {
        fs::write(&index, "<?php // silence\n").map_err(|e| Error::file_write(&index, e))?;
    }

    Ok(())
}
