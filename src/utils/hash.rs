//! Content hashing utilities.

use crate::core::error::{Error, Result};
use md5::{Digest, Md5};
use sha2::Sha256;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

/// Buffer size for reading files (64KB).
const BUFFER_SIZE: usize = 64 * 1024;

/// Digest and stat snapshot of a file, taken in one pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDigest {
    /// SHA256 hash of the content
    pub sha256: String,
    /// File size in bytes
    pub size: u64,
    /// Unix permission bits
    pub mode: u32,
}

/// Hash calculator for files and buffers.
pub struct ContentHasher;

impl ContentHasher {
    /// Calculate SHA256 hash of a file, streaming.
    pub fn sha256_file(path: &Path) -> Result<String> {
        let file = File::open(path).map_err(|e| Error::file_read(path, e))?;
        let mut reader = BufReader::with_capacity(BUFFER_SIZE, file);
        let mut hasher = Sha256::new();
        let mut buffer = [0u8; BUFFER_SIZE];

        loop {
            let bytes_read = reader
                .read(&mut buffer)
                .map_err(|e| Error::file_read(path, e))?;
            if bytes_read == 0 {
                break;
            }
            hasher.update(&buffer[..bytes_read]);
        }

        Ok(hex::encode(hasher.finalize()))
    }

    /// Hash a file and capture its size and permission bits in one pass.
    pub fn digest_file(path: &Path) -> Result<FileDigest> {
        let file = File::open(path).map_err(|e| Error::file_read(path, e))?;
        let metadata = file.metadata().map_err(|e| Error::file_read(path, e))?;
        let size = metadata.len();

        #[cfg(unix)]
        let mode = {
            use std::os::unix::fs::PermissionsExt;
            metadata.permissions().mode()
        };
        #[cfg(not(unix))]
        let mode = 0o644;

        let mut reader = BufReader::with_capacity(BUFFER_SIZE, file);
        let mut hasher = Sha256::new();
        let mut buffer = [0u8; BUFFER_SIZE];

        loop {
            let bytes_read = reader
                .read(&mut buffer)
                .map_err(|e| Error::file_read(path, e))?;
            if bytes_read == 0 {
                break;
            }
            hasher.update(&buffer[..bytes_read]);
        }

        Ok(FileDigest {
            sha256: hex::encode(hasher.finalize()),
            size,
            mode,
        })
    }

    /// Calculate SHA256 hash of bytes.
    pub fn sha256_bytes(data: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(data);
        hex::encode(hasher.finalize())
    }

    /// Calculate MD5 hash of bytes. Used only for deriving vault blob
    /// names from original paths, never for integrity decisions.
    pub fn md5_bytes(data: &[u8]) -> String {
        let mut hasher = Md5::new();
        hasher.update(data);
        hex::encode(hasher.finalize())
    }

    /// Verify a file matches an expected SHA256 hash.
    pub fn verify_sha256(path: &Path, expected: &str) -> Result<bool> {
        let actual = Self::sha256_file(path)?;
        Ok(actual.eq_ignore_ascii_case(expected))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_sha256_bytes() {
        // Test vector: SHA256("hello")
        let hash = ContentHasher::sha256_bytes(b"hello");
        assert_eq!(
            hash,
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn test_md5_bytes() {
        // Test vector: MD5("hello")
        let hash = ContentHasher::md5_bytes(b"hello");
        assert_eq!(hash, "5d41402abc4b2a76b9719d911017c592");
    }

    #[test]
    fn test_digest_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"test content").unwrap();

        let digest = ContentHasher::digest_file(file.path()).unwrap();
        assert_eq!(digest.sha256, ContentHasher::sha256_bytes(b"test content"));
        assert_eq!(digest.size, 12);
    }

    #[test]
    fn test_verify_hash() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"hello").unwrap();

        let valid = ContentHasher::verify_sha256(
            file.path(),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824",
        )
        .unwrap();
        assert!(valid);

        let invalid = ContentHasher::verify_sha256(file.path(), "invalid_hash").unwrap();
        assert!(!invalid);
    }
}
