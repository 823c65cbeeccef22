//! AES-256-GCM encryption for the quarantine vault.
//!
//! The vault key is installation-scoped, generated on first use, and
//! stored next to the vault with owner-only permissions. Blobs carry a
//! small header plus nonce-prepended ciphertext; GCM gives both
//! confidentiality and tamper detection.

use aes_gcm::{
    aead::{Aead, KeyInit, OsRng},
    Aes256Gcm, Key, Nonce,
};
use rand::RngCore;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::Path;

use crate::core::error::{Error, Result};

/// Size of the AES-256 key in bytes
const KEY_SIZE: usize = 32;
/// Size of the GCM nonce in bytes
const NONCE_SIZE: usize = 12;
/// Magic bytes identifying vault blobs
const BLOB_MAGIC: &[u8] = b"SSQV";
/// Current blob format version
const BLOB_VERSION: u8 = 1;

/// Cipher for quarantine blobs.
#[derive(Clone)]
pub struct VaultCipher {
    key: [u8; KEY_SIZE],
}

impl VaultCipher {
    /// Create a cipher with a fresh random key.
    pub fn generate() -> Self {
        let mut key = [0u8; KEY_SIZE];
        OsRng.fill_bytes(&mut key);
        Self { key }
    }

    /// Create a cipher from an existing key.
    pub fn from_key(key: [u8; KEY_SIZE]) -> Self {
        Self { key }
    }

    /// Load the installation key, generating and saving one on first use.
    pub fn from_key_file(path: &Path) -> Result<Self> {
        if path.exists() {
            let mut file = File::open(path).map_err(|e| Error::file_read(path, e))?;
            let mut key = [0u8; KEY_SIZE];
            file.read_exact(&mut key)
                .map_err(|e| Error::file_read(path, e))?;
            Ok(Self { key })
        } else {
            let cipher = Self::generate();
            cipher.save_key(path)?;
            Ok(cipher)
        }
    }

    /// Save the key with owner-only permissions.
    pub fn save_key(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::file_write(parent, e))?;
        }

        let mut file = File::create(path).map_err(|e| Error::file_write(path, e))?;
        file.write_all(&self.key)
            .map_err(|e| Error::file_write(path, e))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(path, fs::Permissions::from_mode(0o600))
                .map_err(|e| Error::file_write(path, e))?;
        }

        Ok(())
    }

    /// Encrypt data. Returns ciphertext with a prepended random nonce.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let key = Key::<Aes256Gcm>::from_slice(&self.key);
        let cipher = Aes256Gcm::new(key);

        let mut nonce_bytes = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, plaintext)
            .map_err(|e| Error::Encryption(format!("Encryption failed: {}", e)))?;

        let mut result = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        result.extend_from_slice(&nonce_bytes);
        result.extend(ciphertext);

        Ok(result)
    }

    /// Decrypt data produced by [`encrypt`](Self::encrypt).
    pub fn decrypt(&self, encrypted: &[u8]) -> Result<Vec<u8>> {
        if encrypted.len() < NONCE_SIZE {
            return Err(Error::Decryption("Data too short".to_string()));
        }

        let key = Key::<Aes256Gcm>::from_slice(&self.key);
        let cipher = Aes256Gcm::new(key);

        let (nonce_bytes, ciphertext) = encrypted.split_at(NONCE_SIZE);
        let nonce = Nonce::from_slice(nonce_bytes);

        cipher
            .decrypt(nonce, ciphertext)
            .map_err(|e| Error::Decryption(format!("Decryption failed: {}", e)))
    }

    /// Build a vault blob from plaintext.
    ///
    /// Blob format:
    /// - 4 bytes: magic ("SSQV")
    /// - 1 byte: version
    /// - 8 bytes: original content size (little endian)
    /// - 12 bytes: nonce
    /// - N bytes: ciphertext plus GCM tag
    pub fn seal_blob(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let encrypted = self.encrypt(plaintext)?;

        let mut blob = Vec::with_capacity(BLOB_MAGIC.len() + 9 + encrypted.len());
        blob.extend_from_slice(BLOB_MAGIC);
        blob.push(BLOB_VERSION);
        blob.extend_from_slice(&(plaintext.len() as u64).to_le_bytes());
        blob.extend(encrypted);

        Ok(blob)
    }

    /// Recover the original content from a vault blob.
    pub fn open_blob(&self, blob: &[u8]) -> Result<Vec<u8>> {
        let header_size = BLOB_MAGIC.len() + 1 + 8;
        if blob.len() < header_size {
            return Err(Error::Decryption("Invalid vault blob: too short".to_string()));
        }

        if &blob[..BLOB_MAGIC.len()] != BLOB_MAGIC {
            return Err(Error::Decryption("Invalid vault blob: bad magic".to_string()));
        }

        let version = blob[BLOB_MAGIC.len()];
        if version != BLOB_VERSION {
            return Err(Error::Decryption(format!(
                "Unsupported vault blob version: {}",
                version
            )));
        }

        let size_offset = BLOB_MAGIC.len() + 1;
        let mut size_bytes = [0u8; 8];
        size_bytes.copy_from_slice(&blob[size_offset..size_offset + 8]);
        let original_size = u64::from_le_bytes(size_bytes);

        let plaintext = self.decrypt(&blob[header_size..])?;

        if plaintext.len() as u64 != original_size {
            return Err(Error::Decryption(format!(
                "Vault blob size mismatch: header says {}, got {}",
                original_size,
                plaintext.len()
            )));
        }

        Ok(plaintext)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_encrypt_decrypt() {
        let cipher = VaultCipher::generate();
        let plaintext = b"<?php eval(base64_decode($x)); ?>";

        let encrypted = cipher.encrypt(plaintext).unwrap();
        assert_ne!(encrypted, plaintext);
        assert!(encrypted.len() > plaintext.len());

        let decrypted = cipher.decrypt(&encrypted).unwrap();
        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn test_encrypt_empty() {
        let cipher = VaultCipher::generate();
        let encrypted = cipher.encrypt(b"").unwrap();
        let decrypted = cipher.decrypt(&encrypted).unwrap();
        assert!(decrypted.is_empty());
    }

    #[test]
    fn test_decrypt_invalid_data() {
        let cipher = VaultCipher::generate();

        assert!(cipher.decrypt(&[0u8; 5]).is_err());

        let mut garbage = vec![0u8; 100];
        OsRng.fill_bytes(&mut garbage);
        assert!(cipher.decrypt(&garbage).is_err());
    }

    #[test]
    fn test_different_keys_fail() {
        let a = VaultCipher::generate();
        let b = VaultCipher::generate();

        let encrypted = a.encrypt(b"secret").unwrap();
        assert!(b.decrypt(&encrypted).is_err());
    }

    #[test]
    fn test_key_persistence() {
        let temp_dir = TempDir::new().unwrap();
        let key_path = temp_dir.path().join("vault.key");

        let first = VaultCipher::from_key_file(&key_path).unwrap();
        let second = VaultCipher::from_key_file(&key_path).unwrap();

        let encrypted = first.encrypt(b"round trip").unwrap();
        assert_eq!(second.decrypt(&encrypted).unwrap(), b"round trip");
    }

    #[cfg(unix)]
    #[test]
    fn test_key_file_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new().unwrap();
        let key_path = temp_dir.path().join("vault.key");
        VaultCipher::from_key_file(&key_path).unwrap();

        let mode = fs::metadata(&key_path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_blob_round_trip() {
        let cipher = VaultCipher::generate();
        let content = b"file content to suspend";

        let blob = cipher.seal_blob(content).unwrap();
        assert!(blob.starts_with(BLOB_MAGIC));
        assert_ne!(&blob[..], &content[..]);

        let recovered = cipher.open_blob(&blob).unwrap();
        assert_eq!(recovered, content);
    }

    #[test]
    fn test_open_invalid_blob() {
        let cipher = VaultCipher::generate();
        assert!(cipher.open_blob(b"Not a valid blob").is_err());
        assert!(cipher.open_blob(b"").is_err());
    }

    #[test]
    fn test_blob_tamper_detected() {
        let cipher = VaultCipher::generate();
        let mut blob = cipher.seal_blob(b"authentic content").unwrap();
        let last = blob.len() - 1;
        blob[last] ^= 0xff;
        assert!(cipher.open_blob(&blob).is_err());
    }
}
