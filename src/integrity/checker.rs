//! Core file verification and repair.
//!
//! Core files are never quarantined. A modified or missing core file is
//! repaired in place from the canonical source, with the replacement
//! written next to the target and swapped in by rename so a reader
//! never observes a half-written file.

use crate::core::error::{Error, RepairFailure, Result};
use crate::core::types::{Finding, FindingType, Severity};
use crate::integrity::manifest::{CoreManifest, ManifestSource};
use crate::utils::hash::ContentHasher;
use std::path::Path;

/// Verifies an installation against a core manifest and repairs drift.
pub struct CoreIntegrityChecker<S: ManifestSource> {
    source: S,
}

impl<S: ManifestSource> CoreIntegrityChecker<S> {
    pub fn new(source: S) -> Self {
        Self { source }
    }

    /// Fetch the manifest for a platform version.
    pub fn load_manifest(&self, version: &str) -> Result<CoreManifest> {
        self.source.fetch_manifest(version)
    }

    /// Compare every manifest entry against the installation under
    /// `root`. Missing files and hash mismatches become findings; files
    /// not in the manifest are ignored here (the content analyzer owns
    /// those).
    pub fn verify(&self, manifest: &CoreManifest, root: &Path) -> Result<Vec<Finding>> {
        let mut findings = Vec::new();

        for (rel_path, expected) in &manifest.checksums {
            let full_path = root.join(rel_path);

            if !full_path.is_file() {
                findings.push(Finding::new(
                    &full_path,
                    FindingType::CoreMissing,
                    Severity::High,
                    format!("core file absent (manifest {})", manifest.version),
                ));
                continue;
            }

            match ContentHasher::verify_sha256(&full_path, expected) {
                Ok(true) => {}
                Ok(false) => {
                    findings.push(Finding::new(
                        &full_path,
                        FindingType::CoreModified,
                        Severity::High,
                        format!("hash mismatch against manifest {}", manifest.version),
                    ));
                }
                Err(e) => {
                    findings.push(Finding::new(
                        &full_path,
                        FindingType::AnalysisError,
                        Severity::Low,
                        format!("core file unreadable: {}", e),
                    ));
                }
            }
        }

        Ok(findings)
    }

    /// Whether a path inside `root` is covered by the manifest.
    pub fn is_core_file(&self, manifest: &CoreManifest, root: &Path, path: &Path) -> bool {
        match path.strip_prefix(root) {
            Ok(rel) => {
                let rel = rel.to_string_lossy().replace('\\', "/");
                manifest.contains(&rel)
            }
            Err(_) => false,
        }
    }

    /// Replace one core file with its canonical contents. The fetched
    /// bytes are verified against the manifest hash before they touch
    /// disk.
    pub fn repair(&self, manifest: &CoreManifest, root: &Path, rel_path: &str) -> Result<()> {
        let expected = manifest.expected_hash(rel_path).ok_or_else(|| {
            Error::ManifestUnavailable(format!("{} is not in the manifest", rel_path))
        })?;

        let bytes = self
            .source
            .fetch_file(&manifest.version, rel_path)
            .map_err(|e| {
                log::error!("canonical fetch failed for {}: {}", rel_path, e);
                Error::core_repair(rel_path, RepairFailure::FetchFailed)
            })?;

        if ContentHasher::sha256_bytes(&bytes) != expected {
            log::error!("canonical bytes for {} do not match the manifest", rel_path);
            return Err(Error::core_repair(rel_path, RepairFailure::FetchFailed));
        }

        let target = root.join(rel_path);
        let parent = match target.parent() {
            Some(p) => p,
            None => return Err(Error::core_repair(&target, RepairFailure::WriteFailed)),
        };
        std::fs::create_dir_all(parent)
            .map_err(|_| Error::core_repair(&target, RepairFailure::WriteFailed))?;

        // Stage in the same directory so the rename stays on one filesystem.
        let staged = parent.join(format!(
            ".{}.repair",
            target
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| "core".to_string())
        ));
        std::fs::write(&staged, &bytes)
            .map_err(|_| Error::core_repair(&target, RepairFailure::WriteFailed))?;
        std::fs::rename(&staged, &target).map_err(|e| {
            let _ = std::fs::remove_file(&staged);
            log::error!("rename into place failed for {}: {}", target.display(), e);
            Error::core_repair(&target, RepairFailure::WriteFailed)
        })?;

        log::info!("repaired core file {}", target.display());
        Ok(())
    }
}
