//! Core integrity verification against the platform's canonical manifest.

pub mod checker;
pub mod manifest;

pub use checker::CoreIntegrityChecker;
pub use manifest::{CoreManifest, FileManifestSource, HttpManifestSource, ManifestSource};
