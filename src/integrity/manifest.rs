//! Platform core manifest: the canonical file list with expected hashes.

use crate::core::config::IntegrityConfig;
use crate::core::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;
use std::time::Duration;

/// Canonical hash list for one platform version. Paths are relative to
/// the installation root, using forward slashes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreManifest {
    /// Platform version this manifest describes
    pub version: String,
    /// Relative path to SHA-256 hex digest
    pub checksums: BTreeMap<String, String>,
}

impl CoreManifest {
    /// Whether `rel_path` is a core file covered by this manifest.
    pub fn contains(&self, rel_path: &str) -> bool {
        self.checksums.contains_key(rel_path)
    }

    /// Expected digest for a core file.
    pub fn expected_hash(&self, rel_path: &str) -> Option<&str> {
        self.checksums.get(rel_path).map(|s| s.as_str())
    }

    /// Number of files the manifest covers.
    pub fn len(&self) -> usize {
        self.checksums.len()
    }

    /// Whether the manifest covers no files.
    pub fn is_empty(&self) -> bool {
        self.checksums.is_empty()
    }
}

/// Where manifests and canonical file contents come from.
///
/// Production uses the HTTP source; tests and air-gapped installs can
/// use a local mirror instead.
pub trait ManifestSource {
    /// Fetch the manifest for a platform version.
    fn fetch_manifest(&self, version: &str) -> Result<CoreManifest>;

    /// Fetch the canonical bytes of one core file.
    fn fetch_file(&self, version: &str, rel_path: &str) -> Result<Vec<u8>>;
}

impl<T: ManifestSource + ?Sized> ManifestSource for Box<T> {
    fn fetch_manifest(&self, version: &str) -> Result<CoreManifest> {
        (**self).fetch_manifest(version)
    }

    fn fetch_file(&self, version: &str, rel_path: &str) -> Result<Vec<u8>> {
        (**self).fetch_file(version, rel_path)
    }
}

/// Canonical file contents are served per-version under this base.
const DEFAULT_FILE_BASE: &str = "https://core.svn.wordpress.org/tags";

/// Manifest source backed by the platform's release API.
pub struct HttpManifestSource {
    manifest_url: String,
    file_base_url: String,
    agent: ureq::Agent,
}

impl HttpManifestSource {
    /// Build a source from the integrity configuration.
    pub fn new(config: &IntegrityConfig) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(config.fetch_timeout_secs))
            .build();
        Self {
            manifest_url: config.manifest_url.clone(),
            file_base_url: DEFAULT_FILE_BASE.to_string(),
            agent,
        }
    }

    /// Override where canonical file contents are fetched from.
    pub fn with_file_base(mut self, base_url: impl Into<String>) -> Self {
        self.file_base_url = base_url.into();
        self
    }
}

impl ManifestSource for HttpManifestSource {
    fn fetch_manifest(&self, version: &str) -> Result<CoreManifest> {
        let url = format!("{}?version={}", self.manifest_url, version);
        log::debug!("fetching core manifest from {}", url);

        let response = self
            .agent
            .get(&url)
            .call()
            .map_err(|e| Error::Network(format!("manifest fetch failed: {}", e)))?;

        #[derive(Deserialize)]
        struct ManifestBody {
            checksums: Option<BTreeMap<String, String>>,
        }

        let body: ManifestBody = response
            .into_json()
            .map_err(|e| Error::ManifestUnavailable(format!("malformed manifest: {}", e)))?;

        let checksums = body.checksums.ok_or_else(|| {
            Error::ManifestUnavailable(format!("no manifest published for version {}", version))
        })?;

        Ok(CoreManifest {
            version: version.to_string(),
            checksums,
        })
    }

    fn fetch_file(&self, version: &str, rel_path: &str) -> Result<Vec<u8>> {
        let url = format!("{}/{}/{}", self.file_base_url, version, rel_path);
        log::debug!("fetching canonical file from {}", url);

        let response = self
            .agent
            .get(&url)
            .call()
            .map_err(|e| Error::Network(format!("canonical file fetch failed: {}", e)))?;

        let mut bytes = Vec::new();
        response
            .into_reader()
            .read_to_end(&mut bytes)
            .map_err(|e| Error::Network(format!("canonical file read failed: {}", e)))?;
        Ok(bytes)
    }
}

/// Manifest source backed by a local mirror directory. Expects
/// `<root>/<version>.json` manifests and `<root>/<version>/<path>`
/// file contents.
pub struct FileManifestSource {
    root: std::path::PathBuf,
}

impl FileManifestSource {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }
}

impl ManifestSource for FileManifestSource {
    fn fetch_manifest(&self, version: &str) -> Result<CoreManifest> {
        let path = self.root.join(format!("{}.json", version));
        let json = std::fs::read_to_string(&path)
            .map_err(|e| Error::ManifestUnavailable(format!("{}: {}", path.display(), e)))?;
        let manifest: CoreManifest = serde_json::from_str(&json)?;
        Ok(manifest)
    }

    fn fetch_file(&self, version: &str, rel_path: &str) -> Result<Vec<u8>> {
        let path = self.root.join(version).join(rel_path);
        std::fs::read(&path).map_err(|e| Error::file_read(&path, e))
    }
}
