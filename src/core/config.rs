//! Configuration management for SiteSentry.

use crate::core::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Scan-related settings
    pub scan: ScanConfig,
    /// Resource budget ceilings
    pub budget: BudgetConfig,
    /// Detection settings
    pub detection: DetectionConfig,
    /// Quarantine settings
    pub quarantine: QuarantineConfig,
    /// Core integrity settings
    pub integrity: IntegrityConfig,
    /// Logging settings
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| Error::ConfigLoad(format!("Failed to read config file: {}", e)))?;

        serde_json::from_str(&contents)
            .map_err(|e| Error::ConfigLoad(format!("Failed to parse config file: {}", e)))
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let contents = serde_json::to_string_pretty(self)?;

        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                Error::ConfigSave(format!("Failed to create config directory: {}", e))
            })?;
        }

        std::fs::write(path, contents)
            .map_err(|e| Error::ConfigSave(format!("Failed to write config file: {}", e)))
    }

    /// Load configuration from default location, or create default if not exists.
    pub fn load_or_default() -> Self {
        let config_path = Self::default_config_path();

        if config_path.exists() {
            match Self::load(&config_path) {
                Ok(config) => return config,
                Err(e) => {
                    log::warn!("Failed to load config, using defaults: {}", e);
                }
            }
        }

        let config = Self::default();

        if let Err(e) = config.save(&config_path) {
            log::warn!("Failed to save default config: {}", e);
        }

        config
    }

    /// Get the default configuration file path.
    pub fn default_config_path() -> PathBuf {
        Self::data_dir().join("config.json")
    }

    /// Get the application data directory.
    pub fn data_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join("sitesentry")
    }

    /// Validate the configuration values.
    pub fn validate(&self) -> Result<()> {
        if self.budget.max_file_size_bytes == 0 {
            return Err(Error::ConfigInvalid {
                field: "budget.max_file_size_bytes".to_string(),
                message: "Must be greater than 0".to_string(),
            });
        }

        if self.budget.memory_ceiling_bytes == 0 {
            return Err(Error::ConfigInvalid {
                field: "budget.memory_ceiling_bytes".to_string(),
                message: "Must be greater than 0".to_string(),
            });
        }

        if self.budget.time_ceiling_secs == 0 {
            return Err(Error::ConfigInvalid {
                field: "budget.time_ceiling_secs".to_string(),
                message: "Must be greater than 0".to_string(),
            });
        }

        if self.scan.roots.is_empty() {
            return Err(Error::ConfigInvalid {
                field: "scan.roots".to_string(),
                message: "At least one scan root is required".to_string(),
            });
        }

        if self.quarantine.max_vault_size_bytes == 0 {
            return Err(Error::ConfigInvalid {
                field: "quarantine.max_vault_size_bytes".to_string(),
                message: "Must be greater than 0".to_string(),
            });
        }

        Ok(())
    }
}

/// Scan-related configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Directories to walk
    pub roots: Vec<PathBuf>,
    /// Extensions to inspect
    pub extensions: Vec<String>,
    /// Path substrings to exclude
    pub exclude_paths: Vec<String>,
    /// Whether to follow symbolic links
    pub follow_symlinks: bool,
    /// Quarantine actionable findings automatically
    pub quarantine_on_detect: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            roots: vec![PathBuf::from(".")],
            extensions: vec![
                "php".to_string(),
                "phtml".to_string(),
                "php5".to_string(),
                "php7".to_string(),
                "js".to_string(),
            ],
            exclude_paths: vec![
                "vendor".to_string(),
                "node_modules".to_string(),
                ".git".to_string(),
                "cache".to_string(),
                "wp-content/cache".to_string(),
            ],
            follow_symlinks: false,
            quarantine_on_detect: true,
        }
    }
}

/// Resource budget ceilings. Defaults reflect constrained shared hosting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetConfig {
    /// Memory ceiling in bytes
    pub memory_ceiling_bytes: u64,
    /// Wall-clock ceiling in seconds
    pub time_ceiling_secs: u64,
    /// Maximum files processed per run
    pub max_files_per_run: u64,
    /// Skip files larger than this
    pub max_file_size_bytes: u64,
    /// Warning threshold as a fraction of each ceiling
    pub warning_fraction: f64,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            memory_ceiling_bytes: 128 * 1024 * 1024,
            time_ceiling_secs: 180,
            max_files_per_run: 5000,
            max_file_size_bytes: 5 * 1024 * 1024,
            warning_fraction: 0.8,
        }
    }
}

/// Detection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionConfig {
    /// Shannon entropy threshold (bits/byte) above which content is
    /// flagged as likely obfuscated
    pub entropy_threshold: f64,
    /// Attempt one base64/gzip decode layer and re-scan
    pub decode_and_recheck: bool,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            entropy_threshold: 5.7,
            decode_and_recheck: true,
        }
    }
}

/// Quarantine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuarantineConfig {
    /// Path for quarantine vault (defaults under the data dir)
    pub vault_path: Option<PathBuf>,
    /// Seconds to keep quarantined items before eviction
    pub max_age_secs: u64,
    /// Maximum vault size in bytes
    pub max_vault_size_bytes: u64,
}

impl Default for QuarantineConfig {
    fn default() -> Self {
        Self {
            vault_path: None,
            max_age_secs: 7 * 24 * 60 * 60,
            max_vault_size_bytes: 100 * 1024 * 1024,
        }
    }
}

impl QuarantineConfig {
    /// Get the effective quarantine directory.
    pub fn quarantine_dir(&self) -> PathBuf {
        self.vault_path
            .clone()
            .unwrap_or_else(|| Config::data_dir().join("quarantine"))
    }
}

/// Core integrity configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegrityConfig {
    /// Platform version the manifest applies to
    pub platform_version: String,
    /// Base URL of the checksum authority
    pub manifest_url: String,
    /// HTTP timeout for manifest and file fetches, in seconds
    pub fetch_timeout_secs: u64,
}

impl Default for IntegrityConfig {
    fn default() -> Self {
        Self {
            platform_version: String::new(),
            manifest_url: "https://api.wordpress.org/core/checksums/1.0/".to_string(),
            fetch_timeout_secs: 10,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Enable verbose console output
    pub verbose_console: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            verbose_console: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_save_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test_config.json");

        let config = Config::default();
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(
            loaded.budget.max_file_size_bytes,
            config.budget.max_file_size_bytes
        );
        assert_eq!(loaded.scan.extensions, config.scan.extensions);
    }

    #[test]
    fn test_invalid_config() {
        let mut config = Config::default();
        config.budget.max_file_size_bytes = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.scan.roots.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_quarantine_caps_defaults() {
        let q = QuarantineConfig::default();
        assert_eq!(q.max_vault_size_bytes, 100 * 1024 * 1024);
        assert_eq!(q.max_age_secs, 604800);
    }
}
