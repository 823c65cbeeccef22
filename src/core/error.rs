//! Error types and result handling for SiteSentry.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using our custom Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Why a quarantine attempt was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuarantineFailure {
    LockFailed,
    EncryptFailed,
    PersistFailed,
    AlreadyQuarantined,
}

impl std::fmt::Display for QuarantineFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LockFailed => write!(f, "lock acquisition failed"),
            Self::EncryptFailed => write!(f, "encryption failed"),
            Self::PersistFailed => write!(f, "record persistence failed"),
            Self::AlreadyQuarantined => write!(f, "an active record already covers this path"),
        }
    }
}

/// Why a restore attempt was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreFailure {
    MissingRecord,
    TargetDirGone,
}

impl std::fmt::Display for RestoreFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingRecord => write!(f, "no quarantine record for this id"),
            Self::TargetDirGone => write!(f, "original parent directory no longer exists"),
        }
    }
}

/// Why a core-file repair attempt failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepairFailure {
    FetchFailed,
    WriteFailed,
}

impl std::fmt::Display for RepairFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FetchFailed => write!(f, "fetching canonical content failed"),
            Self::WriteFailed => write!(f, "writing replacement failed"),
        }
    }
}

/// Why run-lock acquisition failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunLockFailure {
    AlreadyActive,
    StaleReclaimFailed,
}

impl std::fmt::Display for RunLockFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AlreadyActive => write!(f, "another scan run is active"),
            Self::StaleReclaimFailed => write!(f, "stale lock could not be reclaimed"),
        }
    }
}

/// Which resource budget was exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Memory,
    Time,
    FileCount,
    DbRows,
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Memory => write!(f, "memory"),
            Self::Time => write!(f, "time"),
            Self::FileCount => write!(f, "file count"),
            Self::DbRows => write!(f, "database rows"),
        }
    }
}

/// Main error type for SiteSentry operations.
#[derive(Error, Debug)]
pub enum Error {
    // ===== I/O Errors =====
    #[error("Failed to read file: {path}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write file: {path}")]
    FileWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to delete file: {path}")]
    FileDelete {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),

    #[error("Permission denied: {path}")]
    PermissionDenied {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ===== Configuration Errors =====
    #[error("Failed to load configuration: {0}")]
    ConfigLoad(String),

    #[error("Failed to save configuration: {0}")]
    ConfigSave(String),

    #[error("Invalid configuration value: {field} - {message}")]
    ConfigInvalid { field: String, message: String },

    // ===== Store Errors =====
    #[error("Database error: {0}")]
    DatabaseSql(#[from] rusqlite::Error),

    #[error("Failed to initialize database: {0}")]
    DatabaseInit(String),

    // ===== Scanning Errors =====
    #[error("Resource budget exceeded: {kind}")]
    ResourceLimitExceeded { kind: ResourceKind },

    #[error("Failed to analyze file: {path} - {reason}")]
    AnalysisFailed { path: PathBuf, reason: String },

    #[error("Scan run not found: {0}")]
    RunNotFound(String),

    #[error("Run lock error: {reason}")]
    RunLock { reason: RunLockFailure },

    // ===== Quarantine Errors =====
    #[error("Failed to quarantine file: {path} ({reason})")]
    QuarantineFailed {
        path: PathBuf,
        reason: QuarantineFailure,
    },

    #[error("Failed to restore quarantine item {id} ({reason})")]
    RestoreFailed { id: String, reason: RestoreFailure },

    #[error("Quarantine item not found: {0}")]
    QuarantineItemNotFound(String),

    #[error("Encryption error: {0}")]
    Encryption(String),

    #[error("Decryption error: {0}")]
    Decryption(String),

    // ===== Core Integrity Errors =====
    #[error("Failed to repair core file {path} ({reason})")]
    CoreRepair { path: PathBuf, reason: RepairFailure },

    #[error("Core manifest unavailable for version {0}")]
    ManifestUnavailable(String),

    // ===== Network Errors =====
    #[error("Network error: {0}")]
    Network(String),

    // ===== Concurrency Errors =====
    #[error("Lock poisoned: {context}")]
    LockPoisoned { context: String },

    // ===== Serialization Errors =====
    #[error("JSON serialization error")]
    JsonSerialize(#[from] serde_json::Error),

    // ===== Generic Errors =====
    #[error("I/O error: {0}")]
    Io(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

impl Error {
    /// Create a file read error.
    pub fn file_read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::FileRead {
            path: path.into(),
            source,
        }
    }

    /// Create a file write error.
    pub fn file_write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::FileWrite {
            path: path.into(),
            source,
        }
    }

    /// Create an analysis failure for a single file.
    pub fn analysis_failed(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::AnalysisFailed {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a quarantine failure.
    pub fn quarantine_failed(path: impl Into<PathBuf>, reason: QuarantineFailure) -> Self {
        Self::QuarantineFailed {
            path: path.into(),
            reason,
        }
    }

    /// Create a restore failure.
    pub fn restore_failed(id: impl Into<String>, reason: RestoreFailure) -> Self {
        Self::RestoreFailed {
            id: id.into(),
            reason,
        }
    }

    /// Create a core repair failure.
    pub fn core_repair(path: impl Into<PathBuf>, reason: RepairFailure) -> Self {
        Self::CoreRepair {
            path: path.into(),
            reason,
        }
    }

    /// Create a lock poisoned error.
    pub fn lock_poisoned(context: impl Into<String>) -> Self {
        Self::LockPoisoned {
            context: context.into(),
        }
    }

    /// Check if this error is recoverable (the run can continue with the
    /// next item).
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::FileRead { .. }
                | Error::PermissionDenied { .. }
                | Error::AnalysisFailed { .. }
                | Error::QuarantineFailed { .. }
                | Error::RestoreFailed { .. }
                | Error::CoreRepair { .. }
        )
    }

    /// Check if this error is network-related and potentially retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Network(_) | Error::ManifestUnavailable(_)
        )
    }

    /// Get the error category for logging.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::FileRead { .. }
            | Error::FileWrite { .. }
            | Error::FileDelete { .. }
            | Error::PathNotFound(_)
            | Error::PermissionDenied { .. }
            | Error::Io(_) => ErrorCategory::Io,

            Error::ConfigLoad(_) | Error::ConfigSave(_) | Error::ConfigInvalid { .. } => {
                ErrorCategory::Configuration
            }

            Error::DatabaseSql(_) | Error::DatabaseInit(_) => ErrorCategory::Store,

            Error::ResourceLimitExceeded { .. }
            | Error::AnalysisFailed { .. }
            | Error::RunNotFound(_)
            | Error::RunLock { .. } => ErrorCategory::Scanning,

            Error::QuarantineFailed { .. }
            | Error::RestoreFailed { .. }
            | Error::QuarantineItemNotFound(_)
            | Error::Encryption(_)
            | Error::Decryption(_) => ErrorCategory::Quarantine,

            Error::CoreRepair { .. } | Error::ManifestUnavailable(_) => ErrorCategory::Integrity,

            Error::Network(_) => ErrorCategory::Network,

            Error::LockPoisoned { .. } => ErrorCategory::Concurrency,

            Error::JsonSerialize(_) => ErrorCategory::Serialization,

            Error::Internal(_) | Error::Other(_) => ErrorCategory::Other,
        }
    }
}

/// Error category for classification in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    Io,
    Configuration,
    Store,
    Scanning,
    Quarantine,
    Integrity,
    Network,
    Concurrency,
    Serialization,
    Other,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io => write!(f, "I/O"),
            Self::Configuration => write!(f, "Configuration"),
            Self::Store => write!(f, "Store"),
            Self::Scanning => write!(f, "Scanning"),
            Self::Quarantine => write!(f, "Quarantine"),
            Self::Integrity => write!(f, "Integrity"),
            Self::Network => write!(f, "Network"),
            Self::Concurrency => write!(f, "Concurrency"),
            Self::Serialization => write!(f, "Serialization"),
            Self::Other => write!(f, "Other"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::PathNotFound(PathBuf::from("/test/path"));
        assert_eq!(err.to_string(), "Path not found: /test/path");
    }

    #[test]
    fn test_recoverable_errors() {
        let err = Error::analysis_failed("/test", "unreadable");
        assert!(err.is_recoverable());

        let err = Error::RunLock {
            reason: RunLockFailure::AlreadyActive,
        };
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_quarantine_failure_display() {
        let err = Error::quarantine_failed("/srv/site/a.php", QuarantineFailure::PersistFailed);
        assert!(err.to_string().contains("record persistence failed"));
        assert_eq!(err.category(), ErrorCategory::Quarantine);
    }

    #[test]
    fn test_resource_kind_display() {
        let err = Error::ResourceLimitExceeded {
            kind: ResourceKind::Time,
        };
        assert_eq!(err.to_string(), "Resource budget exceeded: time");
    }
}
