//! Core type definitions used throughout SiteSentry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Severity level of a finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Low risk - worth noting, not actionable on its own
    Low,
    /// Medium risk - suspicious content detected
    Medium,
    /// High risk - likely malicious
    High,
    /// Critical risk - confirmed malware indicator
    Critical,
}

impl Severity {
    /// Get a numeric score for the severity (0-100).
    pub fn score(&self) -> u8 {
        match self {
            Severity::Low => 25,
            Severity::Medium => 50,
            Severity::High => 75,
            Severity::Critical => 100,
        }
    }

    /// Get string representation for database storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }

    /// Parse from string.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "low" => Some(Severity::Low),
            "medium" => Some(Severity::Medium),
            "high" => Some(Severity::High),
            "critical" => Some(Severity::Critical),
            _ => None,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Low => write!(f, "LOW"),
            Severity::Medium => write!(f, "MEDIUM"),
            Severity::High => write!(f, "HIGH"),
            Severity::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// What kind of issue a finding describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingType {
    /// A signature pattern matched the file content
    SignatureMatch,
    /// Entropy or encoding heuristics flagged likely obfuscation
    Obfuscation,
    /// Zero-byte PHP file, a common remnant of partial infections
    ZeroByte,
    /// Core file content diverges from the manifest hash
    CoreModified,
    /// Core file listed in the manifest is missing
    CoreMissing,
    /// The file could not be analyzed (read failure etc.)
    AnalysisError,
}

impl FindingType {
    /// Get string representation for database storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            FindingType::SignatureMatch => "signature_match",
            FindingType::Obfuscation => "obfuscation",
            FindingType::ZeroByte => "zero_byte",
            FindingType::CoreModified => "core_modified",
            FindingType::CoreMissing => "core_missing",
            FindingType::AnalysisError => "analysis_error",
        }
    }

    /// Parse from string.
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "signature_match" => Some(FindingType::SignatureMatch),
            "obfuscation" => Some(FindingType::Obfuscation),
            "zero_byte" => Some(FindingType::ZeroByte),
            "core_modified" => Some(FindingType::CoreModified),
            "core_missing" => Some(FindingType::CoreMissing),
            "analysis_error" => Some(FindingType::AnalysisError),
            _ => None,
        }
    }
}

impl std::fmt::Display for FindingType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Current status of a scan run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanStatus {
    /// Run is currently executing
    Running,
    /// Run hit a resource ceiling and is resumable by cursor
    Paused,
    /// Run finished the whole tree
    Completed,
    /// Run aborted on an unrecoverable error
    Failed,
}

impl ScanStatus {
    /// Get string representation for database storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanStatus::Running => "running",
            ScanStatus::Paused => "paused",
            ScanStatus::Completed => "completed",
            ScanStatus::Failed => "failed",
        }
    }

    /// Parse from string.
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "running" => Some(ScanStatus::Running),
            "paused" => Some(ScanStatus::Paused),
            "completed" => Some(ScanStatus::Completed),
            "failed" => Some(ScanStatus::Failed),
            _ => None,
        }
    }

    /// Whether the run can still make progress.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ScanStatus::Completed | ScanStatus::Failed)
    }
}

impl std::fmt::Display for ScanStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single detected issue on a single file. Immutable once created;
/// corrections are new findings, not mutations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    /// Path to the affected file
    pub file_path: PathBuf,
    /// What kind of issue this is
    pub finding_type: FindingType,
    /// Severity level
    pub severity: Severity,
    /// Matched pattern id, entropy value, hash mismatch, or error text
    pub evidence: String,
    /// When the finding was produced
    pub detected_at: DateTime<Utc>,
}

impl Finding {
    /// Create a new finding.
    pub fn new(
        file_path: impl Into<PathBuf>,
        finding_type: FindingType,
        severity: Severity,
        evidence: impl Into<String>,
    ) -> Self {
        Self {
            file_path: file_path.into(),
            finding_type,
            severity,
            evidence: evidence.into(),
            detected_at: Utc::now(),
        }
    }

    /// Whether the remediation policy treats this finding as actionable.
    pub fn is_actionable(&self) -> bool {
        self.severity >= Severity::High
    }
}

/// One resumable execution of the scan pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanRun {
    /// Unique run identifier
    pub id: String,
    /// When the run started
    pub started_at: DateTime<Utc>,
    /// When the run reached a terminal state
    pub finished_at: Option<DateTime<Utc>>,
    /// Current status
    pub status: ScanStatus,
    /// Last fully-processed path; resume point for paused runs
    pub cursor: Option<String>,
    /// Roots this run was configured to walk
    pub roots: Vec<PathBuf>,
    /// Extensions this run was configured to inspect
    pub extensions: Vec<String>,
    /// Accumulated counters
    pub summary: ScanSummary,
}

impl ScanRun {
    /// Create a new running scan over the given roots.
    pub fn new(roots: Vec<PathBuf>, extensions: Vec<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            started_at: Utc::now(),
            finished_at: None,
            status: ScanStatus::Running,
            cursor: None,
            roots,
            extensions,
            summary: ScanSummary::default(),
        }
    }

    /// Mark the run completed.
    pub fn complete(&mut self) {
        self.finished_at = Some(Utc::now());
        self.status = ScanStatus::Completed;
        self.cursor = None;
    }

    /// Mark the run failed.
    pub fn fail(&mut self) {
        self.finished_at = Some(Utc::now());
        self.status = ScanStatus::Failed;
    }

    /// Pause the run at the given cursor position.
    pub fn pause(&mut self, cursor: impl Into<String>) {
        self.status = ScanStatus::Paused;
        self.cursor = Some(cursor.into());
    }

    /// Put a paused run back in motion; the cursor is kept.
    pub fn resume(&mut self) {
        self.status = ScanStatus::Running;
    }

    /// Calculate run duration in seconds, if finished.
    pub fn duration_secs(&self) -> Option<i64> {
        self.finished_at
            .map(|end| (end - self.started_at).num_seconds())
    }
}

/// Counters accumulated across the batches of one run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanSummary {
    /// Files analyzed
    pub files_checked: u64,
    /// Files skipped (size ceiling, unreadable metadata)
    pub files_skipped: u64,
    /// Bytes read
    pub bytes_scanned: u64,
    /// Actionable findings produced
    pub threats_found: u32,
    /// Files moved to the quarantine vault
    pub quarantined_count: u32,
    /// Per-file analysis errors recorded as findings
    pub errors: u32,
}

/// Snapshot of a file's identity taken before quarantine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileInfo {
    pub path: PathBuf,
    pub size: u64,
    pub sha256: String,
    /// Unix permission bits, restored on restore
    pub mode: u32,
}

/// Returns true for extensions the engine treats as PHP-equivalent.
pub fn is_php_extension(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("php") | Some("phtml") | Some("php5") | Some("php7")
    )
}
