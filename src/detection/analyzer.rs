//! Content analyzer: classifies a single file into findings.
//!
//! Pure read-and-classify; the analyzer never mutates files. Pipeline
//! order is fixed so identical bytes always produce identical findings:
//! zero-byte check, signature scan, filename shape, one-layer decode
//! re-scan, entropy check last.

use crate::core::config::DetectionConfig;
use crate::core::error::{Error, Result};
use crate::core::types::{is_php_extension, Finding, FindingType, Severity};
use crate::detection::entropy;
use crate::detection::patterns::PatternLibrary;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use flate2::read::GzDecoder;
use regex::bytes::Regex;
use std::io::Read;
use std::path::Path;
use std::sync::OnceLock;

/// Gzip stream magic.
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];
/// Ceiling on a decoded layer, guarding against decompression bombs.
const MAX_DECODED_BYTES: u64 = 10 * 1024 * 1024;
/// Shortest base64 run worth decoding.
const MIN_BASE64_RUN: usize = 40;

/// Why a file was skipped rather than analyzed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// File larger than the configured ceiling
    SizeExceeded { size: u64, limit: u64 },
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SizeExceeded { size, limit } => {
                write!(f, "file size {} exceeds ceiling {}", size, limit)
            }
        }
    }
}

/// Result of analyzing one file: findings, or a reason it was skipped.
#[derive(Debug, Clone)]
pub enum AnalysisOutcome {
    Findings(Vec<Finding>),
    Skipped(SkipReason),
}

impl AnalysisOutcome {
    /// Findings, if the file was analyzed. Empty slice means clean.
    pub fn findings(&self) -> &[Finding] {
        match self {
            Self::Findings(f) => f,
            Self::Skipped(_) => &[],
        }
    }
}

/// Classifies file content using a [`PatternLibrary`].
pub struct ContentAnalyzer {
    library: PatternLibrary,
    max_file_size: u64,
    decode_and_recheck: bool,
}

impl ContentAnalyzer {
    pub fn new(library: PatternLibrary, max_file_size: u64, detection: &DetectionConfig) -> Self {
        let library = library.with_entropy_threshold(detection.entropy_threshold);
        Self {
            library,
            max_file_size,
            decode_and_recheck: detection.decode_and_recheck,
        }
    }

    /// Analyze a single file. Unreadable files fail with `FileRead`;
    /// oversized files are skipped, not failed.
    pub fn analyze(&self, path: &Path) -> Result<AnalysisOutcome> {
        let metadata = std::fs::metadata(path).map_err(|e| Error::file_read(path, e))?;
        let size = metadata.len();

        // Zero-byte PHP files are a marker of botched infections and
        // are critical on their own.
        if size == 0 && is_php_extension(path) {
            return Ok(AnalysisOutcome::Findings(vec![Finding::new(
                path,
                FindingType::ZeroByte,
                Severity::Critical,
                "zero-byte php file",
            )]));
        }

        if size > self.max_file_size {
            return Ok(AnalysisOutcome::Skipped(SkipReason::SizeExceeded {
                size,
                limit: self.max_file_size,
            }));
        }

        let content = std::fs::read(path).map_err(|e| Error::file_read(path, e))?;
        Ok(AnalysisOutcome::Findings(self.analyze_bytes(path, &content)))
    }

    /// Classify a buffer. Deterministic given identical bytes: same
    /// findings, same order.
    pub fn analyze_bytes(&self, path: &Path, content: &[u8]) -> Vec<Finding> {
        let mut findings = Vec::new();
        let mut dangerous_hit = false;

        for hit in self.library.match_signatures(content) {
            dangerous_hit |= hit.dangerous;
            findings.push(Finding::new(
                path,
                FindingType::SignatureMatch,
                hit.severity,
                hit.pattern_id,
            ));
        }

        if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
            if let Some(hit) = self.library.match_filename(name) {
                findings.push(Finding::new(
                    path,
                    FindingType::SignatureMatch,
                    hit.severity,
                    hit.pattern_id,
                ));
            }
        }

        if self.decode_and_recheck {
            if let Some(decoded) = decode_one_layer(content) {
                for hit in self.library.match_signatures(&decoded) {
                    dangerous_hit |= hit.dangerous;
                    findings.push(Finding::new(
                        path,
                        FindingType::SignatureMatch,
                        hit.severity,
                        format!("decoded:{}", hit.pattern_id),
                    ));
                }
            }
        }

        // Entropy last. Obfuscation alone is a warning; paired with a
        // dangerous-function signature it carries that weight.
        if let Some(score) =
            entropy::obfuscation_score(content, self.library.entropy_threshold())
        {
            let severity = if dangerous_hit {
                Severity::High
            } else {
                Severity::Medium
            };
            findings.push(Finding::new(
                path,
                FindingType::Obfuscation,
                severity,
                format!("entropy={:.2}", score),
            ));
        }

        findings
    }
}

/// Strip one encoding layer, if the buffer looks wrapped: a gzip
/// stream, or a long base64 run embedded in the content.
fn decode_one_layer(content: &[u8]) -> Option<Vec<u8>> {
    if content.starts_with(&GZIP_MAGIC) {
        let mut decoded = Vec::new();
        let mut decoder = GzDecoder::new(content).take(MAX_DECODED_BYTES);
        if decoder.read_to_end(&mut decoded).is_ok() && !decoded.is_empty() {
            return Some(decoded);
        }
        return None;
    }

    let run = base64_run_regex()
        .find_iter(content)
        .max_by_key(|m| m.len())?;
    if run.len() < MIN_BASE64_RUN {
        return None;
    }
    let mut candidate = run.as_bytes().to_vec();
    // Pad to a multiple of four so embedded unpadded runs still decode.
    while candidate.len() % 4 != 0 {
        candidate.push(b'=');
    }
    BASE64.decode(&candidate).ok().filter(|d| !d.is_empty())
}

fn base64_run_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[A-Za-z0-9+/]{40,}={0,2}").unwrap())
}
