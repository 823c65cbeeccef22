//! Malware detection: signature patterns, entropy heuristics, and the
//! per-file content analysis pipeline.

pub mod analyzer;
pub mod entropy;
pub mod patterns;

pub use analyzer::{AnalysisOutcome, ContentAnalyzer, SkipReason};
pub use patterns::{PatternLibrary, SignatureHit, SignaturePattern};
