//! Shannon entropy scoring for detecting obfuscated script content.
//!
//! Plain PHP/JS source sits well below 5.7 bits/byte; base64 blobs,
//! packed payloads and encrypted strings push whole files above it.
//! Entropy alone is a heuristic, never sufficient for irreversible
//! action without signature evidence.

/// Entropy threshold (bits/byte) above which content is considered
/// likely obfuscated.
pub const OBFUSCATION_THRESHOLD: f64 = 5.7;

/// Buffers shorter than this give meaningless entropy estimates and
/// score 0.0.
const MIN_SAMPLE_LEN: usize = 64;

/// Calculate Shannon entropy of byte data, in bits per byte.
///
/// Returns a value between 0.0 (uniform) and 8.0 (maximum randomness).
pub fn shannon_entropy(data: &[u8]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }

    let mut frequencies = [0u64; 256];
    for &byte in data {
        frequencies[byte as usize] += 1;
    }

    let len = data.len() as f64;
    let mut entropy = 0.0;

    for &count in &frequencies {
        if count > 0 {
            let probability = count as f64 / len;
            entropy -= probability * probability.log2();
        }
    }

    entropy
}

/// Score a buffer against the obfuscation threshold. Returns the
/// entropy value when it crosses the threshold, `None` otherwise or
/// when the buffer is too short to judge.
pub fn obfuscation_score(data: &[u8], threshold: f64) -> Option<f64> {
    if data.len() < MIN_SAMPLE_LEN {
        return None;
    }
    let entropy = shannon_entropy(data);
    (entropy > threshold).then_some(entropy)
}
