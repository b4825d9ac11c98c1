//! Request fingerprinting
//!
//! A fingerprint is a SHA-256 digest over a canonical serialization of the
//! request: normalized prompt, model id, sampling parameters with fixed
//! number formatting, and the seed when present. Canonicalization must stay
//! stable across runs or cache hits become non-deterministic.

use crate::llm::ModelParams;
use sha2::{Digest, Sha256};

/// Field separator in the canonical byte string. Cannot occur in any of the
/// formatted fields.
const FIELD_SEP: char = '\u{1f}';

/// Placeholder for absent optional fields.
const ABSENT: &str = "-";

/// Normalize prompt text so whitespace-only differences hash identically:
/// trim every line, then trim the whole.
pub fn normalize_prompt(prompt: &str) -> String {
    prompt
        .lines()
        .map(str::trim)
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

/// Compute the cache fingerprint for a generation request.
pub fn fingerprint(prompt: &str, model: &str, params: &ModelParams) -> String {
    let mut canonical = String::new();
    canonical.push_str(&normalize_prompt(prompt));
    canonical.push(FIELD_SEP);
    canonical.push_str(model);
    canonical.push(FIELD_SEP);
    canonical.push_str(&format!("{:.4}", params.temperature));
    canonical.push(FIELD_SEP);
    match params.top_p {
        Some(top_p) => canonical.push_str(&format!("{top_p:.4}")),
        None => canonical.push_str(ABSENT),
    }
    canonical.push(FIELD_SEP);
    match params.max_tokens {
        Some(max) => canonical.push_str(&max.to_string()),
        None => canonical.push_str(ABSENT),
    }
    canonical.push(FIELD_SEP);
    match params.seed {
        Some(seed) => canonical.push_str(&seed.to_string()),
        None => canonical.push_str(ABSENT),
    }

    let digest = Sha256::digest(canonical.as_bytes());
    format!("{digest:x}")
}
