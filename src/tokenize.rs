//! Deterministic tokenizer shared by the BM25 corpus and query sides.
//!
//! Applying the exact same routine to both sides keeps ranking stable
//! independent of locale or process state.

use regex::Regex;
use std::sync::OnceLock;

/// Matches maximal runs of lowercase alphanumerics.
fn token_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"[a-z0-9]+").expect("token pattern is valid"))
}

/// Tokenize text into lowercase alphanumeric runs.
///
/// - Lowercases the input
/// - Extracts maximal `[a-z0-9]+` runs (punctuation and whitespace split)
/// - Drops single-character tokens unless purely numeric, so error codes
///   and port numbers survive while stray letters do not
///
/// No stemming, no stop-word removal.
pub fn tokenize(text: &str) -> Vec<String> {
    let lowered = text.to_lowercase();
    token_pattern()
        .find_iter(&lowered)
        .map(|m| m.as_str().to_string())
        .filter(|t| t.len() > 1 || t.chars().all(|c| c.is_ascii_digit()))
        .collect()
}
