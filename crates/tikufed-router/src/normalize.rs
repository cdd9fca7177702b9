//! Canonical text forms for cache keys and matcher inputs.
//!
//! The same question arrives with cosmetic differences: punctuation,
//! full-width vs half-width characters, shuffled option order. Everything
//! that is not a letter, digit, or CJK ideograph is stripped so those
//! variants collapse onto one cache entry.

/// Lowercase and strip every codepoint that is not a letter, digit, or
/// underscore. Whitespace and punctuation (CJK and ASCII) collapse to
/// nothing. Idempotent.
pub fn normalize_text(text: &str) -> String {
    text.chars()
        .filter(|c| c.is_alphanumeric() || *c == '_')
        .flat_map(char::to_lowercase)
        .collect()
}

/// Normalize each option, then sort lexicographically. Option order in the
/// original question is not part of a question's identity.
///
/// Returns `None` for absent or empty input so that "no options" and
/// "options present" never compare equal.
pub fn normalize_options(options: Option<&[String]>) -> Option<Vec<String>> {
    let options = options?;
    if options.is_empty() {
        return None;
    }
    let mut normalized: Vec<String> = options.iter().map(|o| normalize_text(o)).collect();
    normalized.sort();
    Some(normalized)
}
