//! Shared parsing for the answer strings upstreams return: option-letter
//! extraction, multi-answer splitting, and judgement canonicalization.

/// Markers counted as "true" / "false" when a judgement answer arrives as
/// text. Checked as substrings, true markers first; anything that matches
/// neither defaults to true.
const TRUE_MARKERS: [&str; 9] = ["正确", "对", "是", "√", "✓", "t", "true", "yes", "1"];
const FALSE_MARKERS: [&str; 9] = ["错误", "错", "否", "×", "✗", "f", "false", "no", "0"];

/// Answer-text prefixes stripped before option-letter extraction.
const ANSWER_PREFIXES: [&str; 4] = ["答案：", "答案:", "正确答案：", "正确答案:"];

/// Separators that upstreams use between multiple answers, longest first.
const TEXT_SEPARATORS: [&str; 6] = ["#@#", "#", "|", ";", "；", "、"];

/// Extract distinct uppercase option letters from an answer string, in
/// order of first occurrence. Returns empty when the string carries none.
pub fn extract_choice_keys(answer: &str) -> Vec<String> {
    let mut answer = answer.trim();
    for prefix in ANSWER_PREFIXES {
        if let Some(rest) = answer.strip_prefix(prefix) {
            answer = rest.trim_start();
            break;
        }
    }

    let mut keys: Vec<String> = Vec::new();
    for c in answer.chars() {
        let upper = c.to_ascii_uppercase();
        if upper.is_ascii_uppercase() {
            let key = upper.to_string();
            if !keys.contains(&key) {
                keys.push(key);
            }
        }
    }
    keys
}

/// Split a combined answer string on the first separator it contains.
/// A string with no separator comes back as a single trimmed fragment.
pub fn split_text_answer(answer: &str) -> Vec<String> {
    for separator in TEXT_SEPARATORS {
        if answer.contains(separator) {
            let parts: Vec<String> = answer
                .split(separator)
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(str::to_string)
                .collect();
            if !parts.is_empty() {
                return parts;
            }
        }
    }
    vec![answer.trim().to_string()]
}

/// Canonicalize a textual judgement answer to a boolean.
pub fn parse_judgement(answer: &str) -> bool {
    let answer = answer.trim().to_lowercase();
    if TRUE_MARKERS.iter().any(|marker| answer.contains(marker)) {
        return true;
    }
    if FALSE_MARKERS.iter().any(|marker| answer.contains(marker)) {
        return false;
    }
    true
}
