//! Free-text answer to option-key matching.
//!
//! Upstreams frequently return prose instead of option letters:
//!
//! - option: "帝国主义战争与无产阶级革命成为时代主题"
//! - upstream answer: "帝国主义战争和无产阶级革命"
//!
//! The answer must still resolve to option `A`. Scoring tolerates lexical
//! variation (punctuation, connecting particles, partial phrasing) while
//! refusing matches below a confidence floor.

use crate::normalize::normalize_text;
use crate::types::{key_index, option_key, AnswerOutcome, ErrorKind, QuestionType};

/// Baseline score a multi-select option must reach to be included.
pub const MATCH_THRESHOLD: f64 = 0.5;

/// Single-select (and multi-select fallback) accepts the top option at
/// `MATCH_THRESHOLD * SINGLE_GATE`.
const SINGLE_GATE: f64 = 0.6;

/// Matcher preprocessing: normalized form with connecting particles
/// unified, so "战争与革命" and "战争和革命" compare equal.
pub fn normalize_for_match(text: &str) -> String {
    normalize_text(text).replace('与', "和").replace('及', "和")
}

/// Similarity between an answer string and one option, in [0, 1].
///
/// Exact equality of normalized forms scores 1.0; containment scores the
/// length ratio scaled by 0.95/0.90; everything else blends character-set
/// Jaccard similarity with the longest-common-substring ratio.
pub fn match_score(answer: &str, option: &str) -> f64 {
    let answer = normalize_for_match(answer);
    let option = normalize_for_match(option);
    if answer.is_empty() || option.is_empty() {
        return 0.0;
    }

    if answer == option {
        return 1.0;
    }

    let answer_chars: Vec<char> = answer.chars().collect();
    let option_chars: Vec<char> = option.chars().collect();

    if option.contains(&answer) {
        return answer_chars.len() as f64 / option_chars.len() as f64 * 0.95;
    }
    if answer.contains(&option) {
        return option_chars.len() as f64 / answer_chars.len() as f64 * 0.9;
    }

    let answer_set: std::collections::HashSet<char> = answer_chars.iter().copied().collect();
    let option_set: std::collections::HashSet<char> = option_chars.iter().copied().collect();
    let intersection = answer_set.intersection(&option_set).count();
    let union = answer_set.union(&option_set).count();
    if union == 0 {
        return 0.0;
    }
    let jaccard = intersection as f64 / union as f64;

    let lcs = longest_common_substring(&answer_chars, &option_chars);
    let lcs_ratio = lcs as f64 / answer_chars.len().max(option_chars.len()) as f64;

    jaccard * 0.4 + lcs_ratio * 0.6
}

fn longest_common_substring(a: &[char], b: &[char]) -> usize {
    if a.is_empty() || b.is_empty() {
        return 0;
    }
    let mut prev = vec![0usize; b.len() + 1];
    let mut curr = vec![0usize; b.len() + 1];
    let mut best = 0;

    for i in 1..=a.len() {
        for j in 1..=b.len() {
            if a[i - 1] == b[j - 1] {
                curr[j] = prev[j - 1] + 1;
                best = best.max(curr[j]);
            } else {
                curr[j] = 0;
            }
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    best
}

struct Matched {
    index: usize,
    key: String,
    score: f64,
}

/// Match one answer string against the option list.
///
/// Returns the selected (index-ordered) keys, or the failure message with
/// the best score seen.
fn match_text_to_options(
    answer_text: &str,
    options: &[String],
    threshold: f64,
    is_multiple: bool,
) -> std::result::Result<Vec<Matched>, String> {
    if answer_text.is_empty() || options.is_empty() {
        return Err("答案或选项为空".to_string());
    }

    let mut scores: Vec<Matched> = options
        .iter()
        .enumerate()
        .filter_map(|(index, option)| {
            option_key(index).map(|key| Matched {
                index,
                key,
                score: match_score(answer_text, option),
            })
        })
        .collect();
    scores.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

    let top_score = scores.first().map(|m| m.score).unwrap_or(0.0);

    let mut matched: Vec<Matched> = if is_multiple {
        let qualified: Vec<Matched> = scores
            .iter()
            .filter(|m| m.score >= threshold)
            .map(|m| Matched {
                index: m.index,
                key: m.key.clone(),
                score: m.score,
            })
            .collect();
        if qualified.is_empty() && top_score >= threshold * SINGLE_GATE {
            scores.drain(..1).collect()
        } else {
            qualified
        }
    } else if top_score >= threshold * SINGLE_GATE {
        scores.drain(..1).collect()
    } else {
        Vec::new()
    };

    if matched.is_empty() {
        return Err(format!("无法匹配到选项，最高匹配度: {top_score:.2}"));
    }

    matched.sort_by_key(|m| m.index);
    Ok(matched)
}

fn choice_outcome(provider: &str, keys: Vec<String>) -> AnswerOutcome {
    // The requested type may be wrong upstream; recompute from the number
    // of selected keys.
    let actual = if keys.len() > 1 {
        QuestionType::Multiple
    } else {
        QuestionType::Single
    };
    AnswerOutcome::choice(provider, actual, keys)
}

/// Match free answer text to the option list and build a choice outcome.
pub fn build_choice_answer(
    provider: &str,
    answer_text: &str,
    options: Option<&[String]>,
    qtype: QuestionType,
) -> AnswerOutcome {
    let Some(options) = options.filter(|o| !o.is_empty()) else {
        return AnswerOutcome::failure(
            provider,
            qtype,
            ErrorKind::MatchError,
            "题目没有选项，无法匹配",
        );
    };
    if answer_text.is_empty() {
        return AnswerOutcome::failure(provider, qtype, ErrorKind::MatchError, "答案文本为空");
    }

    let is_multiple = qtype == QuestionType::Multiple;
    match match_text_to_options(answer_text, options, MATCH_THRESHOLD, is_multiple) {
        Ok(matched) => choice_outcome(provider, matched.into_iter().map(|m| m.key).collect()),
        Err(message) => AnswerOutcome::failure(provider, qtype, ErrorKind::MatchError, message),
    }
}

/// Match a list of answer fragments, each resolved to its best option, and
/// union the resulting keys. Used when an upstream returns one text per
/// selected option.
pub fn build_choice_answer_from_texts(
    provider: &str,
    texts: &[String],
    options: Option<&[String]>,
    qtype: QuestionType,
) -> AnswerOutcome {
    let Some(options) = options.filter(|o| !o.is_empty()) else {
        return AnswerOutcome::failure(
            provider,
            qtype,
            ErrorKind::MatchError,
            "题目没有选项，无法匹配",
        );
    };

    let mut keys: Vec<String> = Vec::new();
    for text in texts {
        if let Ok(matched) = match_text_to_options(text, options, MATCH_THRESHOLD, false) {
            for m in matched {
                if !keys.contains(&m.key) {
                    keys.push(m.key);
                }
            }
        }
    }
    if keys.is_empty() {
        return AnswerOutcome::failure(
            provider,
            qtype,
            ErrorKind::MatchError,
            "无法将答案文本匹配到任何选项",
        );
    }
    keys.sort();
    choice_outcome(provider, keys)
}

/// Validate upstream option keys (`A`..), falling back to text matching
/// when none survive validation.
pub fn build_choice_answer_from_keys(
    provider: &str,
    answer_keys: &[String],
    fallback_text: Option<&str>,
    options: Option<&[String]>,
    qtype: QuestionType,
) -> AnswerOutcome {
    let Some(option_list) = options.filter(|o| !o.is_empty()) else {
        return AnswerOutcome::failure(
            provider,
            qtype,
            ErrorKind::MatchError,
            "题目没有选项，无法匹配",
        );
    };

    // Validated keys are kept verbatim: input order and duplicates
    // included, and the recomputed type counts them as given.
    let mut valid_keys: Vec<String> = Vec::new();
    for key in answer_keys {
        let key = key.trim().to_ascii_uppercase();
        if let Some(index) = key_index(&key) {
            if index < option_list.len() {
                valid_keys.push(key);
            }
        }
    }

    if !valid_keys.is_empty() {
        return choice_outcome(provider, valid_keys);
    }

    let joined;
    let text = match fallback_text {
        Some(text) if !text.is_empty() => text,
        _ => {
            joined = answer_keys.join(" ");
            &joined
        }
    };
    build_choice_answer(provider, text, options, qtype)
}
