//! Voting aggregator: collapses the per-provider answer set into one
//! unified answer.
//!
//! Aggregation is associative over the answer multiset; completion order
//! of the adapters never changes the winner. Ties break by arrival order
//! of the first vote for each candidate.

use std::collections::HashMap;

use crate::matcher::build_choice_answer_from_texts;
use crate::providers::text::parse_judgement;
use crate::types::{
    key_index, AnswerOutcome, Query, QuestionType, SearchResult, UnifiedAnswer, ANSWER_DELIMITER,
};

/// Build the full response: unified answer plus the per-provider list and
/// success/failure counts.
pub fn construct_result(query: &Query, answers: Vec<AnswerOutcome>) -> SearchResult {
    let successful = answers.iter().filter(|a| a.success).count();
    let total = answers.len();
    let unified_answer = unify(query, &answers);
    SearchResult {
        query: query.clone(),
        unified_answer,
        provider_answers: answers,
        successful_providers: successful,
        failed_providers: total - successful,
        total_providers: total,
    }
}

/// The single best answer across all successful provider answers.
/// No successes yields the empty unified answer, not an error.
pub fn unify(query: &Query, answers: &[AnswerOutcome]) -> UnifiedAnswer {
    let successes: Vec<&AnswerOutcome> = answers.iter().filter(|a| a.success).collect();
    if successes.is_empty() {
        return UnifiedAnswer::default();
    }

    match query.qtype {
        QuestionType::Single | QuestionType::Multiple => unify_choice(query, &successes),
        QuestionType::FillBlank | QuestionType::Essay => unify_text(&successes),
        QuestionType::Judgement => unify_judgement(&successes),
    }
}

/// Modal element with ties broken by first arrival.
fn modal<T: Eq + std::hash::Hash + Clone>(votes: impl Iterator<Item = T>) -> Option<T> {
    let mut counts: HashMap<T, usize> = HashMap::new();
    let mut order: Vec<T> = Vec::new();
    for vote in votes {
        let count = counts.entry(vote.clone()).or_insert(0);
        if *count == 0 {
            order.push(vote);
        }
        *count += 1;
    }

    let mut best: Option<(T, usize)> = None;
    for candidate in order {
        let count = counts[&candidate];
        // Strict inequality keeps the earliest candidate on ties.
        if best.as_ref().map_or(true, |(_, top)| count > *top) {
            best = Some((candidate, count));
        }
    }
    best.map(|(candidate, _)| candidate)
}

fn choice_vote(query: &Query, answer: &AnswerOutcome) -> Option<Vec<String>> {
    let options = query.options();

    if let Some(choice) = answer.choice.as_deref().filter(|c| !c.is_empty()) {
        let mut keys: Vec<String> = choice
            .iter()
            .map(|k| k.trim().to_ascii_uppercase())
            .filter(|k| match (key_index(k), options) {
                (Some(index), Some(opts)) => index < opts.len(),
                (Some(_), None) => true,
                (None, _) => false,
            })
            .collect();
        keys.sort();
        keys.dedup();
        return (!keys.is_empty()).then_some(keys);
    }

    // Prose answers vote through the matcher.
    let texts = answer.text.as_deref().filter(|t| !t.is_empty())?;
    let matched = build_choice_answer_from_texts(&answer.provider, texts, options, query.qtype);
    matched.choice.filter(|keys| !keys.is_empty())
}

fn unify_choice(query: &Query, successes: &[&AnswerOutcome]) -> UnifiedAnswer {
    let winner = modal(successes.iter().filter_map(|a| choice_vote(query, a)));
    let Some(answer_key) = winner else {
        return UnifiedAnswer::default();
    };

    let answer_key_text = answer_key.concat();
    let (answer_index, best_answer) = match query.options() {
        Some(options) => {
            let indices: Vec<usize> = answer_key
                .iter()
                .filter_map(|k| key_index(k))
                .filter(|i| *i < options.len())
                .collect();
            let texts: Vec<String> = indices.iter().map(|i| options[*i].clone()).collect();
            (indices, texts)
        }
        None => (Vec::new(), Vec::new()),
    };
    let answer_text = best_answer.join(ANSWER_DELIMITER);

    UnifiedAnswer {
        answer_key,
        answer_key_text,
        answer_index,
        answer_text,
        best_answer,
    }
}

fn unify_text(successes: &[&AnswerOutcome]) -> UnifiedAnswer {
    let votes = successes.iter().filter_map(|a| {
        a.text
            .as_deref()
            .map(|t| {
                t.iter()
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect::<Vec<String>>()
            })
            .filter(|t| !t.is_empty())
    });
    let Some(best_answer) = modal(votes) else {
        return UnifiedAnswer::default();
    };

    UnifiedAnswer {
        answer_text: best_answer.join(ANSWER_DELIMITER),
        best_answer,
        ..UnifiedAnswer::default()
    }
}

fn judgement_vote(answer: &AnswerOutcome) -> Option<bool> {
    if let Some(value) = answer.judgement {
        return Some(value);
    }
    answer
        .text
        .as_deref()
        .and_then(|t| t.first())
        .map(|t| parse_judgement(t))
}

fn unify_judgement(successes: &[&AnswerOutcome]) -> UnifiedAnswer {
    let Some(winner) = modal(successes.iter().filter_map(|a| judgement_vote(a))) else {
        return UnifiedAnswer::default();
    };

    let best_answer = vec![if winner { "对" } else { "错" }.to_string()];
    UnifiedAnswer {
        answer_text: best_answer.join(ANSWER_DELIMITER),
        best_answer,
        ..UnifiedAnswer::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn text_answer(provider: &str, qtype: QuestionType, fragments: &[&str]) -> AnswerOutcome {
        AnswerOutcome::text(
            provider,
            qtype,
            fragments.iter().map(|s| s.to_string()).collect(),
        )
    }

    fn opts(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn single_choice_prose_answers_converge_on_one_option() {
        let query = Query::new("毛泽东思想形成的时代背景是( )", QuestionType::Single)
            .with_options(opts(&[
                "帝国主义战争与无产阶级革命成为时代主题",
                "和平与发展成为时代主题",
                "世界多极化成为时代主题",
                "经济全球化成为时代主题",
            ]));
        let answers = vec![
            text_answer("p1", QuestionType::Single, &["帝国主义战争与无产阶级革命成为时代主题"]),
            text_answer("p2", QuestionType::Single, &["帝国主义战争和无产阶级革命"]),
            text_answer("p3", QuestionType::Single, &["帝国主义战争与无产阶级革命成为时代主题"]),
            text_answer("p4", QuestionType::Single, &["战争与革命"]),
            text_answer("p5", QuestionType::Single, &["帝国主义战争与无产阶级革命成为时代主题"]),
            text_answer("p6", QuestionType::Single, &["帝国主义战争与无产阶级革命"]),
        ];

        let result = construct_result(&query, answers);
        assert_eq!(result.successful_providers, 6);
        assert_eq!(
            result.unified_answer.best_answer,
            opts(&["帝国主义战争与无产阶级革命成为时代主题"])
        );
        assert_eq!(result.unified_answer.answer_key, opts(&["A"]));
        assert_eq!(result.unified_answer.answer_index, vec![0]);
        assert_eq!(result.unified_answer.answer_key_text, "A");
    }

    #[test]
    fn multi_choice_mixed_keys_and_texts_select_all_options() {
        let query = Query::new(
            "通过劳动教育，牢固树立（）的观念。",
            QuestionType::Multiple,
        )
        .with_options(opts(&["A劳动最光荣", "B劳动最崇高", "C劳动最伟大", "D劳动最美丽"]));
        let all_keys = opts(&["A", "B", "C", "D"]);
        let answers = vec![
            AnswerOutcome::choice("p1", QuestionType::Multiple, all_keys.clone()),
            text_answer("p2", QuestionType::Multiple, &["劳动最伟大劳动最美丽劳动最光荣劳动最崇高\n \n"]),
            AnswerOutcome::choice("p3", QuestionType::Multiple, all_keys.clone()),
            text_answer("p4", QuestionType::Multiple, &["劳动最光荣", "劳动最崇高", "劳动最伟大", "劳动最美丽"]),
            AnswerOutcome::choice("p5", QuestionType::Multiple, all_keys.clone()),
            text_answer("p6", QuestionType::Multiple, &["劳动最光荣", "劳动最崇高", "劳动最伟大", "劳动最美丽"]),
        ];

        let result = construct_result(&query, answers);
        assert_eq!(result.unified_answer.answer_key, all_keys);
        assert_eq!(
            result.unified_answer.best_answer,
            opts(&["A劳动最光荣", "B劳动最崇高", "C劳动最伟大", "D劳动最美丽"])
        );
        assert_eq!(result.unified_answer.answer_index, vec![0, 1, 2, 3]);
    }

    #[test]
    fn judgement_majority_wins() {
        let query =
            Query::new("热爱劳动，尊重普通劳动者。", QuestionType::Judgement).with_options(opts(&["对", "错"]));
        let answers = vec![
            text_answer("p1", QuestionType::Judgement, &["正确"]),
            text_answer("p2", QuestionType::Judgement, &["对"]),
            text_answer("p3", QuestionType::Judgement, &["T"]),
            text_answer("p4", QuestionType::Judgement, &["y"]),
            text_answer("p5", QuestionType::Judgement, &["正确"]),
            text_answer("p6", QuestionType::Judgement, &["错"]),
        ];

        let result = construct_result(&query, answers);
        assert_eq!(result.unified_answer.best_answer, opts(&["对"]));
        assert_eq!(result.unified_answer.answer_text, "对");
    }

    #[test]
    fn fill_blank_modal_tuple_wins() {
        let query = Query::new("《共产党宣言》发表于____年。", QuestionType::FillBlank);
        let answers = vec![
            text_answer("p1", QuestionType::FillBlank, &["1848"]),
            text_answer("p2", QuestionType::FillBlank, &["1848"]),
            text_answer("p3", QuestionType::FillBlank, &["1847"]),
        ];

        let result = construct_result(&query, answers);
        assert_eq!(result.unified_answer.best_answer, opts(&["1848"]));
        assert_eq!(result.unified_answer.answer_text, "1848");
        assert!(result.unified_answer.answer_key.is_empty());
    }

    #[test]
    fn failures_are_listed_but_never_vote() {
        let query = Query::new("测试", QuestionType::Single).with_options(opts(&["甲", "乙"]));
        let answers = vec![
            AnswerOutcome::failure(
                "down",
                QuestionType::Single,
                crate::types::ErrorKind::NetworkError,
                "连接超时",
            ),
            AnswerOutcome::choice("up", QuestionType::Single, opts(&["B"])),
        ];

        let result = construct_result(&query, answers);
        assert_eq!(result.total_providers, 2);
        assert_eq!(result.successful_providers, 1);
        assert_eq!(result.failed_providers, 1);
        assert_eq!(result.unified_answer.answer_key, opts(&["B"]));
        assert_eq!(result.unified_answer.best_answer, opts(&["乙"]));
    }

    #[test]
    fn no_successes_yield_an_empty_unified_answer() {
        let query = Query::new("测试", QuestionType::Single).with_options(opts(&["甲", "乙"]));
        let answers = vec![AnswerOutcome::failure(
            "down",
            QuestionType::Single,
            crate::types::ErrorKind::ApiError,
            "未找到答案",
        )];

        let result = construct_result(&query, answers);
        assert_eq!(result.unified_answer, UnifiedAnswer::default());
        assert_eq!(result.successful_providers, 0);
    }

    #[test]
    fn aggregation_is_deterministic() {
        let query = Query::new("测试", QuestionType::Single).with_options(opts(&["甲", "乙", "丙"]));
        let answers: Vec<AnswerOutcome> = vec![
            AnswerOutcome::choice("p1", QuestionType::Single, opts(&["A"])),
            AnswerOutcome::choice("p2", QuestionType::Single, opts(&["B"])),
            AnswerOutcome::choice("p3", QuestionType::Single, opts(&["A"])),
        ];

        let first = unify(&query, &answers);
        let second = unify(&query, &answers);
        assert_eq!(first, second);
        assert_eq!(first.answer_key, opts(&["A"]));
    }

    #[test]
    fn tie_breaks_by_arrival_order() {
        let query = Query::new("测试", QuestionType::Single).with_options(opts(&["甲", "乙"]));
        let answers = vec![
            AnswerOutcome::choice("p1", QuestionType::Single, opts(&["B"])),
            AnswerOutcome::choice("p2", QuestionType::Single, opts(&["A"])),
        ];

        let unified = unify(&query, &answers);
        assert_eq!(unified.answer_key, opts(&["B"]));
    }

    #[test]
    fn out_of_range_keys_are_dropped_from_votes() {
        let query = Query::new("测试", QuestionType::Single).with_options(opts(&["甲", "乙"]));
        let answers = vec![
            AnswerOutcome::choice("p1", QuestionType::Single, opts(&["E"])),
            AnswerOutcome::choice("p2", QuestionType::Single, opts(&["A"])),
        ];

        let unified = unify(&query, &answers);
        assert_eq!(unified.answer_key, opts(&["A"]));
    }
}
