use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Joins multi-valued answer text. Three characters that are vanishingly
/// unlikely to occur inside question or answer text.
pub const ANSWER_DELIMITER: &str = "#@#";

/// Hard ceiling on the number of options a question may carry (`A`..`Z`).
pub const MAX_OPTIONS: usize = 26;

/// Question type with a wire-stable integer encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum QuestionType {
    /// 0 — single choice
    Single,
    /// 1 — multiple choice
    Multiple,
    /// 2 — fill in the blank
    FillBlank,
    /// 3 — judgement (true/false)
    Judgement,
    /// 4 — essay / short answer
    Essay,
}

impl QuestionType {
    pub fn as_u8(self) -> u8 {
        self.into()
    }

    pub fn is_choice(self) -> bool {
        matches!(self, QuestionType::Single | QuestionType::Multiple)
    }

    pub fn is_text(self) -> bool {
        matches!(self, QuestionType::FillBlank | QuestionType::Essay)
    }
}

impl TryFrom<u8> for QuestionType {
    type Error = String;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            0 => Ok(QuestionType::Single),
            1 => Ok(QuestionType::Multiple),
            2 => Ok(QuestionType::FillBlank),
            3 => Ok(QuestionType::Judgement),
            4 => Ok(QuestionType::Essay),
            other => Err(format!("invalid question type {other}, expected 0..4")),
        }
    }
}

impl From<QuestionType> for u8 {
    fn from(value: QuestionType) -> Self {
        match value {
            QuestionType::Single => 0,
            QuestionType::Multiple => 1,
            QuestionType::FillBlank => 2,
            QuestionType::Judgement => 3,
            QuestionType::Essay => 4,
        }
    }
}

/// The question being searched, as carried in one request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Query {
    pub content: String,
    #[serde(rename = "type")]
    pub qtype: QuestionType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<String>>,
}

impl Query {
    pub fn new(content: impl Into<String>, qtype: QuestionType) -> Self {
        Self {
            content: content.into(),
            qtype,
            options: None,
        }
    }

    pub fn with_options(mut self, options: Vec<String>) -> Self {
        self.options = Some(options);
        self
    }

    pub fn options(&self) -> Option<&[String]> {
        self.options.as_deref().filter(|o| !o.is_empty())
    }
}

/// A caller's choice of one adapter plus its configuration for this request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderChoice {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<Map<String, Value>>,
}

impl ProviderChoice {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            priority: None,
            config: None,
        }
    }

    pub fn with_config(mut self, config: Map<String, Value>) -> Self {
        self.config = Some(config);
        self
    }

    /// The configuration map, empty when none was supplied.
    pub fn config_map(&self) -> Map<String, Value> {
        self.config.clone().unwrap_or_default()
    }
}

/// Closed failure taxonomy at the adapter boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ConfigError,
    ApiError,
    NetworkError,
    ParseError,
    MatchError,
    CacheMiss,
    Unknown,
}

/// One adapter's normalized result for one question.
///
/// On `success`, exactly one of `choice` / `judgement` / `text` is set,
/// determined by `qtype`. On failure both payloads are empty and
/// `error_kind` carries one of the closed kinds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerOutcome {
    pub provider: String,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub qtype: Option<QuestionType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub choice: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub judgement: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<Vec<String>>,
    pub success: bool,
    #[serde(rename = "error_type", skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl AnswerOutcome {
    pub fn choice(provider: impl Into<String>, qtype: QuestionType, keys: Vec<String>) -> Self {
        Self {
            provider: provider.into(),
            qtype: Some(qtype),
            choice: Some(keys),
            judgement: None,
            text: None,
            success: true,
            error_kind: None,
            error_message: None,
        }
    }

    pub fn judgement(provider: impl Into<String>, value: bool) -> Self {
        Self {
            provider: provider.into(),
            qtype: Some(QuestionType::Judgement),
            choice: None,
            judgement: Some(value),
            text: None,
            success: true,
            error_kind: None,
            error_message: None,
        }
    }

    pub fn text(provider: impl Into<String>, qtype: QuestionType, fragments: Vec<String>) -> Self {
        Self {
            provider: provider.into(),
            qtype: Some(qtype),
            choice: None,
            judgement: None,
            text: Some(fragments),
            success: true,
            error_kind: None,
            error_message: None,
        }
    }

    pub fn failure(
        provider: impl Into<String>,
        qtype: QuestionType,
        kind: ErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            provider: provider.into(),
            qtype: Some(qtype),
            choice: None,
            judgement: None,
            text: None,
            success: false,
            error_kind: Some(kind),
            error_message: Some(message.into()),
        }
    }
}

/// Option key for a 0-based option position: 0 → "A", 1 → "B", ...
pub fn option_key(index: usize) -> Option<String> {
    if index < MAX_OPTIONS {
        Some(((b'A' + index as u8) as char).to_string())
    } else {
        None
    }
}

/// Position of an option key: "A" → 0, "B" → 1, ...
pub fn key_index(key: &str) -> Option<usize> {
    let mut chars = key.chars();
    let c = chars.next()?;
    if chars.next().is_some() {
        return None;
    }
    if c.is_ascii_uppercase() {
        Some((c as u8 - b'A') as usize)
    } else {
        None
    }
}

/// The aggregator's single best answer across all providers, in every
/// encoding clients consume.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UnifiedAnswer {
    #[serde(rename = "answerKey")]
    pub answer_key: Vec<String>,
    #[serde(rename = "answerKeyText")]
    pub answer_key_text: String,
    #[serde(rename = "answerIndex")]
    pub answer_index: Vec<usize>,
    #[serde(rename = "answerText")]
    pub answer_text: String,
    #[serde(rename = "bestAnswer")]
    pub best_answer: Vec<String>,
}

/// The consolidated response for one search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub query: Query,
    pub unified_answer: UnifiedAnswer,
    pub provider_answers: Vec<AnswerOutcome>,
    pub successful_providers: usize,
    pub failed_providers: usize,
    pub total_providers: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn question_type_round_trips_through_wire_integers() {
        for value in 0u8..=4 {
            let qtype = QuestionType::try_from(value).unwrap();
            assert_eq!(qtype.as_u8(), value);
        }
        assert!(QuestionType::try_from(5).is_err());
    }

    #[test]
    fn question_type_serializes_as_integer() {
        let json = serde_json::to_string(&QuestionType::Judgement).unwrap();
        assert_eq!(json, "3");
        let back: QuestionType = serde_json::from_str("1").unwrap();
        assert_eq!(back, QuestionType::Multiple);
    }

    #[test]
    fn option_keys_map_both_ways() {
        assert_eq!(option_key(0).as_deref(), Some("A"));
        assert_eq!(option_key(13).as_deref(), Some("N"));
        assert_eq!(option_key(26), None);
        assert_eq!(key_index("A"), Some(0));
        assert_eq!(key_index("N"), Some(13));
        assert_eq!(key_index("a"), None);
        assert_eq!(key_index("AB"), None);
    }

    #[test]
    fn failure_outcome_serializes_wire_field_names() {
        let outcome = AnswerOutcome::failure(
            "万能题库",
            QuestionType::Single,
            ErrorKind::NetworkError,
            "连接超时",
        );
        let value = serde_json::to_value(&outcome).unwrap();
        assert_eq!(value["error_type"], "network_error");
        assert_eq!(value["success"], false);
        assert!(value.get("choice").is_none());
    }

    #[test]
    fn success_outcome_omits_error_fields() {
        let outcome = AnswerOutcome::choice("言溪题库", QuestionType::Single, vec!["A".into()]);
        let value = serde_json::to_value(&outcome).unwrap();
        assert!(value.get("error_type").is_none());
        assert_eq!(value["choice"][0], "A");
    }
}
