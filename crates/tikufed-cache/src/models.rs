use sqlx::types::Json;
use sqlx::FromRow;

use tikufed_router::{AnswerOutcome, QuestionType};

use crate::error::StoreError;

/// A resolved `questions` row, as needed by lookups. The embedding itself
/// never leaves the database.
#[derive(Debug, Clone, FromRow)]
pub struct QuestionRow {
    pub id: i64,
    pub content: String,
    #[sqlx(rename = "type")]
    pub qtype: i16,
    pub options: Option<Json<Vec<String>>>,
    pub normalized_options: Option<Json<Vec<String>>>,
}

/// One answer payload joined out of `answers`.
#[derive(Debug, Clone, FromRow)]
pub struct AnswerPayloadRow {
    #[sqlx(rename = "type")]
    pub qtype: i16,
    pub choice: Option<Json<Vec<String>>>,
    pub judgement: Option<bool>,
    pub text: Option<Json<Vec<String>>>,
}

impl AnswerPayloadRow {
    /// Rehydrate a cached payload into the in-flight answer shape.
    pub fn into_outcome(self, provider: &str) -> Result<AnswerOutcome, StoreError> {
        let qtype = u8::try_from(self.qtype)
            .ok()
            .and_then(|t| QuestionType::try_from(t).ok())
            .ok_or_else(|| StoreError::InvalidRow(format!("answer type {}", self.qtype)))?;

        Ok(AnswerOutcome {
            provider: provider.to_string(),
            qtype: Some(qtype),
            choice: self.choice.map(|c| c.0),
            judgement: self.judgement,
            text: self.text.map(|t| t.0),
            success: true,
            error_kind: None,
            error_message: None,
        })
    }
}

/// Batch-read row: one provider's cached answer for a question.
#[derive(Debug, Clone, FromRow)]
pub struct CachedAnswerRow {
    pub provider_name: String,
    #[sqlx(rename = "type")]
    pub qtype: i16,
    pub choice: Option<Json<Vec<String>>>,
    pub judgement: Option<bool>,
    pub text: Option<Json<Vec<String>>>,
}

impl CachedAnswerRow {
    pub fn into_outcome(self) -> Result<AnswerOutcome, StoreError> {
        let provider = self.provider_name.clone();
        AnswerPayloadRow {
            qtype: self.qtype,
            choice: self.choice,
            judgement: self.judgement,
            text: self.text,
        }
        .into_outcome(&provider)
    }
}
