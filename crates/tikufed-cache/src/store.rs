//! The persistent semantic cache: exact lookup by normalized key, vector
//! nearest-neighbor lookup, batched per-provider reads, and idempotent
//! write-through.

use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::PgPool;

use tikufed_router::{normalize_options, normalize_text, AnswerCache, AnswerOutcome, Query};

use crate::embedding::EmbeddingClient;
use crate::error::StoreError;
use crate::models::{CachedAnswerRow, QuestionRow};

/// Minimum cosine similarity (1 − distance) for an approximate hit.
pub const SIMILARITY_THRESHOLD: f64 = 0.82;

/// Candidates fetched per approximate lookup.
pub const NEAREST_NEIGHBORS: i64 = 5;

pub struct CacheStore {
    pool: PgPool,
    embedder: Option<EmbeddingClient>,
}

impl CacheStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            embedder: None,
        }
    }

    /// Attach the embedding client. Without one the store runs in
    /// exact-match-only mode, which is fully supported.
    pub fn with_embedder(mut self, embedder: EmbeddingClient) -> Self {
        self.embedder = Some(embedder);
        self
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Exact lookup on `(normalized_content, type, normalized_options)`.
    /// Option presence matches bidirectionally: absent only matches
    /// absent.
    pub async fn find_question_exact(
        &self,
        query: &Query,
    ) -> Result<Option<QuestionRow>, StoreError> {
        let normalized_content = normalize_text(&query.content);
        let qtype = query.qtype.as_u8() as i16;

        let row = match normalize_options(query.options()) {
            Some(normalized) => {
                sqlx::query_as::<_, QuestionRow>(
                    r#"
                    SELECT id, content, type, options, normalized_options
                    FROM questions
                    WHERE normalized_content = $1 AND type = $2 AND normalized_options = $3
                    "#,
                )
                .bind(&normalized_content)
                .bind(qtype)
                .bind(Json(normalized))
                .fetch_optional(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, QuestionRow>(
                    r#"
                    SELECT id, content, type, options, normalized_options
                    FROM questions
                    WHERE normalized_content = $1 AND type = $2 AND normalized_options IS NULL
                    "#,
                )
                .bind(&normalized_content)
                .bind(qtype)
                .fetch_optional(&self.pool)
                .await?
            }
        };
        Ok(row)
    }

    /// Vector nearest-neighbor lookup: the K nearest same-type questions
    /// by cosine distance, accepting the first candidate above the
    /// similarity threshold whose option set matches the request.
    ///
    /// Skipped entirely when no embedding client is attached.
    pub async fn find_question_similar(
        &self,
        query: &Query,
    ) -> Result<Option<QuestionRow>, StoreError> {
        let Some(embedder) = &self.embedder else {
            return Ok(None);
        };

        let vector = embedder.embed_query(&query.content).await?;
        let literal = vector_literal(&vector);
        let qtype = query.qtype.as_u8() as i16;

        let candidates = sqlx::query_as::<_, SimilarRow>(
            r#"
            SELECT id, content, type, options, normalized_options,
                   1 - (embedding <=> $1::text::vector) AS similarity
            FROM questions
            WHERE type = $2 AND embedding IS NOT NULL
            ORDER BY embedding <=> $1::text::vector
            LIMIT $3
            "#,
        )
        .bind(&literal)
        .bind(qtype)
        .bind(NEAREST_NEIGHBORS)
        .fetch_all(&self.pool)
        .await?;

        let wanted = normalize_options(query.options());
        for candidate in candidates {
            if candidate.similarity < SIMILARITY_THRESHOLD {
                // Candidates arrive by ascending distance; the rest are
                // further away still.
                break;
            }
            if options_match(
                wanted.as_ref(),
                candidate.normalized_options.as_ref().map(|j| &j.0),
            ) {
                tracing::debug!(
                    question_id = candidate.id,
                    similarity = candidate.similarity,
                    "approximate cache hit"
                );
                return Ok(Some(QuestionRow {
                    id: candidate.id,
                    content: candidate.content,
                    qtype: candidate.qtype,
                    options: candidate.options,
                    normalized_options: candidate.normalized_options,
                }));
            }
        }
        Ok(None)
    }

    /// Exact first, approximate only on miss.
    pub async fn resolve_question(&self, query: &Query) -> Result<Option<QuestionRow>, StoreError> {
        if let Some(row) = self.find_question_exact(query).await? {
            return Ok(Some(row));
        }
        self.find_question_similar(query).await
    }

    /// Batch read: every requested provider's cached answer for one
    /// question in a single round-trip. Misses are explicit `None`s.
    pub async fn cached_answers_for(
        &self,
        question_id: i64,
        providers: &[String],
    ) -> Result<HashMap<String, Option<AnswerOutcome>>, StoreError> {
        let rows = sqlx::query_as::<_, CachedAnswerRow>(
            r#"
            SELECT qpa.provider_name, a.type, a.choice, a.judgement, a.text
            FROM question_provider_answers qpa
            JOIN answers a ON a.id = qpa.answer_id
            WHERE qpa.question_id = $1 AND qpa.provider_name = ANY($2)
            "#,
        )
        .bind(question_id)
        .bind(providers)
        .fetch_all(&self.pool)
        .await?;

        let mut answers: HashMap<String, Option<AnswerOutcome>> = providers
            .iter()
            .map(|name| (name.clone(), None))
            .collect();
        for row in rows {
            let name = row.provider_name.clone();
            match row.into_outcome() {
                Ok(outcome) => {
                    answers.insert(name, Some(outcome));
                }
                Err(error) => {
                    tracing::warn!(provider = %name, %error, "skipping corrupt cache row");
                }
            }
        }
        Ok(answers)
    }

    /// First cached answer for the question from any provider.
    pub async fn any_answer_for(
        &self,
        question_id: i64,
    ) -> Result<Option<AnswerOutcome>, StoreError> {
        let row = sqlx::query_as::<_, CachedAnswerRow>(
            r#"
            SELECT qpa.provider_name, a.type, a.choice, a.judgement, a.text
            FROM question_provider_answers qpa
            JOIN answers a ON a.id = qpa.answer_id
            WHERE qpa.question_id = $1
            ORDER BY qpa.id
            LIMIT 1
            "#,
        )
        .bind(question_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(CachedAnswerRow::into_outcome).transpose()
    }

    /// Write-through: upsert the question (embedding it on first sight),
    /// dedupe each answer by payload shape, and point the
    /// `(question, provider)` cell at it. Idempotent; last writer wins.
    pub async fn save_answers(
        &self,
        query: &Query,
        entries: &[(String, AnswerOutcome)],
    ) -> Result<(), StoreError> {
        if entries.is_empty() {
            return Ok(());
        }

        let question_id = self.upsert_question(query).await?;

        let mut tx = self.pool.begin().await?;
        for (provider, answer) in entries {
            let qtype = answer
                .qtype
                .unwrap_or(query.qtype)
                .as_u8() as i16;
            let choice = answer.choice.clone().map(Json);
            let text = answer.text.clone().map(Json);

            // Null-aware payload-shape key keeps one row per distinct
            // answer.
            let answer_id: Option<(i64,)> = sqlx::query_as(
                r#"
                SELECT id FROM answers
                WHERE type = $1
                  AND choice IS NOT DISTINCT FROM $2
                  AND judgement IS NOT DISTINCT FROM $3
                  AND text IS NOT DISTINCT FROM $4
                "#,
            )
            .bind(qtype)
            .bind(&choice)
            .bind(answer.judgement)
            .bind(&text)
            .fetch_optional(&mut *tx)
            .await?;

            let answer_id = match answer_id {
                Some((id,)) => id,
                None => {
                    let (id,): (i64,) = sqlx::query_as(
                        r#"
                        INSERT INTO answers (type, choice, judgement, text)
                        VALUES ($1, $2, $3, $4)
                        RETURNING id
                        "#,
                    )
                    .bind(qtype)
                    .bind(&choice)
                    .bind(answer.judgement)
                    .bind(&text)
                    .fetch_one(&mut *tx)
                    .await?;
                    id
                }
            };

            sqlx::query(
                r#"
                INSERT INTO question_provider_answers (question_id, provider_name, answer_id)
                VALUES ($1, $2, $3)
                ON CONFLICT (question_id, provider_name)
                DO UPDATE SET answer_id = EXCLUDED.answer_id, updated_at = now()
                "#,
            )
            .bind(question_id)
            .bind(provider)
            .bind(answer_id)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        tracing::debug!(question_id, entries = entries.len(), "write-through committed");
        Ok(())
    }

    async fn upsert_question(&self, query: &Query) -> Result<i64, StoreError> {
        if let Some(row) = self.find_question_exact(query).await? {
            return Ok(row.id);
        }

        // First sight of this question: compute its passage embedding.
        // An embedding failure only costs the vector, not the row.
        let embedding = match &self.embedder {
            Some(embedder) => match embedder.embed_passage(&query.content).await {
                Ok(vector) => Some(vector_literal(&vector)),
                Err(error) => {
                    tracing::warn!(%error, "storing question without embedding");
                    None
                }
            },
            None => None,
        };

        let normalized_content = normalize_text(&query.content);
        let normalized = normalize_options(query.options());
        let inserted: Option<(i64,)> = sqlx::query_as(
            r#"
            INSERT INTO questions (content, normalized_content, type, options, normalized_options, embedding)
            VALUES ($1, $2, $3, $4, $5, $6::text::vector)
            ON CONFLICT (normalized_content, type, COALESCE(normalized_options, 'null'::jsonb))
            DO NOTHING
            RETURNING id
            "#,
        )
        .bind(&query.content)
        .bind(&normalized_content)
        .bind(query.qtype.as_u8() as i16)
        .bind(query.options().map(|o| Json(o.to_vec())))
        .bind(normalized.map(Json))
        .bind(embedding)
        .fetch_optional(&self.pool)
        .await?;

        match inserted {
            Some((id,)) => Ok(id),
            // A concurrent write-through won the insert race; reuse its row.
            None => self
                .find_question_exact(query)
                .await?
                .map(|row| row.id)
                .ok_or_else(|| StoreError::InvalidRow("question vanished mid-upsert".to_string())),
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct SimilarRow {
    id: i64,
    content: String,
    #[sqlx(rename = "type")]
    qtype: i16,
    options: Option<Json<Vec<String>>>,
    normalized_options: Option<Json<Vec<String>>>,
    similarity: f64,
}

/// pgvector's text form: `[0.1,0.2,...]`.
fn vector_literal(vector: &[f32]) -> String {
    let mut literal = String::with_capacity(vector.len() * 10 + 2);
    literal.push('[');
    for (i, value) in vector.iter().enumerate() {
        if i > 0 {
            literal.push(',');
        }
        literal.push_str(&value.to_string());
    }
    literal.push(']');
    literal
}

/// Approximate-lookup option gate: both absent, or both present and
/// equal after normalization.
fn options_match(wanted: Option<&Vec<String>>, candidate: Option<&Vec<String>>) -> bool {
    match (wanted, candidate) {
        (None, None) => true,
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

#[async_trait]
impl AnswerCache for CacheStore {
    async fn cached_answers(
        &self,
        query: &Query,
        providers: &[String],
    ) -> HashMap<String, Option<AnswerOutcome>> {
        let all_misses = || {
            providers
                .iter()
                .map(|name| (name.clone(), None))
                .collect::<HashMap<_, _>>()
        };

        let question = match self.resolve_question(query).await {
            Ok(Some(question)) => question,
            Ok(None) => return all_misses(),
            Err(error) => {
                // A dead database degrades to "no cache"; fan-out proceeds.
                tracing::warn!(%error, "cache lookup degraded to all-miss");
                return all_misses();
            }
        };

        match self.cached_answers_for(question.id, providers).await {
            Ok(answers) => answers,
            Err(error) => {
                tracing::warn!(%error, "cache batch read degraded to all-miss");
                all_misses()
            }
        }
    }

    async fn any_cached_answer(&self, query: &Query) -> Option<AnswerOutcome> {
        let question = match self.resolve_question(query).await {
            Ok(question) => question?,
            Err(error) => {
                tracing::warn!(%error, "local cache lookup failed");
                return None;
            }
        };
        match self.any_answer_for(question.id).await {
            Ok(answer) => answer,
            Err(error) => {
                tracing::warn!(%error, "local cache read failed");
                None
            }
        }
    }

    async fn store_answers(
        &self,
        query: &Query,
        entries: &[(String, AnswerOutcome)],
    ) -> anyhow::Result<()> {
        self.save_answers(query, entries).await?;
        Ok(())
    }
}
