mod adapter;
mod aggregate;
mod cache;
mod client;
mod engine;
mod error;
mod matcher;
mod normalize;
mod registry;
mod retry;
mod schema;
mod types;

pub mod providers;

pub use adapter::{Adapter, AdapterDescriptor};
pub use aggregate::{construct_result, unify};
pub use cache::{AnswerCache, NullCache};
pub use client::{build_client, default_client, ClientSettings};
pub use engine::SearchEngine;
pub use error::{Error, Result};
pub use matcher::{
    build_choice_answer, build_choice_answer_from_keys, build_choice_answer_from_texts,
    match_score, normalize_for_match, MATCH_THRESHOLD,
};
pub use normalize::{normalize_options, normalize_text};
pub use registry::Registry;
pub use retry::{RetryPolicy, RetryStrategy};
pub use schema::{ConfigField, ConfigSchema, FieldKind};
pub use types::{
    AnswerOutcome, ErrorKind, ProviderChoice, Query, QuestionType, SearchResult, UnifiedAnswer,
    ANSWER_DELIMITER, MAX_OPTIONS,
};
