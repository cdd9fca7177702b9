use thiserror::Error;

use crate::embedding::EmbedError;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("embedding error: {0}")]
    Embedding(#[from] EmbedError),

    #[error("invalid cached row: {0}")]
    InvalidRow(String),
}
