//! Error type for `parish-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] parish_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  /// Document bodies are JSON objects; anything else is refused.
  #[error("document body for {collection} must be a JSON object")]
  NotAnObject { collection: &'static str },

  #[error("object not found: {0}")]
  BlobNotFound(String),

  #[error("password hashing failed: {0}")]
  PasswordHash(String),

  #[error("background task failed: {0}")]
  Join(#[from] tokio::task::JoinError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
