//! Error type for `scroll-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] scroll_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("sqlite error: {0}")]
  Sqlite(#[from] rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  /// A column held a value that cannot be decoded.
  #[error("invalid column value: {0}")]
  InvalidColumn(String),

  #[error("record not found: {0}")]
  RecordNotFound(uuid::Uuid),

  #[error("record id already taken: {0}")]
  DuplicateId(uuid::Uuid),
}

impl Error {
  /// Whether the record was rejected before anything was written.
  pub fn is_validation(&self) -> bool {
    matches!(self, Self::Core(e) if e.is_validation())
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
