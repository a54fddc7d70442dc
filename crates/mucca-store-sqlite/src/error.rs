//! Error type for `mucca-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("url parse error: {0}")]
  Url(#[from] url::ParseError),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  /// A stored value that does not fit the domain type (unknown change kind,
  /// negative counter, ...).
  #[error("invalid stored value: {0}")]
  Decode(String),

  #[error("count out of range: {0}")]
  CountOverflow(u64),

  /// Applying an increment would push an article counter out of the
  /// `INTEGER` range; the counters were left untouched.
  #[error("aggregate counters of article {0} would overflow")]
  CounterOverflow(uuid::Uuid),

  #[error("article not found: {0}")]
  ArticleNotFound(uuid::Uuid),

  #[error("article already exists: {0}")]
  ArticleExists(uuid::Uuid),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
