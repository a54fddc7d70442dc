//! Error types for `mucca-core`.

use thiserror::Error;
use uuid::Uuid;

/// A boxed backend error (store or fetcher) carried through core operations.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum Error {
  #[error("article not found: {0}")]
  ArticleNotFound(Uuid),

  #[error("article already exists: {0}")]
  ArticleExists(Uuid),

  #[error("invalid link {link:?}: {reason}")]
  InvalidLink { link: String, reason: String },

  #[error("clap value {claps} exceeds the maximum of {max}")]
  ClapsOutOfRange { claps: u64, max: u64 },

  /// Summing an article's clap records overflowed the counter range.
  #[error("aggregate counters overflow for article {0}")]
  AggregateOverflow(Uuid),

  /// The clap record was committed but the article counters were not
  /// updated. Clap records stay authoritative; reconciliation repairs the
  /// counters.
  #[error("clap recorded but aggregate update failed for article {article_id}: {source}")]
  AggregateUpdateFailed {
    article_id: Uuid,
    #[source]
    source:     BoxError,
  },

  #[error("metadata fetch failed for {link}: {source}")]
  FetchFailed {
    link:   String,
    #[source]
    source: BoxError,
  },

  #[error("malformed change event {sequence}: {reason}")]
  MalformedEvent { sequence: u64, reason: String },

  #[error("store error: {0}")]
  Store(#[source] BoxError),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

impl Error {
  /// Wrap a backend store error.
  pub fn store<E>(err: E) -> Self
  where
    E: std::error::Error + Send + Sync + 'static,
  {
    Error::Store(Box::new(err))
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
