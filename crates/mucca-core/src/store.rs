//! The `EntityStore` and `ChangeFeed` traits.
//!
//! Both are implemented by storage backends (e.g. `mucca-store-sqlite`).
//! Operations in this crate coordinate exclusively through the atomicity
//! guarantees documented on each method; no locks span multiple items.

use std::future::Future;

use uuid::Uuid;

use crate::{
  article::{AggregateDelta, Aggregates, Article, EnrichmentUpdate},
  clap::ClapRecord,
  event::ChangeEvent,
};

// ─── Entity store ────────────────────────────────────────────────────────────

/// Abstraction over the single shared entity table.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes (e.g. tokio with `axum`).
pub trait EntityStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Articles ──────────────────────────────────────────────────────────

  /// Insert a new article row. Errors if the id is already taken.
  fn create_article(
    &self,
    article: Article,
  ) -> impl Future<Output = Result<Article, Self::Error>> + Send + '_;

  /// Retrieve an article by id. Returns `None` if not found.
  fn get_article(
    &self,
    article_id: Uuid,
  ) -> impl Future<Output = Result<Option<Article>, Self::Error>> + Send + '_;

  /// List articles, newest first.
  fn list_articles(
    &self,
    limit: Option<usize>,
  ) -> impl Future<Output = Result<Vec<Article>, Self::Error>> + Send + '_;

  /// Add `delta` to the article's counters as one indivisible
  /// read-add-write. Concurrent increments must all be reflected.
  ///
  /// Errors if the article does not exist, or if the sum would leave the
  /// backend's counter range; the counters are left untouched in that case.
  fn increment_aggregates(
    &self,
    article_id: Uuid,
    delta: AggregateDelta,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Overwrite the article's counters. Only used by reconciliation.
  fn set_aggregates(
    &self,
    article_id: Uuid,
    aggregates: Aggregates,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Write title, tags and enrichment timestamp, provided the article is
  /// still un-enriched. Returns `false` if the write was not applied because
  /// the article is missing or was enriched in the meantime.
  fn apply_enrichment(
    &self,
    article_id: Uuid,
    update: EnrichmentUpdate,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  // ── Clap records ──────────────────────────────────────────────────────

  /// Replace the clap record for `(record.article_id, record.user)` and
  /// return the record it replaced, as one indivisible step.
  fn put_clap(
    &self,
    record: ClapRecord,
  ) -> impl Future<Output = Result<Option<ClapRecord>, Self::Error>> + Send + '_;

  /// All clap records of an article.
  fn list_claps(
    &self,
    article_id: Uuid,
  ) -> impl Future<Output = Result<Vec<ClapRecord>, Self::Error>> + Send + '_;
}

// ─── Change feed ─────────────────────────────────────────────────────────────

/// An ordered, at-least-once stream of item mutations.
///
/// The feed itself is stateless; consumers keep their own cursor and may
/// replay from any earlier position.
pub trait ChangeFeed: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Up to `limit` events with a sequence number strictly greater than
  /// `after`, in sequence order.
  fn read_changes(
    &self,
    after: u64,
    limit: usize,
  ) -> impl Future<Output = Result<Vec<ChangeEvent>, Self::Error>> + Send + '_;
}
