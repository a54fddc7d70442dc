//! Enrichment processor: fills in title and tags of newly submitted articles
//! from change-feed events.
//!
//! The article's `enriched_at` timestamp is the only idempotency gate. An
//! event whose post-image already carries it is skipped without fetching, and
//! so is an event whose article has been enriched since the image was taken.
//! Redelivered events and events caused by the enrichment write itself are
//! therefore no-ops. Two concurrent deliveries for a never-enriched article
//! may both fetch; the store's conditional write keeps only the first result.

use std::{collections::BTreeSet, future::Future};

use chrono::{DateTime, Utc};
use serde::Serialize;
use url::Url;

use crate::{
  Error, Result,
  article::{Article, EnrichmentUpdate},
  event::{ChangeEvent, ChangeKind},
  store::EntityStore,
};

// ─── Metadata source ─────────────────────────────────────────────────────────

/// Metadata derived from an article's link.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata {
  pub title: String,
  pub tags:  BTreeSet<String>,
}

/// The external capability that turns a link into [`Metadata`].
pub trait MetadataFetcher: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  fn fetch<'a>(
    &'a self,
    link: &'a Url,
  ) -> impl Future<Output = Result<Metadata, Self::Error>> + Send + 'a;
}

// ─── Outcomes ────────────────────────────────────────────────────────────────

/// What [`EnrichmentProcessor::handle_event`] did with one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOutcome {
  /// Not an article event, or a removal.
  Ignored,
  /// The image already carried an enrichment timestamp.
  AlreadyEnriched,
  /// Metadata was fetched but the conditional write found the article
  /// already enriched (or gone).
  NotApplied,
  Enriched,
}

/// Per-batch counts reported to the invoker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
  pub enriched: usize,
  pub skipped:  usize,
  pub ignored:  usize,
  pub failed:   usize,
}

impl BatchReport {
  fn record(&mut self, outcome: EventOutcome) {
    match outcome {
      EventOutcome::Ignored => self.ignored += 1,
      EventOutcome::AlreadyEnriched | EventOutcome::NotApplied => self.skipped += 1,
      EventOutcome::Enriched => self.enriched += 1,
    }
  }
}

// ─── Processor ───────────────────────────────────────────────────────────────

/// Consumes change-feed batches and enriches un-enriched articles.
///
/// Holds no state between batches; `store` and `fetcher` are the only
/// collaborators.
#[derive(Debug, Clone)]
pub struct EnrichmentProcessor<S, F> {
  store:   S,
  fetcher: F,
}

impl<S, F> EnrichmentProcessor<S, F>
where
  S: EntityStore,
  F: MetadataFetcher,
{
  pub fn new(store: S, fetcher: F) -> Self { Self { store, fetcher } }

  pub fn store(&self) -> &S { &self.store }

  /// Process every event of a batch in order.
  ///
  /// Failures are logged per event and counted; they never abort the batch.
  /// All articles enriched by one call share the same `enriched_at`.
  pub async fn process_batch(&self, events: &[ChangeEvent]) -> BatchReport {
    let batch_time = Utc::now();
    let mut report = BatchReport::default();

    for event in events {
      match self.handle_event(event, batch_time).await {
        Ok(outcome) => report.record(outcome),
        Err(e) => {
          report.failed += 1;
          tracing::warn!(
            sequence = event.sequence,
            key = %event.key,
            error = %e,
            "failed to process change event"
          );
        }
      }
    }

    if !events.is_empty() {
      tracing::info!(
        events = events.len(),
        enriched = report.enriched,
        skipped = report.skipped,
        ignored = report.ignored,
        failed = report.failed,
        "enrichment batch processed"
      );
    }
    report
  }

  /// Handle a single event, stamping a successful enrichment with
  /// `batch_time`.
  pub async fn handle_event(
    &self,
    event: &ChangeEvent,
    batch_time: DateTime<Utc>,
  ) -> Result<EventOutcome> {
    if !event.key.is_article() || event.kind == ChangeKind::Remove {
      return Ok(EventOutcome::Ignored);
    }

    let image = event.new_image.as_ref().ok_or_else(|| Error::MalformedEvent {
      sequence: event.sequence,
      reason:   "missing new image".into(),
    })?;

    if image.get("enriched_at").is_some_and(|v| !v.is_null()) {
      tracing::debug!(key = %event.key, "article already enriched");
      return Ok(EventOutcome::AlreadyEnriched);
    }

    let article: Article =
      serde_json::from_value(image.clone()).map_err(|e| Error::MalformedEvent {
        sequence: event.sequence,
        reason:   e.to_string(),
      })?;

    // The image may predate an enrichment that already happened (redelivery,
    // or a clap update queued before the enrichment write).
    match self
      .store
      .get_article(article.article_id)
      .await
      .map_err(Error::store)?
    {
      Some(current) if current.is_enriched() => {
        tracing::debug!(key = %event.key, "article enriched since this event");
        return Ok(EventOutcome::AlreadyEnriched);
      }
      None => {
        tracing::debug!(key = %event.key, "article no longer exists");
        return Ok(EventOutcome::NotApplied);
      }
      Some(_) => {}
    }

    let metadata = self
      .fetcher
      .fetch(&article.link)
      .await
      .map_err(|e| Error::FetchFailed {
        link:   article.link.to_string(),
        source: Box::new(e),
      })?;

    let update = EnrichmentUpdate {
      title:       metadata.title,
      tags:        metadata.tags,
      enriched_at: batch_time,
    };
    let applied = self
      .store
      .apply_enrichment(article.article_id, update)
      .await
      .map_err(Error::store)?;

    if applied {
      tracing::info!(article_id = %article.article_id, link = %article.link, "article enriched");
      Ok(EventOutcome::Enriched)
    } else {
      tracing::debug!(
        article_id = %article.article_id,
        "enrichment not applied; article already enriched or missing"
      );
      Ok(EventOutcome::NotApplied)
    }
  }
}
