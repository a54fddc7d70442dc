//! Change-feed polling loop that drives the enrichment processor.

use std::time::Duration;

use mucca_core::{
  enrichment::{BatchReport, EnrichmentProcessor, MetadataFetcher},
  store::{ChangeFeed, EntityStore},
};
use tokio::sync::watch;

/// Reads the change feed in batches and hands each batch to an
/// [`EnrichmentProcessor`].
///
/// The cursor lives only in memory. A fresh worker replays the feed from the
/// beginning, which is harmless because enrichment is idempotent.
pub struct EnrichmentWorker<S, F> {
  processor:     EnrichmentProcessor<S, F>,
  batch_size:    usize,
  poll_interval: Duration,
  cursor:        u64,
}

impl<S, F> EnrichmentWorker<S, F>
where
  S: EntityStore + ChangeFeed,
  F: MetadataFetcher,
{
  pub fn new(store: S, fetcher: F, batch_size: usize, poll_interval: Duration) -> Self {
    Self {
      processor: EnrichmentProcessor::new(store, fetcher),
      batch_size: batch_size.max(1),
      poll_interval,
      cursor: 0,
    }
  }

  /// Start after `sequence` instead of replaying the whole feed.
  pub fn with_cursor(mut self, sequence: u64) -> Self {
    self.cursor = sequence;
    self
  }

  pub fn cursor(&self) -> u64 { self.cursor }

  /// Process the next batch, if any. The cursor moves past the batch even
  /// when individual events failed; those are logged by the processor.
  pub async fn poll_once(&mut self) -> Result<Option<BatchReport>, <S as ChangeFeed>::Error> {
    let events = self
      .processor
      .store()
      .read_changes(self.cursor, self.batch_size)
      .await?;
    let Some(last) = events.last() else { return Ok(None) };
    let next_cursor = last.sequence;

    let report = self.processor.process_batch(&events).await;
    self.cursor = next_cursor;
    Ok(Some(report))
  }

  /// Poll until the feed is drained, summing the batch reports.
  pub async fn drain(&mut self) -> Result<BatchReport, <S as ChangeFeed>::Error> {
    let mut total = BatchReport::default();
    while let Some(report) = self.poll_once().await? {
      total.enriched += report.enriched;
      total.skipped += report.skipped;
      total.ignored += report.ignored;
      total.failed += report.failed;
    }
    Ok(total)
  }

  /// Poll forever, sleeping `poll_interval` whenever the feed is drained or
  /// unreadable, until `shutdown` flips to `true`.
  pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
    tracing::info!(cursor = self.cursor, "enrichment worker started");

    while !*shutdown.borrow() {
      let idle = match self.poll_once().await {
        Ok(Some(_)) => false,
        Ok(None) => true,
        Err(e) => {
          tracing::warn!(error = %e, cursor = self.cursor, "failed to read change feed");
          true
        }
      };

      if idle {
        tokio::select! {
          changed = shutdown.changed() => {
            if changed.is_err() {
              break;
            }
          }
          () = tokio::time::sleep(self.poll_interval) => {}
        }
      }
    }

    tracing::info!(cursor = self.cursor, "enrichment worker stopped");
  }
}
