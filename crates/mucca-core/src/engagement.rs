//! Engagement aggregation: per-user clap records folded into article
//! counters.
//!
//! A submission stores the user's *absolute* clap value, obtains the value it
//! replaced in the same store operation, and applies the difference to the
//! article counters with an atomic increment. Resubmitting a value is a
//! no-op for the counters; submitting `0` withdraws the user's claps.
//!
//! The record write and the counter increment are two separate store
//! operations. If the second one fails the counters drift from the records
//! until [`reconcile_article`] recomputes them.

use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

use crate::{
  Error, Result,
  article::{AggregateDelta, Aggregates},
  clap::ClapRecord,
  store::EntityStore,
};

/// Largest clap value a single user may hold on one article.
///
/// Keeps every article counter far inside the store's signed 64-bit range.
pub const MAX_CLAPS_PER_USER: u64 = 1_000_000;

// ─── Delta rule ──────────────────────────────────────────────────────────────

/// Counter change produced by replacing `previous` with `new_claps`.
///
/// A user counts as a clapper exactly while their current value is positive:
/// going from nothing (or zero) to a positive value adds one, going from a
/// positive value to zero removes one, anything else leaves the count alone.
pub fn compute_delta(previous: Option<u64>, new_claps: u64) -> AggregateDelta {
  let old = previous.unwrap_or(0);
  let clappers = match (old > 0, new_claps > 0) {
    (false, true) => 1,
    (true, false) => -1,
    _ => 0,
  };
  AggregateDelta { claps: signed(new_claps) - signed(old), clappers }
}

fn signed(v: u64) -> i64 { i64::try_from(v).unwrap_or(i64::MAX) }

// ─── Submission ──────────────────────────────────────────────────────────────

/// What a clap submission recorded, for response shaping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClapOutcome {
  pub article_id:     Uuid,
  pub user:           String,
  pub recorded_claps: u64,
  /// Clap value replaced by this submission, `None` for a first record.
  pub previous_claps: Option<u64>,
  pub delta:          AggregateDelta,
}

impl ClapOutcome {
  pub fn is_first_record(&self) -> bool { self.previous_claps.is_none() }
}

/// Record `new_claps` as `user`'s current clap value on `article_id` and fold
/// the difference into the article counters.
///
/// Fails with [`Error::ClapsOutOfRange`] if `new_claps` exceeds
/// [`MAX_CLAPS_PER_USER`] and with [`Error::ArticleNotFound`] if the article
/// is missing; nothing is written in either case. Fails with [`Error::AggregateUpdateFailed`] if the record was
/// written but the counters could not be incremented.
pub async fn submit_clap<S>(
  store: &S,
  article_id: Uuid,
  user: &str,
  new_claps: u64,
) -> Result<ClapOutcome>
where
  S: EntityStore,
{
  if new_claps > MAX_CLAPS_PER_USER {
    return Err(Error::ClapsOutOfRange { claps: new_claps, max: MAX_CLAPS_PER_USER });
  }
  if store.get_article(article_id).await.map_err(Error::store)?.is_none() {
    return Err(Error::ArticleNotFound(article_id));
  }

  let record = ClapRecord {
    article_id,
    user: user.to_owned(),
    claps: new_claps,
    updated_at: Utc::now(),
  };
  let previous = store.put_clap(record).await.map_err(Error::store)?;
  let previous_claps = previous.map(|r| r.claps);
  let delta = compute_delta(previous_claps, new_claps);

  if !delta.is_zero() {
    store
      .increment_aggregates(article_id, delta)
      .await
      .map_err(|e| {
        tracing::warn!(
          %article_id,
          user,
          delta_claps = delta.claps,
          delta_clappers = delta.clappers,
          error = %e,
          "clap recorded but aggregate increment failed"
        );
        Error::AggregateUpdateFailed { article_id, source: Box::new(e) }
      })?;
  }

  tracing::info!(
    %article_id,
    user,
    claps = new_claps,
    delta_claps = delta.claps,
    delta_clappers = delta.clappers,
    "claps recorded"
  );

  Ok(ClapOutcome {
    article_id,
    user: user.to_owned(),
    recorded_claps: new_claps,
    previous_claps,
    delta,
  })
}

// ─── Reconciliation ──────────────────────────────────────────────────────────

/// Counters of one article before and after reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Reconciliation {
  pub article_id: Uuid,
  pub before:     Aggregates,
  pub after:      Aggregates,
}

impl Reconciliation {
  pub fn drifted(&self) -> bool { self.before != self.after }
}

/// Summary of a [`reconcile_all`] pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
  pub articles: usize,
  pub drifted:  usize,
}

/// Aggregates implied by a set of clap records, `None` if the claps sum
/// overflows.
pub fn aggregates_from_records(records: &[ClapRecord]) -> Option<Aggregates> {
  records.iter().try_fold(Aggregates::default(), |acc, r| {
    Some(Aggregates {
      claps:    acc.claps.checked_add(r.claps)?,
      clappers: acc.clappers + u64::from(r.claps > 0),
    })
  })
}

/// Recompute an article's counters from its clap records and overwrite them
/// when they differ.
///
/// Meant to run while no submissions for the article are in flight; an
/// increment landing between the read and the overwrite would be lost.
pub async fn reconcile_article<S>(store: &S, article_id: Uuid) -> Result<Reconciliation>
where
  S: EntityStore,
{
  let article = store
    .get_article(article_id)
    .await
    .map_err(Error::store)?
    .ok_or(Error::ArticleNotFound(article_id))?;

  let records = store.list_claps(article_id).await.map_err(Error::store)?;
  let after =
    aggregates_from_records(&records).ok_or(Error::AggregateOverflow(article_id))?;
  let outcome = Reconciliation { article_id, before: article.aggregates(), after };

  if outcome.drifted() {
    store
      .set_aggregates(article_id, outcome.after)
      .await
      .map_err(Error::store)?;
    tracing::warn!(
      %article_id,
      before_claps = outcome.before.claps,
      before_clappers = outcome.before.clappers,
      after_claps = outcome.after.claps,
      after_clappers = outcome.after.clappers,
      "aggregates repaired"
    );
  }

  Ok(outcome)
}

/// Reconcile every article in the store.
pub async fn reconcile_all<S>(store: &S) -> Result<ReconcileReport>
where
  S: EntityStore,
{
  let articles = store.list_articles(None).await.map_err(Error::store)?;
  let mut report = ReconcileReport::default();

  for article in articles {
    let outcome = reconcile_article(store, article.article_id).await?;
    report.articles += 1;
    if outcome.drifted() {
      report.drifted += 1;
    }
  }

  tracing::info!(articles = report.articles, drifted = report.drifted, "reconciliation finished");
  Ok(report)
}
