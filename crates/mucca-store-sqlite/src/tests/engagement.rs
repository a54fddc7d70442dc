//! Clap submission and reconciliation against the SQLite store.

use mucca_core::{
  Error as CoreError,
  article::{AggregateDelta, Aggregates, Article, EnrichmentUpdate},
  clap::ClapRecord,
  engagement::{
    MAX_CLAPS_PER_USER, aggregates_from_records, reconcile_all, reconcile_article,
    submit_clap,
  },
  store::EntityStore,
};
use tokio::task::JoinSet;
use uuid::Uuid;

use super::{article, store};
use crate::{Error, Result, SqliteStore};

/// Delegates to the SQLite store but fails every counter increment, as if
/// the connection dropped between the record write and the increment.
struct FailingIncrements(SqliteStore);

impl EntityStore for FailingIncrements {
  type Error = Error;

  async fn create_article(&self, article: Article) -> Result<Article> {
    self.0.create_article(article).await
  }

  async fn get_article(&self, article_id: Uuid) -> Result<Option<Article>> {
    self.0.get_article(article_id).await
  }

  async fn list_articles(&self, limit: Option<usize>) -> Result<Vec<Article>> {
    self.0.list_articles(limit).await
  }

  async fn increment_aggregates(&self, _article_id: Uuid, _delta: AggregateDelta) -> Result<()> {
    Err(Error::Database(tokio_rusqlite::Error::ConnectionClosed))
  }

  async fn set_aggregates(&self, article_id: Uuid, aggregates: Aggregates) -> Result<()> {
    self.0.set_aggregates(article_id, aggregates).await
  }

  async fn apply_enrichment(&self, article_id: Uuid, update: EnrichmentUpdate) -> Result<bool> {
    self.0.apply_enrichment(article_id, update).await
  }

  async fn put_clap(&self, record: ClapRecord) -> Result<Option<ClapRecord>> {
    self.0.put_clap(record).await
  }

  async fn list_claps(&self, article_id: Uuid) -> Result<Vec<ClapRecord>> {
    self.0.list_claps(article_id).await
  }
}

async fn aggregates(s: &SqliteStore, id: Uuid) -> Aggregates {
  s.get_article(id).await.unwrap().unwrap().aggregates()
}

/// Counters must equal what the clap records imply.
async fn assert_consistent(s: &SqliteStore, id: Uuid) {
  let records = s.list_claps(id).await.unwrap();
  assert_eq!(Some(aggregates(s, id).await), aggregates_from_records(&records));
}

#[tokio::test]
async fn first_clap_counts_claps_and_clapper() {
  let s = store().await;
  let a = article(&s, "https://example.com").await;

  let outcome = submit_clap(&s, a.article_id, "ada", 3).await.unwrap();
  assert!(outcome.is_first_record());
  assert_eq!(outcome.recorded_claps, 3);
  assert_eq!(outcome.delta, AggregateDelta { claps: 3, clappers: 1 });
  assert_eq!(aggregates(&s, a.article_id).await, Aggregates { claps: 3, clappers: 1 });
}

#[tokio::test]
async fn first_zero_clap_records_but_counts_nothing() {
  let s = store().await;
  let a = article(&s, "https://example.com").await;

  let outcome = submit_clap(&s, a.article_id, "ada", 0).await.unwrap();
  assert_eq!(outcome.delta, AggregateDelta { claps: 0, clappers: 0 });
  assert_eq!(s.list_claps(a.article_id).await.unwrap().len(), 1);
  assert_eq!(aggregates(&s, a.article_id).await, Aggregates::default());
}

#[tokio::test]
async fn resubmission_is_idempotent() {
  let s = store().await;
  let a = article(&s, "https://example.com").await;

  submit_clap(&s, a.article_id, "ada", 4).await.unwrap();
  let again = submit_clap(&s, a.article_id, "ada", 4).await.unwrap();

  assert!(!again.is_first_record());
  assert_eq!(again.previous_claps, Some(4));
  assert_eq!(again.delta, AggregateDelta { claps: 0, clappers: 0 });
  assert_eq!(aggregates(&s, a.article_id).await, Aggregates { claps: 4, clappers: 1 });
}

#[tokio::test]
async fn retraction_removes_claps_and_clapper() {
  let s = store().await;
  let a = article(&s, "https://example.com").await;

  submit_clap(&s, a.article_id, "ada", 5).await.unwrap();
  let outcome = submit_clap(&s, a.article_id, "ada", 0).await.unwrap();

  assert_eq!(outcome.delta, AggregateDelta { claps: -5, clappers: -1 });
  assert_eq!(aggregates(&s, a.article_id).await, Aggregates::default());
}

#[tokio::test]
async fn last_write_wins_per_user() {
  let s = store().await;
  let a = article(&s, "https://example.com").await;

  for claps in [1, 9, 4, 0, 2, 6] {
    submit_clap(&s, a.article_id, "ada", claps).await.unwrap();
  }

  assert_eq!(aggregates(&s, a.article_id).await, Aggregates { claps: 6, clappers: 1 });
  assert_consistent(&s, a.article_id).await;
}

#[tokio::test]
async fn several_users_sum_up() {
  let s = store().await;
  let a = article(&s, "https://example.com").await;

  submit_clap(&s, a.article_id, "ada", 3).await.unwrap();
  submit_clap(&s, a.article_id, "bob", 2).await.unwrap();
  submit_clap(&s, a.article_id, "cy", 0).await.unwrap();
  submit_clap(&s, a.article_id, "bob", 5).await.unwrap();

  assert_eq!(aggregates(&s, a.article_id).await, Aggregates { claps: 8, clappers: 2 });
  assert_consistent(&s, a.article_id).await;
}

#[tokio::test]
async fn missing_article_writes_nothing() {
  let s = store().await;
  let id = Uuid::new_v4();

  let err = submit_clap(&s, id, "ada", 3).await.unwrap_err();
  assert!(matches!(err, CoreError::ArticleNotFound(missing) if missing == id));
  assert!(s.list_claps(id).await.unwrap().is_empty());
}

#[tokio::test]
async fn claps_above_maximum_are_rejected_before_writing() {
  let s = store().await;
  let a = article(&s, "https://example.com").await;

  let err = submit_clap(&s, a.article_id, "ada", MAX_CLAPS_PER_USER + 1)
    .await
    .unwrap_err();
  assert!(matches!(err, CoreError::ClapsOutOfRange { .. }));
  let err = submit_clap(&s, a.article_id, "bob", u64::MAX).await.unwrap_err();
  assert!(matches!(err, CoreError::ClapsOutOfRange { .. }));

  assert!(s.list_claps(a.article_id).await.unwrap().is_empty());
  assert_eq!(aggregates(&s, a.article_id).await, Aggregates::default());
}

#[tokio::test]
async fn large_submissions_from_many_users_stay_readable() {
  let s = store().await;
  let a = article(&s, "https://example.com").await;

  submit_clap(&s, a.article_id, "ada", MAX_CLAPS_PER_USER).await.unwrap();
  submit_clap(&s, a.article_id, "bob", MAX_CLAPS_PER_USER).await.unwrap();

  assert_eq!(
    aggregates(&s, a.article_id).await,
    Aggregates { claps: 2 * MAX_CLAPS_PER_USER, clappers: 2 }
  );
  assert_eq!(s.list_articles(None).await.unwrap().len(), 1);
  assert!(!reconcile_article(&s, a.article_id).await.unwrap().drifted());
}

#[tokio::test]
async fn failed_increment_keeps_record_and_reconcile_repairs() {
  let s = store().await;
  let a = article(&s, "https://example.com").await;
  submit_clap(&s, a.article_id, "ada", 2).await.unwrap();

  let failing = FailingIncrements(s.clone());
  let err = submit_clap(&failing, a.article_id, "bob", 5).await.unwrap_err();
  assert!(
    matches!(err, CoreError::AggregateUpdateFailed { article_id, .. } if article_id == a.article_id)
  );

  // The record is committed; the counters lag behind it.
  let records = s.list_claps(a.article_id).await.unwrap();
  assert_eq!(records.len(), 2);
  assert!(records.iter().any(|r| r.user == "bob" && r.claps == 5));
  assert_eq!(aggregates(&s, a.article_id).await, Aggregates { claps: 2, clappers: 1 });

  let outcome = reconcile_article(&s, a.article_id).await.unwrap();
  assert!(outcome.drifted());
  assert_eq!(outcome.after, Aggregates { claps: 7, clappers: 2 });
  assert_consistent(&s, a.article_id).await;
}

#[tokio::test]
async fn neutral_resubmission_skips_the_increment() {
  let s = store().await;
  let a = article(&s, "https://example.com").await;
  submit_clap(&s, a.article_id, "ada", 4).await.unwrap();

  let failing = FailingIncrements(s.clone());
  let outcome = submit_clap(&failing, a.article_id, "ada", 4).await.unwrap();
  assert!(outcome.delta.is_zero());
  assert_consistent(&s, a.article_id).await;
}

#[tokio::test]
async fn concurrent_users_lose_no_delta() {
  let s = store().await;
  let a = article(&s, "https://example.com").await;

  let mut set = JoinSet::new();
  for i in 0..20u64 {
    let s = s.clone();
    let id = a.article_id;
    set.spawn(async move { submit_clap(&s, id, &format!("user-{i}"), i % 4).await });
  }
  while let Some(res) = set.join_next().await {
    res.unwrap().unwrap();
  }

  // 0+1+2+3 repeated five times; the five zero submissions are not clappers.
  assert_eq!(aggregates(&s, a.article_id).await, Aggregates { claps: 30, clappers: 15 });
  assert_consistent(&s, a.article_id).await;
}

#[tokio::test]
async fn concurrent_same_user_stays_consistent() {
  let s = store().await;
  let a = article(&s, "https://example.com").await;

  let mut set = JoinSet::new();
  for claps in [3u64, 0, 7, 2, 0, 5, 1] {
    let s = s.clone();
    let id = a.article_id;
    set.spawn(async move { submit_clap(&s, id, "ada", claps).await });
  }
  while let Some(res) = set.join_next().await {
    res.unwrap().unwrap();
  }

  assert_consistent(&s, a.article_id).await;
}

// ─── Reconciliation ──────────────────────────────────────────────────────────

#[tokio::test]
async fn reconcile_repairs_drift() {
  let s = store().await;
  let a = article(&s, "https://example.com").await;
  submit_clap(&s, a.article_id, "ada", 3).await.unwrap();
  submit_clap(&s, a.article_id, "bob", 4).await.unwrap();

  // Simulate an increment that never landed.
  s.set_aggregates(a.article_id, Aggregates { claps: 3, clappers: 1 })
    .await
    .unwrap();

  let outcome = reconcile_article(&s, a.article_id).await.unwrap();
  assert!(outcome.drifted());
  assert_eq!(outcome.before, Aggregates { claps: 3, clappers: 1 });
  assert_eq!(outcome.after, Aggregates { claps: 7, clappers: 2 });
  assert_eq!(aggregates(&s, a.article_id).await, outcome.after);
}

#[tokio::test]
async fn reconcile_consistent_article_is_noop() {
  let s = store().await;
  let a = article(&s, "https://example.com").await;
  submit_clap(&s, a.article_id, "ada", 2).await.unwrap();

  let outcome = reconcile_article(&s, a.article_id).await.unwrap();
  assert!(!outcome.drifted());
}

#[tokio::test]
async fn reconcile_all_counts_drifted_articles() {
  let s = store().await;
  let a = article(&s, "https://example.com/a").await;
  let b = article(&s, "https://example.com/b").await;
  submit_clap(&s, a.article_id, "ada", 2).await.unwrap();
  submit_clap(&s, b.article_id, "ada", 2).await.unwrap();
  s.set_aggregates(b.article_id, Aggregates { claps: 99, clappers: 9 })
    .await
    .unwrap();

  let report = reconcile_all(&s).await.unwrap();
  assert_eq!(report.articles, 2);
  assert_eq!(report.drifted, 1);
  assert_consistent(&s, b.article_id).await;
}

#[tokio::test]
async fn reconcile_missing_article_fails() {
  let s = store().await;
  let err = reconcile_article(&s, Uuid::new_v4()).await.unwrap_err();
  assert!(matches!(err, CoreError::ArticleNotFound(_)));
}
