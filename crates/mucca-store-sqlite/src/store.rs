//! [`SqliteStore`], the SQLite implementation of [`EntityStore`] and
//! [`ChangeFeed`].

use std::path::Path;

use chrono::Utc;
use mucca_core::{
  article::{AggregateDelta, Aggregates, Article, EnrichmentUpdate},
  clap::ClapRecord,
  event::{ChangeEvent, ChangeKind},
  key::{ARTICLE_SK, ItemKey},
  store::{ChangeFeed, EntityStore},
};
use rusqlite::{OptionalExtension as _, Transaction, TransactionBehavior};
use uuid::Uuid;

use crate::{
  Error, Result,
  encode::{
    ARTICLE_COLUMNS, RawArticle, RawChange, RawClap, encode_count, encode_dt,
    encode_tags, encode_uuid,
  },
  schema::{ARTICLE_IMAGE, CLAP_IMAGE, SCHEMA},
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// The Mucca entity table and change feed backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl std::fmt::Debug for SqliteStore {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("SqliteStore").finish_non_exhaustive()
  }
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store for tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Sequence number of the newest change, `0` for an empty feed.
  pub async fn latest_sequence(&self) -> Result<u64> {
    let seq: i64 = self
      .conn
      .call(|conn| {
        Ok(conn.query_row("SELECT coalesce(max(sequence), 0) FROM changes", [], |r| {
          r.get(0)
        })?)
      })
      .await?;
    crate::encode::decode_count(seq)
  }
}

/// Result of a guarded counter increment.
enum Increment {
  Applied,
  Missing,
  Overflow,
}

/// Inclusive bounds on a counter's current value such that adding `delta`
/// cannot leave the `i64` range.
fn headroom(delta: i64) -> (i64, i64) {
  if delta >= 0 { (i64::MIN, i64::MAX - delta) } else { (i64::MIN - delta, i64::MAX) }
}

/// Append the current image of `(pk, sk)` to the change log.
fn log_change(
  tx: &Transaction<'_>,
  kind: ChangeKind,
  key: &ItemKey,
  image: &str,
  at: &str,
) -> rusqlite::Result<()> {
  tx.execute(
    &format!(
      "INSERT INTO changes (kind, pk, sk, new_image, recorded_at)
       SELECT ?1, pk, sk, {image}, ?2 FROM items WHERE pk = ?3 AND sk = ?4"
    ),
    rusqlite::params![kind.as_str(), at, key.pk, key.sk],
  )?;
  Ok(())
}

// ─── EntityStore impl ────────────────────────────────────────────────────────

impl EntityStore for SqliteStore {
  type Error = Error;

  // ── Articles ──────────────────────────────────────────────────────────────

  async fn create_article(&self, article: Article) -> Result<Article> {
    let key          = ItemKey::article(article.article_id);
    let link         = article.link.to_string();
    let title        = article.title.clone();
    let referrer     = article.referrer.clone();
    let domain       = article.domain.clone();
    let tags_str     = encode_tags(&article.tags)?;
    let enriched_str = article.enriched_at.map(encode_dt);
    let claps        = encode_count(article.claps)?;
    let clappers     = encode_count(article.clappers)?;
    let created_str  = encode_dt(article.created_at);

    let inserted = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let n = tx.execute(
          "INSERT INTO items (
             pk, sk, link, title, referrer, domain, tags,
             enriched_at, claps, clappers, created_at, updated_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11)
           ON CONFLICT (pk, sk) DO NOTHING",
          rusqlite::params![
            key.pk,
            key.sk,
            link,
            title,
            referrer,
            domain,
            tags_str,
            enriched_str,
            claps,
            clappers,
            created_str,
          ],
        )?;
        if n == 0 {
          return Ok(false);
        }
        log_change(&tx, ChangeKind::Insert, &key, ARTICLE_IMAGE, &created_str)?;
        tx.commit()?;
        Ok(true)
      })
      .await?;

    if !inserted {
      return Err(Error::ArticleExists(article.article_id));
    }
    Ok(article)
  }

  async fn get_article(&self, article_id: Uuid) -> Result<Option<Article>> {
    let id_str = encode_uuid(article_id);

    let raw: Option<RawArticle> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!("SELECT {ARTICLE_COLUMNS} FROM items WHERE pk = ?1 AND sk = ?2"),
              rusqlite::params![id_str, ARTICLE_SK],
              RawArticle::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawArticle::into_article).transpose()
  }

  async fn list_articles(&self, limit: Option<usize>) -> Result<Vec<Article>> {
    // SQLite treats a negative LIMIT as "no limit".
    let limit_val = limit.map_or(-1, |l| i64::try_from(l).unwrap_or(i64::MAX));

    let raws: Vec<RawArticle> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {ARTICLE_COLUMNS} FROM items
           WHERE sk = ?1
           ORDER BY created_at DESC, rowid DESC
           LIMIT ?2"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![ARTICLE_SK, limit_val], RawArticle::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawArticle::into_article).collect()
  }

  async fn increment_aggregates(
    &self,
    article_id: Uuid,
    delta:      AggregateDelta,
  ) -> Result<()> {
    let key    = ItemKey::article(article_id);
    let at_str = encode_dt(Utc::now());
    // Range of current `claps` values for which `claps + delta` stays an
    // INTEGER. SQLite silently turns an overflowing sum into a REAL.
    let (claps_lo, claps_hi) = headroom(delta.claps);
    let (clappers_lo, clappers_hi) = headroom(delta.clappers);

    let outcome = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let n = tx.execute(
          "UPDATE items
           SET claps = claps + ?3, clappers = clappers + ?4, updated_at = ?5
           WHERE pk = ?1 AND sk = ?2
             AND claps BETWEEN ?6 AND ?7
             AND clappers BETWEEN ?8 AND ?9",
          rusqlite::params![
            key.pk,
            key.sk,
            delta.claps,
            delta.clappers,
            at_str,
            claps_lo,
            claps_hi,
            clappers_lo,
            clappers_hi,
          ],
        )?;
        if n == 0 {
          let exists = tx
            .query_row(
              "SELECT 1 FROM items WHERE pk = ?1 AND sk = ?2",
              rusqlite::params![key.pk, key.sk],
              |_| Ok(()),
            )
            .optional()?
            .is_some();
          return Ok(if exists { Increment::Overflow } else { Increment::Missing });
        }
        log_change(&tx, ChangeKind::Modify, &key, ARTICLE_IMAGE, &at_str)?;
        tx.commit()?;
        Ok(Increment::Applied)
      })
      .await?;

    match outcome {
      Increment::Applied => Ok(()),
      Increment::Missing => Err(Error::ArticleNotFound(article_id)),
      Increment::Overflow => Err(Error::CounterOverflow(article_id)),
    }
  }

  async fn set_aggregates(&self, article_id: Uuid, aggregates: Aggregates) -> Result<()> {
    let key      = ItemKey::article(article_id);
    let claps    = encode_count(aggregates.claps)?;
    let clappers = encode_count(aggregates.clappers)?;
    let at_str   = encode_dt(Utc::now());

    let updated = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let n = tx.execute(
          "UPDATE items SET claps = ?3, clappers = ?4, updated_at = ?5
           WHERE pk = ?1 AND sk = ?2",
          rusqlite::params![key.pk, key.sk, claps, clappers, at_str],
        )?;
        if n == 0 {
          return Ok(false);
        }
        log_change(&tx, ChangeKind::Modify, &key, ARTICLE_IMAGE, &at_str)?;
        tx.commit()?;
        Ok(true)
      })
      .await?;

    if !updated {
      return Err(Error::ArticleNotFound(article_id));
    }
    Ok(())
  }

  async fn apply_enrichment(&self, article_id: Uuid, update: EnrichmentUpdate) -> Result<bool> {
    let key          = ItemKey::article(article_id);
    let tags_str     = encode_tags(&update.tags)?;
    let enriched_str = encode_dt(update.enriched_at);
    let title        = update.title;

    let applied = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let n = tx.execute(
          "UPDATE items
           SET title = ?3, tags = ?4, enriched_at = ?5, updated_at = ?5
           WHERE pk = ?1 AND sk = ?2 AND enriched_at IS NULL",
          rusqlite::params![key.pk, key.sk, title, tags_str, enriched_str],
        )?;
        if n == 0 {
          return Ok(false);
        }
        log_change(&tx, ChangeKind::Modify, &key, ARTICLE_IMAGE, &enriched_str)?;
        tx.commit()?;
        Ok(true)
      })
      .await?;

    Ok(applied)
  }

  // ── Clap records ──────────────────────────────────────────────────────────

  async fn put_clap(&self, record: ClapRecord) -> Result<Option<ClapRecord>> {
    let key    = ItemKey::claps(record.article_id, &record.user);
    let claps  = encode_count(record.claps)?;
    let at_str = encode_dt(record.updated_at);

    // The immediate transaction takes the write lock before the read, so the
    // returned previous value is exactly the one this write replaced.
    let previous: Option<RawClap> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let previous = tx
          .query_row(
            "SELECT pk, sk, claps, updated_at FROM items WHERE pk = ?1 AND sk = ?2",
            rusqlite::params![key.pk, key.sk],
            RawClap::from_row,
          )
          .optional()?;
        tx.execute(
          "INSERT INTO items (pk, sk, claps, updated_at) VALUES (?1, ?2, ?3, ?4)
           ON CONFLICT (pk, sk) DO UPDATE
           SET claps = excluded.claps, updated_at = excluded.updated_at",
          rusqlite::params![key.pk, key.sk, claps, at_str],
        )?;
        let kind = if previous.is_some() { ChangeKind::Modify } else { ChangeKind::Insert };
        log_change(&tx, kind, &key, CLAP_IMAGE, &at_str)?;
        tx.commit()?;
        Ok(previous)
      })
      .await?;

    previous.map(RawClap::into_record).transpose()
  }

  async fn list_claps(&self, article_id: Uuid) -> Result<Vec<ClapRecord>> {
    let id_str = encode_uuid(article_id);

    let raws: Vec<RawClap> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT pk, sk, claps, updated_at FROM items
           WHERE pk = ?1 AND substr(sk, 1, 6) = 'CLAPS#'
           ORDER BY sk",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![id_str], RawClap::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawClap::into_record).collect()
  }
}

// ─── ChangeFeed impl ─────────────────────────────────────────────────────────

impl ChangeFeed for SqliteStore {
  type Error = Error;

  async fn read_changes(&self, after: u64, limit: usize) -> Result<Vec<ChangeEvent>> {
    let after_val = encode_count(after)?;
    let limit_val = i64::try_from(limit).unwrap_or(i64::MAX);

    let raws: Vec<RawChange> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT sequence, kind, pk, sk, new_image, recorded_at FROM changes
           WHERE sequence > ?1
           ORDER BY sequence
           LIMIT ?2",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![after_val, limit_val], RawChange::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawChange::into_event).collect()
  }
}
