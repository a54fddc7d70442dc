//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are RFC 3339 strings, tags a compact JSON array, UUIDs
//! hyphenated lowercase strings, counters `INTEGER`.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use mucca_core::{
  article::Article,
  clap::ClapRecord,
  event::{ChangeEvent, ChangeKind},
  key::{CLAPS_SK_PREFIX, ItemKey},
};
use url::Url;
use uuid::Uuid;

use crate::{Error, Result};

// ─── Scalars ─────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

pub fn encode_count(n: u64) -> Result<i64> {
  i64::try_from(n).map_err(|_| Error::CountOverflow(n))
}

pub fn decode_count(n: i64) -> Result<u64> {
  u64::try_from(n).map_err(|_| Error::Decode(format!("negative count: {n}")))
}

/// Article counters may dip below zero while two increments from the same
/// user land out of order; readers see zero until the pair settles.
pub fn decode_counter(n: i64) -> u64 { u64::try_from(n).unwrap_or(0) }

pub fn encode_tags(tags: &BTreeSet<String>) -> Result<String> {
  Ok(serde_json::to_string(tags)?)
}

pub fn decode_tags(s: Option<&str>) -> Result<BTreeSet<String>> {
  match s {
    Some(s) => Ok(serde_json::from_str(s)?),
    None => Ok(BTreeSet::new()),
  }
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Column list matching [`RawArticle::from_row`].
pub const ARTICLE_COLUMNS: &str = "pk, link, title, referrer, domain, tags, \
                                   enriched_at, claps, clappers, created_at";

/// Raw values read directly from an article row.
pub struct RawArticle {
  pub pk:          String,
  pub link:        String,
  pub title:       String,
  pub referrer:    String,
  pub domain:      String,
  pub tags:        Option<String>,
  pub enriched_at: Option<String>,
  pub claps:       i64,
  pub clappers:    i64,
  pub created_at:  String,
}

impl RawArticle {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      pk:          row.get(0)?,
      link:        row.get(1)?,
      title:       row.get(2)?,
      referrer:    row.get(3)?,
      domain:      row.get(4)?,
      tags:        row.get(5)?,
      enriched_at: row.get(6)?,
      claps:       row.get(7)?,
      clappers:    row.get(8)?,
      created_at:  row.get(9)?,
    })
  }

  pub fn into_article(self) -> Result<Article> {
    Ok(Article {
      article_id:  decode_uuid(&self.pk)?,
      link:        Url::parse(&self.link)?,
      title:       self.title,
      referrer:    self.referrer,
      domain:      self.domain,
      tags:        decode_tags(self.tags.as_deref())?,
      enriched_at: self.enriched_at.as_deref().map(decode_dt).transpose()?,
      claps:       decode_counter(self.claps),
      clappers:    decode_counter(self.clappers),
      created_at:  decode_dt(&self.created_at)?,
    })
  }
}

/// Raw values read directly from a clap record row.
pub struct RawClap {
  pub pk:         String,
  pub sk:         String,
  pub claps:      i64,
  pub updated_at: String,
}

impl RawClap {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      pk:         row.get(0)?,
      sk:         row.get(1)?,
      claps:      row.get(2)?,
      updated_at: row.get(3)?,
    })
  }

  pub fn into_record(self) -> Result<ClapRecord> {
    let user = self
      .sk
      .strip_prefix(CLAPS_SK_PREFIX)
      .ok_or_else(|| Error::Decode(format!("not a clap key: {:?}", self.sk)))?
      .to_owned();
    Ok(ClapRecord {
      article_id: decode_uuid(&self.pk)?,
      user,
      claps: decode_count(self.claps)?,
      updated_at: decode_dt(&self.updated_at)?,
    })
  }
}

/// Raw values read directly from a `changes` row.
pub struct RawChange {
  pub sequence:    i64,
  pub kind:        String,
  pub pk:          String,
  pub sk:          String,
  pub new_image:   Option<String>,
  pub recorded_at: String,
}

impl RawChange {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      sequence:    row.get(0)?,
      kind:        row.get(1)?,
      pk:          row.get(2)?,
      sk:          row.get(3)?,
      new_image:   row.get(4)?,
      recorded_at: row.get(5)?,
    })
  }

  pub fn into_event(self) -> Result<ChangeEvent> {
    let kind = ChangeKind::parse(&self.kind)
      .ok_or_else(|| Error::Decode(format!("unknown change kind: {:?}", self.kind)))?;
    Ok(ChangeEvent {
      sequence: decode_count(self.sequence)?,
      kind,
      key: ItemKey { pk: self.pk, sk: self.sk },
      new_image: self
        .new_image
        .as_deref()
        .map(serde_json::from_str)
        .transpose()?,
      recorded_at: decode_dt(&self.recorded_at)?,
    })
  }
}
