//! Article: the shared link that accrues claps and enrichment metadata.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

use crate::{Error, Result, store::EntityStore};

// ─── Counters ────────────────────────────────────────────────────────────────

/// Denormalised engagement counters stored on the article row.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Aggregates {
  /// Sum of every user's current clap value.
  pub claps:    u64,
  /// Number of users whose current clap value is positive.
  pub clappers: u64,
}

/// A signed change folded into [`Aggregates`] by an atomic increment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateDelta {
  pub claps:    i64,
  pub clappers: i64,
}

impl AggregateDelta {
  pub fn is_zero(&self) -> bool { self.claps == 0 && self.clappers == 0 }
}

// ─── Article ─────────────────────────────────────────────────────────────────

/// An article row. Serialised as-is into change-feed images.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
  pub article_id:  Uuid,
  /// Immutable after creation.
  pub link:        Url,
  pub title:       String,
  pub referrer:    String,
  /// Registrable-looking part of the link host, e.g. `example.com`.
  pub domain:      String,
  #[serde(default)]
  pub tags:        BTreeSet<String>,
  /// `None` until the enrichment processor has written metadata.
  pub enriched_at: Option<DateTime<Utc>>,
  pub claps:       u64,
  pub clappers:    u64,
  pub created_at:  DateTime<Utc>,
}

impl Article {
  pub fn aggregates(&self) -> Aggregates {
    Aggregates { claps: self.claps, clappers: self.clappers }
  }

  pub fn is_enriched(&self) -> bool { self.enriched_at.is_some() }

  /// Build a fresh, un-enriched article from a submission.
  pub fn from_submission(input: NewArticle, now: DateTime<Utc>) -> Result<Self> {
    let link = Url::parse(input.link.trim()).map_err(|e| Error::InvalidLink {
      link:   input.link.clone(),
      reason: e.to_string(),
    })?;
    if !matches!(link.scheme(), "http" | "https") {
      return Err(Error::InvalidLink {
        link:   input.link,
        reason: format!("unsupported scheme {:?}", link.scheme()),
      });
    }

    let domain = domain_from_link(&link);
    let title = input
      .title
      .filter(|t| !t.trim().is_empty())
      .unwrap_or_else(|| default_title(&input.link));

    Ok(Self {
      article_id: input.id.unwrap_or_else(Uuid::new_v4),
      link,
      title,
      referrer: input.referrer,
      domain,
      tags: input.tags.unwrap_or_default(),
      enriched_at: None,
      claps: 0,
      clappers: 0,
      created_at: now,
    })
  }
}

/// A link submission as received from the chat bot or the API.
#[derive(Debug, Clone, Deserialize)]
pub struct NewArticle {
  /// Caller-supplied id; a random one is generated when absent.
  pub id:       Option<Uuid>,
  pub link:     String,
  pub title:    Option<String>,
  pub referrer: String,
  pub tags:     Option<BTreeSet<String>>,
}

/// Metadata written by the enrichment processor in one conditional update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrichmentUpdate {
  pub title:       String,
  pub tags:        BTreeSet<String>,
  pub enriched_at: DateTime<Utc>,
}

/// The last two labels of the link host (`news.example.com` → `example.com`).
pub fn domain_from_link(link: &Url) -> String {
  let host = link.host_str().unwrap_or_default();
  let labels: Vec<&str> = host.split('.').collect();
  let start = labels.len().saturating_sub(2);
  labels[start..].join(".")
}

fn default_title(link: &str) -> String {
  let link = link.trim();
  link
    .split_once("://")
    .map(|(_, rest)| rest)
    .unwrap_or(link)
    .to_owned()
}

// ─── Submission ──────────────────────────────────────────────────────────────

/// Validate and persist a new article.
///
/// Fails with [`Error::ArticleExists`] if the requested id is already taken.
pub async fn submit_article<S>(store: &S, input: NewArticle) -> Result<Article>
where
  S: EntityStore,
{
  let article = Article::from_submission(input, Utc::now())?;

  if store
    .get_article(article.article_id)
    .await
    .map_err(Error::store)?
    .is_some()
  {
    return Err(Error::ArticleExists(article.article_id));
  }

  let article = store.create_article(article).await.map_err(Error::store)?;
  tracing::info!(
    article_id = %article.article_id,
    link = %article.link,
    referrer = %article.referrer,
    "article submitted"
  );
  Ok(article)
}
