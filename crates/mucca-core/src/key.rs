//! Composite keys of the shared entity table.
//!
//! Every item is addressed by a partition key (`pk`, the article id) and a
//! sort key (`sk`) that discriminates the entity kind: `ART` for the article
//! itself, `CLAPS#<user>` for one user's clap record on that article.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Sort key of an article row.
pub const ARTICLE_SK: &str = "ART";

/// Sort key prefix of a clap record row.
pub const CLAPS_SK_PREFIX: &str = "CLAPS#";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ItemKey {
  pub pk: String,
  pub sk: String,
}

impl ItemKey {
  pub fn article(article_id: Uuid) -> Self {
    Self { pk: article_id.hyphenated().to_string(), sk: ARTICLE_SK.to_owned() }
  }

  pub fn claps(article_id: Uuid, user: &str) -> Self {
    Self {
      pk: article_id.hyphenated().to_string(),
      sk: format!("{CLAPS_SK_PREFIX}{user}"),
    }
  }

  pub fn is_article(&self) -> bool { self.sk == ARTICLE_SK }

  /// The user part of a clap record key, `None` for any other kind of key.
  pub fn clapper(&self) -> Option<&str> { self.sk.strip_prefix(CLAPS_SK_PREFIX) }

  /// The partition key parsed as an article id.
  pub fn article_id(&self) -> Option<Uuid> { Uuid::parse_str(&self.pk).ok() }
}

impl fmt::Display for ItemKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}/{}", self.pk, self.sk)
  }
}
