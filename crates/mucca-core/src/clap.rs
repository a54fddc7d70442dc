//! Clap records, one per (article, user), holding the user's current total.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A user's absolute clap value for one article. A later write replaces the
/// value entirely; it is never a delta.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClapRecord {
  pub article_id: Uuid,
  pub user:       String,
  pub claps:      u64,
  pub updated_at: DateTime<Utc>,
}
