//! Change-feed events emitted by the entity store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::key::ItemKey;

/// The kind of mutation that produced a change event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
  Insert,
  Modify,
  Remove,
}

impl ChangeKind {
  pub fn as_str(&self) -> &'static str {
    match self {
      ChangeKind::Insert => "INSERT",
      ChangeKind::Modify => "MODIFY",
      ChangeKind::Remove => "REMOVE",
    }
  }

  pub fn parse(s: &str) -> Option<Self> {
    match s {
      "INSERT" => Some(ChangeKind::Insert),
      "MODIFY" => Some(ChangeKind::Modify),
      "REMOVE" => Some(ChangeKind::Remove),
      _ => None,
    }
  }
}

/// One entry of the change feed.
///
/// `new_image` is the JSON post-mutation image of the item; it is absent for
/// removals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
  /// Position in the feed; strictly increasing.
  pub sequence:    u64,
  pub kind:        ChangeKind,
  pub key:         ItemKey,
  pub new_image:   Option<serde_json::Value>,
  pub recorded_at: DateTime<Utc>,
}
