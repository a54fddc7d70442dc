//! Tests for `SqliteStore` and the core operations running on top of it,
//! against an in-memory database.

mod engagement;

use mucca_core::article::{Article, NewArticle, submit_article};

use crate::SqliteStore;

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

fn submission(link: &str) -> NewArticle {
  NewArticle {
    id:       None,
    link:     link.into(),
    title:    None,
    referrer: "referrer@example.com".into(),
    tags:     None,
  }
}

async fn article(s: &SqliteStore, link: &str) -> Article {
  submit_article(s, submission(link)).await.expect("submit article")
}
