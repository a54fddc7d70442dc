//! JSON REST API for Mucca.
//!
//! Exposes an axum [`Router`] backed by any
//! [`mucca_core::store::EntityStore`]. Authentication happens upstream; the
//! caller identity arrives in the [`claps::USER_HEADER`] header.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", mucca_api::api_router(store.clone()))
//! ```

pub mod articles;
pub mod claps;
pub mod error;

use std::sync::Arc;

use axum::{Router, routing::get};
use mucca_core::store::EntityStore;
use tower_http::trace::TraceLayer;

pub use error::ApiError;

/// Build a fully-materialised API router for `store`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S>(store: Arc<S>) -> Router<()>
where
  S: EntityStore + 'static,
{
  Router::new()
    // Articles
    .route("/articles", get(articles::list::<S>).post(articles::create::<S>))
    .route("/articles/{id}", get(articles::get_one::<S>))
    // Claps
    .route(
      "/articles/{id}/claps",
      get(claps::list::<S>).post(claps::submit::<S>),
    )
    .layer(TraceLayer::new_for_http())
    .with_state(store)
}

#[cfg(test)]
mod tests {
  use super::*;

  use axum::{
    body::Body,
    http::{Request, StatusCode, header},
  };
  use mucca_core::{
    article::{AggregateDelta, Aggregates, Article, EnrichmentUpdate},
    clap::ClapRecord,
    engagement::MAX_CLAPS_PER_USER,
    store::EntityStore,
  };
  use mucca_store_sqlite::{Error as StoreError, SqliteStore};
  use serde_json::{Value, json};
  use tower::ServiceExt as _;
  use uuid::Uuid;

  async fn make_store() -> Arc<SqliteStore> {
    Arc::new(SqliteStore::open_in_memory().await.expect("in-memory store"))
  }

  /// Fails every counter increment, as if the article row vanished between
  /// the clap record write and the increment.
  struct FailingIncrements(SqliteStore);

  impl EntityStore for FailingIncrements {
    type Error = StoreError;

    async fn create_article(&self, article: Article) -> Result<Article, StoreError> {
      self.0.create_article(article).await
    }

    async fn get_article(&self, article_id: Uuid) -> Result<Option<Article>, StoreError> {
      self.0.get_article(article_id).await
    }

    async fn list_articles(&self, limit: Option<usize>) -> Result<Vec<Article>, StoreError> {
      self.0.list_articles(limit).await
    }

    async fn increment_aggregates(
      &self,
      article_id: Uuid,
      _delta: AggregateDelta,
    ) -> Result<(), StoreError> {
      Err(StoreError::ArticleNotFound(article_id))
    }

    async fn set_aggregates(
      &self,
      article_id: Uuid,
      aggregates: Aggregates,
    ) -> Result<(), StoreError> {
      self.0.set_aggregates(article_id, aggregates).await
    }

    async fn apply_enrichment(
      &self,
      article_id: Uuid,
      update: EnrichmentUpdate,
    ) -> Result<bool, StoreError> {
      self.0.apply_enrichment(article_id, update).await
    }

    async fn put_clap(&self, record: ClapRecord) -> Result<Option<ClapRecord>, StoreError> {
      self.0.put_clap(record).await
    }

    async fn list_claps(&self, article_id: Uuid) -> Result<Vec<ClapRecord>, StoreError> {
      self.0.list_claps(article_id).await
    }
  }

  async fn send<S: EntityStore + 'static>(
    store: &Arc<S>,
    method: &str,
    uri: &str,
    user: Option<&str>,
    body: Option<Value>,
  ) -> (StatusCode, Value) {
    let mut req = Request::builder().method(method).uri(uri);
    if let Some(user) = user {
      req = req.header(claps::USER_HEADER, user);
    }
    let req = match body {
      Some(b) => req
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(b.to_string())),
      None => req.body(Body::empty()),
    }
    .unwrap();

    let res = api_router(store.clone()).oneshot(req).await.unwrap();
    let status = res.status();
    let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
      Value::Null
    } else {
      serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
  }

  async fn create_article(store: &Arc<SqliteStore>, link: &str) -> Article {
    let (status, body) = send(
      store,
      "POST",
      "/articles",
      None,
      Some(json!({ "link": link, "referrer": "ada@example.com" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    serde_json::from_value(body).unwrap()
  }

  #[tokio::test]
  async fn create_then_get_article() {
    let store = make_store().await;
    let article = create_article(&store, "https://blog.example.com/x").await;
    assert_eq!(article.domain, "example.com");

    let (status, body) =
      send(&store, "GET", &format!("/articles/{}", article.article_id), None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["title"], "blog.example.com/x");
  }

  #[tokio::test]
  async fn create_with_invalid_link_is_400() {
    let store = make_store().await;
    let (status, body) = send(
      &store,
      "POST",
      "/articles",
      None,
      Some(json!({ "link": "nope", "referrer": "ada@example.com" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
  }

  #[tokio::test]
  async fn create_with_taken_id_is_409() {
    let store = make_store().await;
    let article = create_article(&store, "https://example.com").await;
    let (status, _) = send(
      &store,
      "POST",
      "/articles",
      None,
      Some(json!({
        "id": article.article_id,
        "link": "https://example.com/other",
        "referrer": "bob@example.com",
      })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
  }

  #[tokio::test]
  async fn get_missing_article_is_404() {
    let store = make_store().await;
    let (status, _) =
      send(&store, "GET", &format!("/articles/{}", Uuid::new_v4()), None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
  }

  #[tokio::test]
  async fn list_respects_limit() {
    let store = make_store().await;
    for i in 0..3 {
      create_article(&store, &format!("https://example.com/{i}")).await;
    }
    let (status, body) = send(&store, "GET", "/articles?limit=2", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 2);
  }

  #[tokio::test]
  async fn first_clap_is_201_then_200() {
    let store = make_store().await;
    let article = create_article(&store, "https://example.com").await;
    let uri = format!("/articles/{}/claps", article.article_id);

    let (status, body) =
      send(&store, "POST", &uri, Some("ada@example.com"), Some(json!({ "claps": 5 }))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["caller"], "ada@example.com");
    assert_eq!(body["claps"], 5);
    assert_eq!(body["delta_clappers"], 1);

    let (status, body) =
      send(&store, "POST", &uri, Some("ada@example.com"), Some(json!({ "claps": 0 }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["delta_claps"], -5);
    assert_eq!(body["delta_clappers"], -1);

    let stored = store.get_article(article.article_id).await.unwrap().unwrap();
    assert_eq!(stored.aggregates(), Aggregates::default());

    let (status, body) = send(&store, "GET", &uri, None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0]["claps"], 0);
  }

  #[tokio::test]
  async fn clap_on_missing_article_is_404() {
    let store = make_store().await;
    let (status, _) = send(
      &store,
      "POST",
      &format!("/articles/{}/claps", Uuid::new_v4()),
      Some("ada@example.com"),
      Some(json!({ "claps": 1 })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
  }

  #[tokio::test]
  async fn clap_without_caller_is_401() {
    let store = make_store().await;
    let article = create_article(&store, "https://example.com").await;
    let (status, _) = send(
      &store,
      "POST",
      &format!("/articles/{}/claps", article.article_id),
      None,
      Some(json!({ "claps": 1 })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
  }

  #[tokio::test]
  async fn negative_claps_are_rejected() {
    let store = make_store().await;
    let article = create_article(&store, "https://example.com").await;
    let (status, _) = send(
      &store,
      "POST",
      &format!("/articles/{}/claps", article.article_id),
      Some("ada@example.com"),
      Some(json!({ "claps": -3 })),
    )
    .await;
    assert!(status.is_client_error());
    assert!(store.list_claps(article.article_id).await.unwrap().is_empty());
  }

  #[tokio::test]
  async fn claps_above_maximum_are_400() {
    let store = make_store().await;
    let article = create_article(&store, "https://example.com").await;
    let (status, body) = send(
      &store,
      "POST",
      &format!("/articles/{}/claps", article.article_id),
      Some("ada@example.com"),
      Some(json!({ "claps": MAX_CLAPS_PER_USER + 1 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
    assert!(store.list_claps(article.article_id).await.unwrap().is_empty());
  }

  #[tokio::test]
  async fn failed_aggregate_update_is_500_but_keeps_the_record() {
    let store = make_store().await;
    let article = create_article(&store, "https://example.com").await;
    let failing = Arc::new(FailingIncrements(store.as_ref().clone()));

    let (status, body) = send(
      &failing,
      "POST",
      &format!("/articles/{}/claps", article.article_id),
      Some("ada@example.com"),
      Some(json!({ "claps": 3 })),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"].is_string());

    let records = store.list_claps(article.article_id).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].claps, 3);
    let stored = store.get_article(article.article_id).await.unwrap().unwrap();
    assert_eq!(stored.aggregates(), Aggregates::default());
  }
}
