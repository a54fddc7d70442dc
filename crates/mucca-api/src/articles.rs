//! Handlers for `/articles` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/articles` | Newest first; optional `?limit=` (default 50, max 500) |
//! | `POST` | `/articles` | Body: [`NewArticle`]; returns 201 + stored article |
//! | `GET`  | `/articles/:id` | 404 if not found |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, Query, State},
  http::StatusCode,
  response::IntoResponse,
};
use mucca_core::{
  article::{Article, NewArticle, submit_article},
  store::EntityStore,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::ApiError;

const DEFAULT_LIMIT: usize = 50;
const MAX_LIMIT: usize = 500;

// ─── List ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ListParams {
  pub limit: Option<usize>,
}

/// `GET /articles[?limit=<n>]`
pub async fn list<S>(
  State(store): State<Arc<S>>,
  Query(params): Query<ListParams>,
) -> Result<Json<Vec<Article>>, ApiError>
where
  S: EntityStore,
{
  let limit = params.limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT);
  let articles = store
    .list_articles(Some(limit))
    .await
    .map_err(|e| ApiError::Store(Box::new(e)))?;
  Ok(Json(articles))
}

// ─── Create ───────────────────────────────────────────────────────────────────

/// `POST /articles`, body: `{"link":"...","referrer":"..."}` plus optional
/// `id`, `title` and `tags`.
pub async fn create<S>(
  State(store): State<Arc<S>>,
  Json(body): Json<NewArticle>,
) -> Result<impl IntoResponse, ApiError>
where
  S: EntityStore,
{
  let article = submit_article(store.as_ref(), body).await?;
  Ok((StatusCode::CREATED, Json(article)))
}

// ─── Get one ──────────────────────────────────────────────────────────────────

/// `GET /articles/:id`
pub async fn get_one<S>(
  State(store): State<Arc<S>>,
  Path(id): Path<Uuid>,
) -> Result<Json<Article>, ApiError>
where
  S: EntityStore,
{
  let article = store
    .get_article(id)
    .await
    .map_err(|e| ApiError::Store(Box::new(e)))?
    .ok_or_else(|| ApiError::NotFound(format!("article {id} not found")))?;
  Ok(Json(article))
}
