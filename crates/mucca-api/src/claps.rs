//! Handlers for `/articles/:id/claps`.
//!
//! The caller's identity comes from the [`USER_HEADER`] header, which the
//! authenticating proxy in front of this service sets from the verified
//! token. Requests without it are rejected.

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, State},
  http::{HeaderMap, StatusCode},
  response::IntoResponse,
};
use mucca_core::{clap::ClapRecord, engagement::submit_clap, store::EntityStore};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ApiError;

/// Header carrying the authenticated caller's identity (their email).
pub const USER_HEADER: &str = "x-mucca-user";

#[derive(Debug, Deserialize)]
pub struct ClapBody {
  /// The caller's new total for the article; `0` withdraws their claps.
  pub claps: u64,
}

#[derive(Debug, Serialize)]
pub struct ClapResponse {
  pub caller:         String,
  pub claps:          u64,
  pub delta_claps:    i64,
  pub delta_clappers: i64,
}

fn caller(headers: &HeaderMap) -> Result<String, ApiError> {
  headers
    .get(USER_HEADER)
    .and_then(|v| v.to_str().ok())
    .map(str::trim)
    .filter(|s| !s.is_empty())
    .map(str::to_owned)
    .ok_or_else(|| ApiError::Unauthorized(format!("missing {USER_HEADER} header")))
}

/// `POST /articles/:id/claps`, body: `{"claps": n}`.
///
/// 201 for the caller's first record on the article, 200 afterwards.
pub async fn submit<S>(
  State(store): State<Arc<S>>,
  Path(article_id): Path<Uuid>,
  headers: HeaderMap,
  Json(body): Json<ClapBody>,
) -> Result<impl IntoResponse, ApiError>
where
  S: EntityStore,
{
  let user = caller(&headers)?;
  let outcome = submit_clap(store.as_ref(), article_id, &user, body.claps).await?;

  let status = if outcome.is_first_record() { StatusCode::CREATED } else { StatusCode::OK };
  Ok((status, Json(ClapResponse {
    caller:         outcome.user,
    claps:          outcome.recorded_claps,
    delta_claps:    outcome.delta.claps,
    delta_clappers: outcome.delta.clappers,
  })))
}

/// `GET /articles/:id/claps`
pub async fn list<S>(
  State(store): State<Arc<S>>,
  Path(article_id): Path<Uuid>,
) -> Result<Json<Vec<ClapRecord>>, ApiError>
where
  S: EntityStore,
{
  store
    .get_article(article_id)
    .await
    .map_err(|e| ApiError::Store(Box::new(e)))?
    .ok_or_else(|| ApiError::NotFound(format!("article {article_id} not found")))?;

  let records = store
    .list_claps(article_id)
    .await
    .map_err(|e| ApiError::Store(Box::new(e)))?;
  Ok(Json(records))
}
