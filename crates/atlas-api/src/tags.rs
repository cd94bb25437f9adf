//! Handlers for `/tags` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/tags` | Optional `?kind=PERSON\|PLACE\|TIME` |
//! | `POST` | `/tags` | Body: a [`TagValue`], e.g. `{"type":"PERSON","data":{"names":["Ada"]}}` |
//! | `GET`  | `/tags/:id` | 404 if not found |
//! | `GET`  | `/tags/:id/story` | Instances by `story_order`, unordered last |
//! | `POST` | `/tags/:id/rebalance` | `?mode=bulk` honours `after` hints; 409 on a cycle |
//! | `GET`  | `/tags/:id/verify` | First position out of chronological order, if any |

use std::sync::Arc;

use atlas_core::{
  instance::TagInstance,
  order::Verification,
  tag::{Tag, TagKind, TagValue},
};
use axum::{
  Json,
  extract::{Path, Query, State},
  http::StatusCode,
  response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{ApiStore, error::ApiError};

// ─── List ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ListParams {
  pub kind: Option<TagKind>,
}

/// `GET /tags[?kind=<kind>]`
pub async fn list<S: ApiStore>(
  State(store): State<Arc<S>>,
  Query(params): Query<ListParams>,
) -> Result<Json<Vec<Tag>>, ApiError> {
  let tags = store.list_tags(params.kind).await.map_err(ApiError::store)?;
  Ok(Json(tags))
}

// ─── Create ───────────────────────────────────────────────────────────────────

/// `POST /tags`
pub async fn create<S: ApiStore>(
  State(store): State<Arc<S>>,
  Json(value): Json<TagValue>,
) -> Result<impl IntoResponse, ApiError> {
  let tag = store.add_tag(value).await.map_err(ApiError::store)?;
  Ok((StatusCode::CREATED, Json(tag)))
}

// ─── Get one ──────────────────────────────────────────────────────────────────

/// `GET /tags/:id`
pub async fn get_one<S: ApiStore>(
  State(store): State<Arc<S>>,
  Path(id): Path<Uuid>,
) -> Result<Json<Tag>, ApiError> {
  let tag = store
    .get_tag(id)
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| ApiError::NotFound(format!("tag {id} not found")))?;
  Ok(Json(tag))
}

// ─── Story ────────────────────────────────────────────────────────────────────

/// `GET /tags/:id/story`
pub async fn story<S: ApiStore>(
  State(store): State<Arc<S>>,
  Path(id): Path<Uuid>,
) -> Result<Json<Vec<TagInstance>>, ApiError> {
  let instances = store.story(id).await.map_err(ApiError::store)?;
  Ok(Json(instances))
}

// ─── Rebalance ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RebalanceMode {
  /// Time comparator only.
  #[default]
  Chronological,
  /// `after` hints as hard constraints.
  Bulk,
}

#[derive(Debug, Deserialize)]
pub struct RebalanceParams {
  #[serde(default)]
  pub mode: RebalanceMode,
}

#[derive(Debug, Serialize)]
pub struct Rebalanced {
  pub tag_id:     Uuid,
  pub mode:       RebalanceMode,
  pub renumbered: usize,
}

/// `POST /tags/:id/rebalance[?mode=bulk]`
pub async fn rebalance<S: ApiStore>(
  State(store): State<Arc<S>>,
  Path(id): Path<Uuid>,
  Query(params): Query<RebalanceParams>,
) -> Result<Json<Rebalanced>, ApiError> {
  let renumbered = match params.mode {
    RebalanceMode::Chronological => store.rebalance(id).await,
    RebalanceMode::Bulk => store.rebalance_bulk(id).await,
  }
  .map_err(ApiError::store)?;
  Ok(Json(Rebalanced { tag_id: id, mode: params.mode, renumbered }))
}

// ─── Verify ───────────────────────────────────────────────────────────────────

/// `GET /tags/:id/verify`
pub async fn verify<S: ApiStore>(
  State(store): State<Arc<S>>,
  Path(id): Path<Uuid>,
) -> Result<Json<Verification>, ApiError> {
  let verification = store.verify(id).await.map_err(ApiError::store)?;
  Ok(Json(verification))
}
