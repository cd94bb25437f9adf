//! Handler for `GET /story`: one page of story traversal.

use std::sync::Arc;

use atlas_core::story::{Direction, StoryPointer, traverse};
use axum::{
  Json,
  extract::{Query, State},
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{ApiStore, error::ApiError};

#[derive(Debug, Deserialize)]
pub struct StoryParams {
  pub event_id:  Uuid,
  pub story_id:  Uuid,
  /// Unset returns a window around the start.
  pub direction: Option<Direction>,
}

/// `GET /story?event_id=<id>&story_id=<id>[&direction=next|prev]`
pub async fn handler<S: ApiStore>(
  State(store): State<Arc<S>>,
  Query(params): Query<StoryParams>,
) -> Result<Json<Vec<StoryPointer>>, ApiError> {
  let start = StoryPointer { event_id: params.event_id, story_id: params.story_id };
  let page = traverse(store.as_ref(), start, params.direction)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(page))
}
