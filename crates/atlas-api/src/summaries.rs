//! Handlers for `/summaries` endpoints.

use std::sync::Arc;

use atlas_core::instance::{NewSummary, Summary};
use axum::{
  Json,
  extract::{Path, State},
  http::StatusCode,
  response::IntoResponse,
};
use uuid::Uuid;

use crate::{ApiStore, error::ApiError};

/// `POST /summaries` — body: `{"text":"...","citation":"..."}`
pub async fn create<S: ApiStore>(
  State(store): State<Arc<S>>,
  Json(body): Json<NewSummary>,
) -> Result<impl IntoResponse, ApiError> {
  if body.text.trim().is_empty() {
    return Err(ApiError::BadRequest("summary text is empty".into()));
  }
  let summary = store.add_summary(body).await.map_err(ApiError::store)?;
  Ok((StatusCode::CREATED, Json(summary)))
}

/// `GET /summaries/:id`
pub async fn get_one<S: ApiStore>(
  State(store): State<Arc<S>>,
  Path(id): Path<Uuid>,
) -> Result<Json<Summary>, ApiError> {
  let summary = store
    .get_summary(id)
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| ApiError::NotFound(format!("summary {id} not found")))?;
  Ok(Json(summary))
}
