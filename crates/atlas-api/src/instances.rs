//! Handler for `POST /tag-instances`.
//!
//! Attaching a tag to a summary places the summary in the tag's story. The
//! response carries the assigned `story_order`. Errors: 404 for an unknown
//! tag or summary, 409 when the summary has no time to order it by.

use std::sync::Arc;

use atlas_core::instance::NewTagInstance;
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};

use crate::{ApiStore, error::ApiError};

/// `POST /tag-instances` — body: [`NewTagInstance`]
pub async fn create<S: ApiStore>(
  State(store): State<Arc<S>>,
  Json(body): Json<NewTagInstance>,
) -> Result<impl IntoResponse, ApiError> {
  if body.stop_char < body.start_char {
    return Err(ApiError::BadRequest(format!(
      "stop_char {} precedes start_char {}",
      body.stop_char, body.start_char
    )));
  }
  let instance = store.add_tag_instance(body).await.map_err(ApiError::store)?;
  Ok((StatusCode::CREATED, Json(instance)))
}
