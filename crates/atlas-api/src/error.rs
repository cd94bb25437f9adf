//! API error type and [`axum::response::IntoResponse`] implementation.

use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error("not found: {0}")]
  NotFound(String),

  #[error("bad request: {0}")]
  BadRequest(String),

  /// The request is well-formed but the stored data cannot satisfy it.
  #[error("conflict: {0}")]
  Conflict(String),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl ApiError {
  /// Classify a backend error by the domain error somewhere in its chain.
  pub fn store<E: std::error::Error + Send + Sync + 'static>(error: E) -> Self {
    let mut cause: Option<&(dyn std::error::Error + 'static)> = Some(&error);
    while let Some(err) = cause {
      if let Some(core) = err.downcast_ref::<atlas_core::Error>() {
        use atlas_core::Error as Core;
        let message = core.to_string();
        match core {
          Core::TagNotFound(_) | Core::SummaryNotFound(_) => {
            return Self::NotFound(message);
          }
          Core::CircularDependency { .. } | Core::MissingTime(_) | Core::AlreadyDated { .. } => {
            return Self::Conflict(message);
          }
          Core::UnknownTagKind(_) => return Self::BadRequest(message),
          Core::Overflow { .. } | Core::Serialization(_) => break,
        }
      }
      cause = err.source();
    }
    Self::Store(Box::new(error))
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let (status, message) = match &self {
      ApiError::NotFound(m) => (StatusCode::NOT_FOUND, m.clone()),
      ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m.clone()),
      ApiError::Conflict(m) => (StatusCode::CONFLICT, m.clone()),
      ApiError::Store(e) => {
        tracing::error!(error = %e, "store error");
        (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
      }
    };
    (status, Json(json!({ "error": message }))).into_response()
  }
}
