//! JSON REST API for History Atlas.
//!
//! Exposes an axum [`Router`] backed by any store implementing the three
//! [`atlas_core::store`] traits. Auth, TLS, and transport concerns are the
//! caller's responsibility.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", atlas_api::api_router(Arc::new(store)))
//! ```

pub mod error;
pub mod instances;
pub mod story;
pub mod summaries;
pub mod tags;

use std::sync::Arc;

use atlas_core::store::{AtlasStore, StoryOrdering, StoryReader};
use axum::{
  Router,
  routing::{get, post},
};

pub use error::ApiError;

/// Everything the router needs from a backend.
pub trait ApiStore: AtlasStore + StoryOrdering + StoryReader + 'static {}

impl<S: AtlasStore + StoryOrdering + StoryReader + 'static> ApiStore for S {}

/// Build a fully-materialised API router for `store`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S: ApiStore>(store: Arc<S>) -> Router<()> {
  Router::new()
    // Tags
    .route("/tags", get(tags::list::<S>).post(tags::create::<S>))
    .route("/tags/{id}", get(tags::get_one::<S>))
    .route("/tags/{id}/story", get(tags::story::<S>))
    .route("/tags/{id}/rebalance", post(tags::rebalance::<S>))
    .route("/tags/{id}/verify", get(tags::verify::<S>))
    // Summaries
    .route("/summaries", post(summaries::create::<S>))
    .route("/summaries/{id}", get(summaries::get_one::<S>))
    // Tag instances
    .route("/tag-instances", post(instances::create::<S>))
    // Traversal
    .route("/story", get(story::handler::<S>))
    .with_state(store)
}

#[cfg(test)]
mod tests;
