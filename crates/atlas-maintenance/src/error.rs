//! Error type for `atlas-maintenance`.

use thiserror::Error;

/// A failure that stops a whole maintenance run. Per-tag failures are
/// recorded in a [`crate::Report`] instead.
#[derive(Debug, Error)]
pub enum Error<E: std::error::Error + 'static> {
  #[error("store error: {0}")]
  Store(#[source] E),

  #[error("failed to open a worker connection: {0}")]
  Connect(#[source] E),

  #[error("backfill worker did not finish: {0}")]
  Worker(#[from] tokio::task::JoinError),
}
