//! Error types for `atlas-core`.

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum Error {
  #[error("tag not found: {0}")]
  TagNotFound(Uuid),

  #[error("summary not found: {0}")]
  SummaryNotFound(Uuid),

  /// No integer lies strictly between the two neighbouring orders.
  #[error("story order overflow in tag {tag_id}: no gap between {below} and {above}")]
  Overflow { tag_id: Uuid, below: i64, above: i64 },

  /// The `after` hints of a tag's instances form a cycle.
  #[error("circular dependency in tag {tag_id} among instances {remaining:?}")]
  CircularDependency { tag_id: Uuid, remaining: Vec<Uuid> },

  /// The summary has no cached time, so it cannot be placed in any story.
  #[error("summary {0} has no time tag")]
  MissingTime(Uuid),

  /// A summary carries at most one TIME tag.
  #[error("summary {summary_id} is already dated by time tag {time_tag}")]
  AlreadyDated { summary_id: Uuid, time_tag: Uuid },

  #[error("unknown tag kind: {0:?}")]
  UnknownTagKind(String),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
