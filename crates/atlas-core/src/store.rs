//! Storage traits.
//!
//! Implemented by storage backends (e.g. `atlas-store-sqlite`). Higher layers
//! (`atlas-api`, `atlas-maintenance`) depend on these abstractions, not on any
//! concrete backend. The surface is split in three so a consumer can ask for
//! exactly what it uses: CRUD ([`AtlasStore`]), order maintenance
//! ([`StoryOrdering`]) and traversal reads ([`StoryReader`]).
//!
//! All methods return `Send` futures so the traits can be used in
//! multi-threaded async runtimes (e.g. tokio with `axum`).

use std::future::Future;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  instance::{NewSummary, NewTagInstance, Summary, TagInstance},
  order::Verification,
  story::{Direction, StoryEntry, StoryPointer},
  tag::{Tag, TagKind, TagValue},
  time::TimePoint,
};

/// The error type shared by every trait a backend implements.
pub trait Backend: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;
}

// ─── CRUD ────────────────────────────────────────────────────────────────────

pub trait AtlasStore: Backend {
  /// Create and persist a new tag.
  fn add_tag(
    &self,
    value: TagValue,
  ) -> impl Future<Output = Result<Tag, Self::Error>> + Send + '_;

  /// Retrieve a tag by id. Returns `None` if not found.
  fn get_tag(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Tag>, Self::Error>> + Send + '_;

  /// List all tags, optionally filtered by kind.
  fn list_tags(
    &self,
    kind: Option<TagKind>,
  ) -> impl Future<Output = Result<Vec<Tag>, Self::Error>> + Send + '_;

  fn add_summary(
    &self,
    input: NewSummary,
  ) -> impl Future<Output = Result<Summary, Self::Error>> + Send + '_;

  fn get_summary(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Summary>, Self::Error>> + Send + '_;

  /// Attach a tag to a summary and place the summary in the tag's story.
  ///
  /// Runs in one transaction: validates both ids, refreshes the summary's
  /// cached time when the tag is a TIME tag, allocates a `story_order` and
  /// inserts. When allocation overflows the instance is inserted unordered
  /// and the whole story is rebalanced before commit.
  fn add_tag_instance(
    &self,
    input: NewTagInstance,
  ) -> impl Future<Output = Result<TagInstance, Self::Error>> + Send + '_;

  /// Every instance of a tag: ordered ones by `story_order`, then unordered.
  fn story(
    &self,
    tag_id: Uuid,
  ) -> impl Future<Output = Result<Vec<TagInstance>, Self::Error>> + Send + '_;
}

// ─── Order maintenance ───────────────────────────────────────────────────────

/// Result of [`StoryOrdering::backfill_tag`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TagBackfill {
  /// Every unordered instance received an order.
  Placed { count: usize },
  /// Allocation ran out of room; nothing was written.
  Overflowed { below: i64, above: i64 },
}

pub trait StoryOrdering: Backend {
  /// Distinct tags that have at least one unordered instance, ascending,
  /// optionally restricted to `start..=stop`.
  fn tags_pending_order(
    &self,
    range: Option<(Uuid, Uuid)>,
  ) -> impl Future<Output = Result<Vec<Uuid>, Self::Error>> + Send + '_;

  /// Every tag that has at least one instance, ascending.
  fn tags_with_instances(
    &self,
  ) -> impl Future<Output = Result<Vec<Uuid>, Self::Error>> + Send + '_;

  /// Tags with at least `min` ordered instances.
  fn tags_with_ordered_instances(
    &self,
    min: usize,
  ) -> impl Future<Output = Result<Vec<Uuid>, Self::Error>> + Send + '_;

  /// Place every unordered instance of one tag, in one transaction.
  fn backfill_tag(
    &self,
    tag_id: Uuid,
  ) -> impl Future<Output = Result<TagBackfill, Self::Error>> + Send + '_;

  /// The order value a new instance at `time` would receive. With the shift
  /// strategy this reserves the gap as a side effect.
  fn allocate(
    &self,
    tag_id: Uuid,
    time: TimePoint,
    after: Vec<Uuid>,
  ) -> impl Future<Output = Result<i64, Self::Error>> + Send + '_;

  /// Shift every order `>= from` up by one.
  fn reserve_gap(
    &self,
    tag_id: Uuid,
    from: i64,
  ) -> impl Future<Output = Result<usize, Self::Error>> + Send + '_;

  /// Renumber every instance of a tag chronologically. Returns the number
  /// of instances renumbered.
  fn rebalance(
    &self,
    tag_id: Uuid,
  ) -> impl Future<Output = Result<usize, Self::Error>> + Send + '_;

  /// Renumber honouring `after` hints as hard precedence constraints.
  /// Fails without writing if the hints form a cycle.
  fn rebalance_bulk(
    &self,
    tag_id: Uuid,
  ) -> impl Future<Output = Result<usize, Self::Error>> + Send + '_;

  /// Compare stored order against chronological order. Read-only.
  fn verify(
    &self,
    tag_id: Uuid,
  ) -> impl Future<Output = Result<Verification, Self::Error>> + Send + '_;

  /// Set every order in the store to `NULL`. Returns rows touched.
  fn reset_all(&self) -> impl Future<Output = Result<usize, Self::Error>> + Send + '_;

  /// Set one tag's orders to `NULL`. Returns rows touched.
  fn reset_tag(
    &self,
    tag_id: Uuid,
  ) -> impl Future<Output = Result<usize, Self::Error>> + Send + '_;
}

// ─── Traversal reads ─────────────────────────────────────────────────────────

pub trait StoryReader: Backend {
  /// The ordered instance behind a pointer, if it exists.
  fn entry(
    &self,
    pointer: StoryPointer,
  ) -> impl Future<Output = Result<Option<StoryEntry>, Self::Error>> + Send + '_;

  /// Up to `limit` ordered entries of a story strictly past `from` in
  /// `direction` (`None` starts at the story's edge).
  fn story_page(
    &self,
    story_id: Uuid,
    from: Option<i64>,
    direction: Direction,
    limit: usize,
  ) -> impl Future<Output = Result<Vec<StoryEntry>, Self::Error>> + Send + '_;

  /// Every ordered entry of a story, by `story_order`.
  fn story_entries(
    &self,
    story_id: Uuid,
  ) -> impl Future<Output = Result<Vec<StoryEntry>, Self::Error>> + Send + '_;

  /// A tag of `kind` co-tagged on `summary_id`, first by mention position.
  fn co_tagged(
    &self,
    summary_id: Uuid,
    kind: TagKind,
  ) -> impl Future<Output = Result<Option<Uuid>, Self::Error>> + Send + '_;

  /// The TIME tag immediately after (or before) `time_tag_id` by datetime.
  fn adjacent_time_tag(
    &self,
    time_tag_id: Uuid,
    direction: Direction,
  ) -> impl Future<Output = Result<Option<Uuid>, Self::Error>> + Send + '_;
}
