//! Summaries (events) and the tag instances that place them in stories.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::time::TimePoint;

// ─── Summary ─────────────────────────────────────────────────────────────────

/// A textual description of one historical event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Summary {
  pub summary_id: Uuid,
  pub text:       String,
  /// The citation the summary was extracted from, if recorded.
  pub citation:   Option<String>,
  /// Cached from the summary's TIME tag; `None` until one is attached.
  pub time:       Option<TimePoint>,
  pub created_at: DateTime<Utc>,
}

/// Input to [`crate::store::AtlasStore::add_summary`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSummary {
  pub text:     String,
  #[serde(default)]
  pub citation: Option<String>,
}

// ─── TagInstance ─────────────────────────────────────────────────────────────

/// One tag's appearance in one summary, and that summary's position in the
/// tag's story.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagInstance {
  pub instance_id: Uuid,
  pub tag_id:      Uuid,
  pub summary_id:  Uuid,
  /// Character span of the mention in the summary text.
  pub start_char:  u32,
  pub stop_char:   u32,
  /// `None` means "not yet positioned".
  pub story_order: Option<i64>,
  /// Summaries this instance should follow when their times tie.
  pub after:       Vec<Uuid>,
}

/// Input to [`crate::store::AtlasStore::add_tag_instance`]. The story order
/// is always assigned by the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTagInstance {
  pub tag_id:     Uuid,
  pub summary_id: Uuid,
  pub start_char: u32,
  pub stop_char:  u32,
  #[serde(default)]
  pub after:      Vec<Uuid>,
}

impl NewTagInstance {
  /// Convenience constructor for a mention with no span and no hints.
  pub fn new(tag_id: Uuid, summary_id: Uuid) -> Self {
    Self { tag_id, summary_id, start_char: 0, stop_char: 0, after: Vec::new() }
  }
}
