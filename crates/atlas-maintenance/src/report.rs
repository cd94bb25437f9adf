//! Run summaries printed by the `story-order` binary.

use atlas_core::order::Verification;
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TagFailure {
  pub tag_id:  Uuid,
  pub message: String,
}

/// Counts for a backfill or fix run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Report {
  /// Tags processed, failed ones included.
  pub tags:       usize,
  /// Instances given an order by backfill.
  pub placed:     usize,
  /// Tags renumbered from scratch.
  pub rebalanced: usize,
  pub failed:     Vec<TagFailure>,
}

impl Report {
  pub fn fail(&mut self, tag_id: Uuid, error: &impl std::fmt::Display) {
    self.failed.push(TagFailure { tag_id, message: error.to_string() });
  }

  /// Fold a worker's report into this one.
  pub fn merge(&mut self, other: Report) {
    self.tags += other.tags;
    self.placed += other.placed;
    self.rebalanced += other.rebalanced;
    self.failed.extend(other.failed);
  }

  pub fn is_clean(&self) -> bool { self.failed.is_empty() }
}

/// Outcome of verifying several tags.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VerifyReport {
  pub checked:    usize,
  /// Tags whose stored order disagrees with chronology.
  pub mismatched: Vec<Verification>,
  pub failed:     Vec<TagFailure>,
}

impl VerifyReport {
  pub fn record(&mut self, verification: Verification) {
    self.checked += 1;
    if !verification.is_ok() {
      self.mismatched.push(verification);
    }
  }

  pub fn is_clean(&self) -> bool { self.mismatched.is_empty() && self.failed.is_empty() }
}
