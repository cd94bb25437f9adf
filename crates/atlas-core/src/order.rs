//! Story-order algorithms.
//!
//! Every tag instance carries an integer `story_order`; reading a tag's
//! instances by that key yields its story in chronological order. New
//! instances are slotted into the gaps between existing values, and when a
//! gap runs out the whole story is renumbered from `base` in steps of `step`.
//!
//! Everything here is pure: the storage backend loads [`StoryRow`]s, asks
//! these functions what to write, and writes it inside one transaction.

use std::collections::{BTreeSet, HashMap, HashSet};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result, time::TimePoint};

pub const DEFAULT_BASE: i64 = 100_000;
pub const DEFAULT_STEP: i64 = 1_000;

// ─── Configuration ───────────────────────────────────────────────────────────

/// How the allocator makes room when a new instance lands before an existing
/// one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GapStrategy {
  /// Take the integer midpoint of the open interval between the neighbours;
  /// overflow when the interval is empty.
  #[default]
  Midpoint,
  /// Take the successor's value and shift it and everything after it up by
  /// one.
  Shift,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrderConfig {
  pub base:         i64,
  pub step:         i64,
  pub gap_strategy: GapStrategy,
}

impl Default for OrderConfig {
  fn default() -> Self {
    Self {
      base:         DEFAULT_BASE,
      step:         DEFAULT_STEP,
      gap_strategy: GapStrategy::default(),
    }
  }
}

// ─── Rows ────────────────────────────────────────────────────────────────────

/// A tag instance as the ordering algorithms see it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoryRow {
  pub instance_id: Uuid,
  pub summary_id:  Uuid,
  pub story_order: Option<i64>,
  pub time:        TimePoint,
  pub after:       Vec<Uuid>,
}

/// Sort rows chronologically. Rows whose times tie keep their current
/// relative order (unordered rows last), which makes renumbering idempotent.
pub fn sort_chronologically(rows: &mut [StoryRow]) {
  rows.sort_by(|a, b| {
    a.time
      .chrono_cmp(&b.time)
      .then_with(|| current_rank(a).cmp(&current_rank(b)))
      .then_with(|| a.summary_id.cmp(&b.summary_id))
  });
}

fn current_rank(row: &StoryRow) -> (bool, i64) {
  (row.story_order.is_none(), row.story_order.unwrap_or(0))
}

// ─── Gap insertion ───────────────────────────────────────────────────────────

/// Where a new instance goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
  /// The story was empty.
  First(i64),
  /// After every existing instance.
  Append(i64),
  /// Strictly between two neighbours; nothing moves.
  Between(i64),
  /// Takes the successor's value; the caller must reserve the gap first.
  Shift(i64),
}

impl Slot {
  pub fn value(&self) -> i64 {
    match *self {
      Self::First(v) | Self::Append(v) | Self::Between(v) | Self::Shift(v) => v,
    }
  }
}

/// The ordered part of one tag's story, kept sorted by `story_order`.
#[derive(Debug, Clone)]
pub struct StoryLayout {
  tag_id: Uuid,
  config: OrderConfig,
  rows:   Vec<StoryRow>,
}

impl StoryLayout {
  /// Build a layout from a tag's rows. Unordered rows are ignored.
  pub fn new(tag_id: Uuid, rows: Vec<StoryRow>, config: OrderConfig) -> Self {
    let mut rows: Vec<StoryRow> =
      rows.into_iter().filter(|r| r.story_order.is_some()).collect();
    rows.sort_by_key(|r| r.story_order);
    Self { tag_id, config, rows }
  }

  pub fn rows(&self) -> &[StoryRow] { &self.rows }

  pub fn last_order(&self) -> Option<i64> {
    self.rows.last().and_then(|r| r.story_order)
  }

  /// Find the slot for an instance at `time` that should follow the
  /// summaries in `after` when their times tie.
  ///
  /// The scan skips every row that must precede the candidate: earlier rows,
  /// rows at the same instant with equal-or-finer precision, and rows at the
  /// same instant named in `after`. The first remaining row is the successor.
  pub fn plan(&self, time: &TimePoint, after: &[Uuid]) -> Result<Slot> {
    if self.rows.is_empty() {
      return Ok(Slot::First(self.config.base));
    }

    let candidate = time.sort_key();
    let successor = self.rows.iter().position(|row| {
      match row.time.sort_key().cmp(&candidate) {
        std::cmp::Ordering::Less => false,
        std::cmp::Ordering::Equal => {
          row.time.precision < time.precision && !after.contains(&row.summary_id)
        }
        std::cmp::Ordering::Greater => true,
      }
    });

    let Some(index) = successor else {
      let last = self.last_order().unwrap_or(self.config.base);
      let value = last.checked_add(self.config.step).ok_or(Error::Overflow {
        tag_id: self.tag_id,
        below:  last,
        above:  i64::MAX,
      })?;
      return Ok(Slot::Append(value));
    };

    let above = self.rows[index].story_order.unwrap_or(self.config.base);
    if self.config.gap_strategy == GapStrategy::Shift {
      return Ok(Slot::Shift(above));
    }

    let below = match index {
      0 => 0,
      i => self.rows[i - 1].story_order.unwrap_or(0),
    };
    if above - below < 2 {
      return Err(Error::Overflow { tag_id: self.tag_id, below, above });
    }
    Ok(Slot::Between(below + (above - below) / 2))
  }

  /// Record `row` at `slot`, shifting successors in memory for
  /// [`Slot::Shift`] the same way `reserve_gap` does in storage.
  pub fn place(&mut self, mut row: StoryRow, slot: Slot) {
    let value = slot.value();
    if let Slot::Shift(from) = slot {
      for existing in &mut self.rows {
        if let Some(order) = existing.story_order.as_mut()
          && *order >= from
        {
          *order += 1;
        }
      }
    }
    row.story_order = Some(value);
    let at = self.rows.partition_point(|r| r.story_order < Some(value));
    self.rows.insert(at, row);
  }
}

// ─── Renumbering ─────────────────────────────────────────────────────────────

/// A full renumbering of one story, applied in two steps so a per-tag
/// uniqueness constraint never sees a duplicate:
///
/// 1. **stage**: every row moves to a distinct negative value in `[-n, -1]`;
/// 2. **commit**: every row moves to its final value `base + i * step`.
///
/// Both steps run in the same transaction; negative values are never
/// visible once it commits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Renumbering {
  assignments: Vec<(Uuid, i64)>,
}

impl Renumbering {
  /// Assign final values to `instance_ids`, in the given order.
  pub fn new(
    instance_ids: impl IntoIterator<Item = Uuid>,
    config: &OrderConfig,
  ) -> Self {
    let assignments = instance_ids
      .into_iter()
      .zip((0_i64..).map(|i| config.base + i * config.step))
      .collect();
    Self { assignments }
  }

  pub fn len(&self) -> usize { self.assignments.len() }

  pub fn is_empty(&self) -> bool { self.assignments.is_empty() }

  /// Staging values, one distinct negative number per row.
  pub fn staged(&self) -> impl Iterator<Item = (Uuid, i64)> + '_ {
    self
      .assignments
      .iter()
      .enumerate()
      .map(|(i, (id, _))| (*id, staging_value(i)))
  }

  /// Final values in story order.
  pub fn finals(&self) -> &[(Uuid, i64)] { &self.assignments }
}

/// The staging value for the `index`-th row of a renumbering.
pub fn staging_value(index: usize) -> i64 { -(index as i64) - 1 }

// ─── Dependency ordering ─────────────────────────────────────────────────────

/// Order rows so that every row comes after the rows of the summaries in its
/// `after` list, using chronological rank to choose among ready rows.
///
/// Hints naming summaries with no instance in this story are ignored. Returns
/// indices into `rows`, or [`Error::CircularDependency`] if the hints form a
/// cycle.
pub fn dependency_order(tag_id: Uuid, rows: &[StoryRow]) -> Result<Vec<usize>> {
  let mut by_time: Vec<usize> = (0..rows.len()).collect();
  by_time.sort_by(|&a, &b| {
    rows[a]
      .time
      .chrono_cmp(&rows[b].time)
      .then_with(|| current_rank(&rows[a]).cmp(&current_rank(&rows[b])))
      .then_with(|| rows[a].summary_id.cmp(&rows[b].summary_id))
  });
  let mut rank = vec![0_usize; rows.len()];
  for (r, &i) in by_time.iter().enumerate() {
    rank[i] = r;
  }

  let mut by_summary: HashMap<Uuid, Vec<usize>> = HashMap::new();
  for (i, row) in rows.iter().enumerate() {
    by_summary.entry(row.summary_id).or_default().push(i);
  }

  let mut edges: HashSet<(usize, usize)> = HashSet::new();
  for (i, row) in rows.iter().enumerate() {
    for summary in &row.after {
      for &j in by_summary.get(summary).into_iter().flatten() {
        if j != i {
          edges.insert((j, i));
        }
      }
    }
  }

  let mut out_degree = vec![0_usize; rows.len()];
  let mut prerequisites: Vec<Vec<usize>> = vec![Vec::new(); rows.len()];
  for &(before, after) in &edges {
    out_degree[before] += 1;
    prerequisites[after].push(before);
  }

  // Kahn's algorithm from the end of the story: of the rows nothing has to
  // follow, the chronologically latest goes last. A row held back by a hint
  // then lands right after the rows it names.
  let mut ready: BTreeSet<(usize, usize)> = (0..rows.len())
    .filter(|&i| out_degree[i] == 0)
    .map(|i| (rank[i], i))
    .collect();
  let mut ordered = Vec::with_capacity(rows.len());
  while let Some((_, i)) = ready.pop_last() {
    ordered.push(i);
    for &p in &prerequisites[i] {
      out_degree[p] -= 1;
      if out_degree[p] == 0 {
        ready.insert((rank[p], p));
      }
    }
  }

  if ordered.len() < rows.len() {
    let mut remaining: Vec<usize> =
      (0..rows.len()).filter(|&i| out_degree[i] > 0).collect();
    remaining.sort_by_key(|&i| rank[i]);
    return Err(Error::CircularDependency {
      tag_id,
      remaining: remaining.into_iter().map(|i| rows[i].instance_id).collect(),
    });
  }
  ordered.reverse();
  Ok(ordered)
}

// ─── Verification ────────────────────────────────────────────────────────────

/// The first position where a story's stored order disagrees with its
/// chronological order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mismatch {
  pub position:      usize,
  /// The instance currently stored at `position`.
  pub current:       Uuid,
  pub current_order: i64,
  /// The instance that belongs at `position`.
  pub expected:      Uuid,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verification {
  pub tag_id:   Uuid,
  /// Number of ordered instances compared.
  pub checked:  usize,
  pub mismatch: Option<Mismatch>,
}

impl Verification {
  pub fn is_ok(&self) -> bool { self.mismatch.is_none() }
}

/// Check stored order against the time comparator.
///
/// A story is in order when every pair stored against chronological order is
/// explained by `after` hints: the later-stored instance names the earlier
/// one, directly or through a chain. Rows at the same instant and precision
/// may appear in either order.
pub fn verify_story(tag_id: Uuid, rows: Vec<StoryRow>) -> Verification {
  let mut stored: Vec<StoryRow> =
    rows.into_iter().filter(|r| r.story_order.is_some()).collect();
  stored.sort_by_key(|r| r.story_order);

  let keys: Vec<_> = stored.iter().map(|r| r.time.order_key()).collect();
  // `floor[i]` is the smallest key at or after position `i`.
  let mut floor = keys.clone();
  for i in (0..floor.len().saturating_sub(1)).rev() {
    if floor[i + 1] < floor[i] {
      floor[i] = floor[i + 1];
    }
  }

  let hints = HintGraph::new(&stored);
  let mismatch = (0..stored.len()).find_map(|i| {
    if floor.get(i + 1).is_none_or(|min| *min >= keys[i]) {
      return None;
    }
    let expected = (i + 1..stored.len())
      .filter(|&j| keys[j] < keys[i] && !hints.reaches(j, stored[i].summary_id))
      .min_by(|&a, &b| keys[a].cmp(&keys[b]))?;
    Some(Mismatch {
      position:      i,
      current:       stored[i].instance_id,
      current_order: stored[i].story_order.unwrap_or_default(),
      expected:      stored[expected].instance_id,
    })
  });

  Verification { tag_id, checked: stored.len(), mismatch }
}

/// `after` edges between the rows of one story.
struct HintGraph<'a> {
  rows:       &'a [StoryRow],
  by_summary: HashMap<Uuid, Vec<usize>>,
}

impl<'a> HintGraph<'a> {
  fn new(rows: &'a [StoryRow]) -> Self {
    let mut by_summary: HashMap<Uuid, Vec<usize>> = HashMap::new();
    for (i, row) in rows.iter().enumerate() {
      by_summary.entry(row.summary_id).or_default().push(i);
    }
    Self { rows, by_summary }
  }

  /// Whether the row at `from` must follow `summary` through its hints.
  fn reaches(&self, from: usize, summary: Uuid) -> bool {
    let mut seen = HashSet::from([from]);
    let mut stack = vec![from];
    while let Some(i) = stack.pop() {
      for named in &self.rows[i].after {
        if *named == summary {
          return true;
        }
        for &j in self.by_summary.get(named).into_iter().flatten() {
          if seen.insert(j) {
            stack.push(j);
          }
        }
      }
    }
    false
  }
}
