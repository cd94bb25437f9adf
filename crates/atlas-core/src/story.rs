//! Story traversal, the paginated feed behind the story view.
//!
//! A pointer names an event (summary) inside a story (tag). Walking a story
//! is a range query on `story_order`. When a story runs out before the page
//! is full the walk hops to a related story:
//!
//! | current | next story |
//! |---------|------------|
//! | PERSON  | the PLACE co-tagged on the last event, else its TIME |
//! | PLACE   | the TIME co-tagged on the last event |
//! | TIME    | the adjacent TIME tag by datetime |
//!
//! A story is never entered twice and an event is never emitted twice, so a
//! walk always terminates; running out of relations just yields a short page.

use std::{cmp::Ordering, collections::HashSet};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{store::StoryReader, tag::TagKind, time::TimePoint};

/// Pointers returned per call.
pub const PAGE_SIZE: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StoryPointer {
  /// The summary.
  pub event_id: Uuid,
  /// The tag whose story the summary is read in.
  pub story_id: Uuid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
  Next,
  Prev,
}

/// An ordered instance as traversal sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoryEntry {
  pub pointer:     StoryPointer,
  pub story_order: i64,
  /// The summary's cached time.
  pub time:        Option<TimePoint>,
  /// Kind of the story's tag.
  pub kind:        TagKind,
}

/// Walk from `start` in `direction`, or return a window around it when no
/// direction is given. An unknown start yields an empty page.
pub async fn traverse<R: StoryReader>(
  reader: &R,
  start: StoryPointer,
  direction: Option<Direction>,
) -> Result<Vec<StoryPointer>, R::Error> {
  let Some(origin) = reader.entry(start).await? else {
    return Ok(Vec::new());
  };
  let mut seen = HashSet::from([origin.pointer.event_id]);

  match direction {
    Some(direction) => walk(reader, &origin, direction, PAGE_SIZE, &mut seen).await,
    None => {
      let before =
        walk(reader, &origin, Direction::Prev, (PAGE_SIZE - 1) / 2, &mut seen).await?;
      let after_limit = PAGE_SIZE - 1 - before.len();
      let after = walk(reader, &origin, Direction::Next, after_limit, &mut seen).await?;

      let mut window: Vec<StoryPointer> = before.into_iter().rev().collect();
      window.push(origin.pointer);
      window.extend(after);
      Ok(window)
    }
  }
}

/// Where the walk stands inside the current story.
enum Position {
  /// Continue strictly past this order.
  At(i64),
  /// Nothing left here; hop.
  Exhausted,
}

async fn walk<R: StoryReader>(
  reader: &R,
  origin: &StoryEntry,
  direction: Direction,
  limit: usize,
  seen: &mut HashSet<Uuid>,
) -> Result<Vec<StoryPointer>, R::Error> {
  let mut out = Vec::new();
  let mut visited = HashSet::from([origin.pointer.story_id]);
  let mut story = origin.pointer.story_id;
  let mut kind = origin.kind;
  let mut anchor = origin.clone();
  let mut position = Position::At(origin.story_order);

  while out.len() < limit {
    if let Position::At(cursor) = position {
      let want = limit - out.len();
      let page = reader.story_page(story, Some(cursor), direction, want).await?;
      let exhausted = page.len() < want;
      for entry in page {
        position = Position::At(entry.story_order);
        if seen.insert(entry.pointer.event_id) {
          out.push(entry.pointer);
        }
        anchor = entry;
      }
      if !exhausted {
        continue;
      }
    }

    let Some((next_story, next_kind)) =
      related_story(reader, &anchor, story, kind, direction).await?
    else {
      break;
    };
    if !visited.insert(next_story) {
      break;
    }
    tracing::debug!(from = %story, to = %next_story, ?direction, "hopping to related story");
    story = next_story;
    kind = next_kind;

    let entries = reader.story_entries(story).await?;
    position = match locate(&entries, &anchor, direction) {
      Some(entry) if entry.pointer.event_id == anchor.pointer.event_id => {
        Position::At(entry.story_order)
      }
      Some(entry) => {
        if seen.insert(entry.pointer.event_id) && out.len() < limit {
          out.push(entry.pointer);
        }
        let order = entry.story_order;
        anchor = entry.clone();
        Position::At(order)
      }
      None => Position::Exhausted,
    };
  }

  Ok(out)
}

async fn related_story<R: StoryReader>(
  reader: &R,
  anchor: &StoryEntry,
  story: Uuid,
  kind: TagKind,
  direction: Direction,
) -> Result<Option<(Uuid, TagKind)>, R::Error> {
  let event = anchor.pointer.event_id;
  match kind {
    TagKind::Person => {
      if let Some(place) = reader.co_tagged(event, TagKind::Place).await? {
        return Ok(Some((place, TagKind::Place)));
      }
      Ok(reader.co_tagged(event, TagKind::Time).await?.map(|t| (t, TagKind::Time)))
    }
    TagKind::Place => {
      Ok(reader.co_tagged(event, TagKind::Time).await?.map(|t| (t, TagKind::Time)))
    }
    TagKind::Time => Ok(
      reader
        .adjacent_time_tag(story, direction)
        .await?
        .map(|t| (t, TagKind::Time)),
    ),
  }
}

/// The entry of a newly entered story to continue from: the anchor event
/// itself if the story contains it, otherwise the chronologically closest
/// entry in `direction`.
fn locate<'a>(
  entries: &'a [StoryEntry],
  anchor: &StoryEntry,
  direction: Direction,
) -> Option<&'a StoryEntry> {
  if let Some(same) =
    entries.iter().find(|e| e.pointer.event_id == anchor.pointer.event_id)
  {
    return Some(same);
  }
  let target = anchor.time.as_ref();
  match direction {
    Direction::Next => entries
      .iter()
      .find(|e| compare_times(e.time.as_ref(), target) != Ordering::Less),
    Direction::Prev => entries
      .iter()
      .rev()
      .find(|e| compare_times(e.time.as_ref(), target) != Ordering::Greater),
  }
}

/// Missing times sort after every known time.
fn compare_times(a: Option<&TimePoint>, b: Option<&TimePoint>) -> Ordering {
  match (a, b) {
    (Some(a), Some(b)) => a.chrono_cmp(b),
    (Some(_), None) => Ordering::Less,
    (None, Some(_)) => Ordering::Greater,
    (None, None) => Ordering::Equal,
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::time::Precision;

  fn entry(year: i64, order: i64) -> StoryEntry {
    StoryEntry {
      pointer:     StoryPointer { event_id: Uuid::new_v4(), story_id: Uuid::nil() },
      story_order: order,
      time:        Some(TimePoint::new(format!("+{year:04}-01-01T00:00:00Z"), Precision::DAY)),
      kind:        TagKind::Place,
    }
  }

  #[test]
  fn locate_prefers_the_anchor_event() {
    let anchor = entry(1900, 100_000);
    let mut same = entry(1700, 105_000);
    same.pointer.event_id = anchor.pointer.event_id;
    let entries = vec![entry(1800, 100_000), same.clone(), entry(1950, 110_000)];

    let found = locate(&entries, &anchor, Direction::Next).unwrap();
    assert_eq!(found.story_order, 105_000);
  }

  #[test]
  fn locate_finds_closest_in_direction() {
    let anchor = entry(1900, 100_000);
    let entries = vec![entry(1800, 100_000), entry(1900, 101_000), entry(1950, 102_000)];

    assert_eq!(locate(&entries, &anchor, Direction::Next).unwrap().story_order, 101_000);
    assert_eq!(locate(&entries, &anchor, Direction::Prev).unwrap().story_order, 101_000);

    let late = entry(2000, 100_000);
    assert!(locate(&entries, &late, Direction::Next).is_none());
    assert_eq!(locate(&entries, &late, Direction::Prev).unwrap().story_order, 102_000);
  }

  #[test]
  fn undated_sorts_last() {
    let t = TimePoint::new("+1900-01-01T00:00:00Z", Precision::DAY);
    assert_eq!(compare_times(Some(&t), None), Ordering::Less);
    assert_eq!(compare_times(None, None), Ordering::Equal);
  }
}
