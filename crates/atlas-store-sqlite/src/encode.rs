//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as RFC 3339 strings, UUIDs as hyphenated lowercase
//! strings, tag payloads and `after` hints as compact JSON.

use atlas_core::{
  instance::{Summary, TagInstance},
  order::StoryRow,
  story::{StoryEntry, StoryPointer},
  tag::{Tag, TagKind, TagValue},
  time::{Precision, TimePoint},
};
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

/// Read a UUID column inside a `rusqlite` row mapper.
pub fn uuid_column(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<Uuid> {
  let s: String = row.get(idx)?;
  Uuid::parse_str(&s)
    .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── Time ────────────────────────────────────────────────────────────────────

pub fn decode_precision(p: i64) -> Result<Precision> {
  u8::try_from(p)
    .map(Precision)
    .map_err(|_| Error::Decode(format!("precision out of range: {p}")))
}

pub fn decode_time(
  datetime: Option<String>,
  precision: Option<i64>,
) -> Result<Option<TimePoint>> {
  match (datetime, precision) {
    (Some(datetime), Some(precision)) => {
      Ok(Some(TimePoint::new(datetime, decode_precision(precision)?)))
    }
    _ => Ok(None),
  }
}

// ─── After hints ─────────────────────────────────────────────────────────────

pub fn encode_after(after: &[Uuid]) -> Result<Option<String>> {
  if after.is_empty() {
    return Ok(None);
  }
  Ok(Some(serde_json::to_string(after)?))
}

pub fn decode_after(s: Option<&str>) -> Result<Vec<Uuid>> {
  match s {
    Some(s) => Ok(serde_json::from_str(s)?),
    None => Ok(Vec::new()),
  }
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw strings read directly from a `tags` row.
pub struct RawTag {
  pub tag_id:     String,
  pub kind:       String,
  pub value_json: String,
}

impl RawTag {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      tag_id:     row.get(0)?,
      kind:       row.get(1)?,
      value_json: row.get(2)?,
    })
  }

  pub fn into_tag(self) -> Result<Tag> {
    let kind = TagKind::parse(&self.kind)?;
    let data: serde_json::Value = serde_json::from_str(&self.value_json)?;
    Ok(Tag {
      tag_id: decode_uuid(&self.tag_id)?,
      value:  TagValue::from_parts(kind, data)?,
    })
  }
}

/// Raw values read directly from a `summaries` row.
pub struct RawSummary {
  pub summary_id:     String,
  pub text:           String,
  pub citation:       Option<String>,
  pub time_datetime:  Option<String>,
  pub time_precision: Option<i64>,
  pub created_at:     String,
}

impl RawSummary {
  pub fn into_summary(self) -> Result<Summary> {
    Ok(Summary {
      summary_id: decode_uuid(&self.summary_id)?,
      text:       self.text,
      citation:   self.citation,
      time:       decode_time(self.time_datetime, self.time_precision)?,
      created_at: decode_dt(&self.created_at)?,
    })
  }
}

/// Raw values read directly from a `tag_instances` row.
pub struct RawInstance {
  pub instance_id: String,
  pub tag_id:      String,
  pub summary_id:  String,
  pub start_char:  i64,
  pub stop_char:   i64,
  pub story_order: Option<i64>,
  pub after_json:  Option<String>,
}

impl RawInstance {
  pub const COLUMNS: &'static str =
    "instance_id, tag_id, summary_id, start_char, stop_char, story_order, after_json";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      instance_id: row.get(0)?,
      tag_id:      row.get(1)?,
      summary_id:  row.get(2)?,
      start_char:  row.get(3)?,
      stop_char:   row.get(4)?,
      story_order: row.get(5)?,
      after_json:  row.get(6)?,
    })
  }

  pub fn into_instance(self) -> Result<TagInstance> {
    let span = |v: i64| {
      u32::try_from(v).map_err(|_| Error::Decode(format!("character offset out of range: {v}")))
    };
    Ok(TagInstance {
      instance_id: decode_uuid(&self.instance_id)?,
      tag_id:      decode_uuid(&self.tag_id)?,
      summary_id:  decode_uuid(&self.summary_id)?,
      start_char:  span(self.start_char)?,
      stop_char:   span(self.stop_char)?,
      story_order: self.story_order,
      after:       decode_after(self.after_json.as_deref())?,
    })
  }
}

/// An instance joined with its summary's cached time, as loaded for the
/// ordering algorithms.
pub struct RawStoryRow {
  pub instance_id:    Uuid,
  pub summary_id:     Uuid,
  pub story_order:    Option<i64>,
  pub time_datetime:  Option<String>,
  pub time_precision: Option<i64>,
  pub after_json:     Option<String>,
}

impl RawStoryRow {
  /// Fails with `MissingTime` when the summary has no cached time.
  pub fn into_story_row(self) -> Result<StoryRow> {
    let time = decode_time(self.time_datetime, self.time_precision)?
      .ok_or(atlas_core::Error::MissingTime(self.summary_id))?;
    Ok(StoryRow {
      instance_id: self.instance_id,
      summary_id: self.summary_id,
      story_order: self.story_order,
      time,
      after: decode_after(self.after_json.as_deref())?,
    })
  }
}

/// One ordered instance read for traversal.
pub struct RawEntry {
  pub summary_id:     String,
  pub story_order:    i64,
  pub time_datetime:  Option<String>,
  pub time_precision: Option<i64>,
  pub kind:           String,
}

impl RawEntry {
  pub const COLUMNS: &'static str =
    "i.summary_id, i.story_order, s.time_datetime, s.time_precision, t.kind";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      summary_id:     row.get(0)?,
      story_order:    row.get(1)?,
      time_datetime:  row.get(2)?,
      time_precision: row.get(3)?,
      kind:           row.get(4)?,
    })
  }

  pub fn into_entry(self, story_id: Uuid) -> Result<StoryEntry> {
    Ok(StoryEntry {
      pointer:     StoryPointer { event_id: decode_uuid(&self.summary_id)?, story_id },
      story_order: self.story_order,
      time:        decode_time(self.time_datetime, self.time_precision)?,
      kind:        TagKind::parse(&self.kind)?,
    })
  }
}
