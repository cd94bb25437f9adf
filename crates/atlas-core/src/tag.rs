//! Tags: the people, places and times that stories are told about.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  Error, Result,
  time::{Precision, TimePoint},
};

/// The kind of entity a tag represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TagKind {
  Person,
  Place,
  Time,
}

impl TagKind {
  /// The discriminant string stored in the `kind` column.
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Person => "PERSON",
      Self::Place => "PLACE",
      Self::Time => "TIME",
    }
  }

  pub fn parse(s: &str) -> Result<Self> {
    match s {
      "PERSON" => Ok(Self::Person),
      "PLACE" => Ok(Self::Place),
      "TIME" => Ok(Self::Time),
      other => Err(Error::UnknownTagKind(other.to_owned())),
    }
  }
}

// ─── Payloads ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonValue {
  /// Every known name; the first is the display name.
  pub names: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaceValue {
  pub name:      String,
  pub latitude:  f64,
  pub longitude: f64,
  /// Optional GeoJSON outline.
  pub geoshape:  Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeValue {
  pub name:           String,
  /// Signed ISO-like datetime, e.g. `-0578-00-00T00:00:00Z`.
  pub datetime:       String,
  /// Calendar model URI (Gregorian or Julian).
  pub calendar_model: String,
  pub precision:      Precision,
}

/// The typed payload of a tag. The variant is the tag's kind and never
/// changes after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "UPPERCASE")]
pub enum TagValue {
  Person(PersonValue),
  Place(PlaceValue),
  Time(TimeValue),
}

impl TagValue {
  pub fn kind(&self) -> TagKind {
    match self {
      Self::Person(_) => TagKind::Person,
      Self::Place(_) => TagKind::Place,
      Self::Time(_) => TagKind::Time,
    }
  }

  /// Human-readable label used in story headers.
  pub fn display_name(&self) -> &str {
    match self {
      Self::Person(p) => p.names.first().map(String::as_str).unwrap_or(""),
      Self::Place(p) => &p.name,
      Self::Time(t) => &t.name,
    }
  }

  /// The point in time a TIME tag stands for.
  pub fn time_point(&self) -> Option<TimePoint> {
    match self {
      Self::Time(t) => Some(TimePoint::new(t.datetime.clone(), t.precision)),
      _ => None,
    }
  }

  /// Serialise the inner payload (without the type tag) for the `value_json`
  /// database column.
  pub fn to_json(&self) -> Result<serde_json::Value> {
    let full = serde_json::to_value(self)?;
    Ok(full.get("data").cloned().unwrap_or(serde_json::Value::Null))
  }

  /// Deserialise from the kind and JSON payload stored in the database.
  pub fn from_parts(kind: TagKind, data: serde_json::Value) -> Result<Self> {
    let wrapped = serde_json::json!({ "type": kind.as_str(), "data": data });
    Ok(serde_json::from_value(wrapped)?)
  }
}

/// A person, place or time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tag {
  pub tag_id: Uuid,
  pub value:  TagValue,
}

impl Tag {
  pub fn kind(&self) -> TagKind { self.value.kind() }
}
