//! The time comparator: a total order over `(datetime, precision)` pairs.
//!
//! Datetimes arrive as signed ISO-like strings in the Wikidata shape
//! `±YYYY-MM-DDTHH:MM:SSZ`. Any field may be zeroed to mean "unknown at this
//! precision", so `+0079-00-00T00:00:00Z` is simply "the year 79". Parsing
//! never fails: it degrades through full timestamp, date, year-month and
//! year, and anything else sorts after every dated value.

use std::cmp::{Ordering, Reverse};

use serde::{Deserialize, Serialize};

// ─── Precision ───────────────────────────────────────────────────────────────

/// Wikidata time precision. Larger is finer: 9 = year, 10 = month, 11 = day,
/// 14 = second.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Precision(pub u8);

impl Precision {
  pub const YEAR: Self = Self(9);
  pub const MONTH: Self = Self(10);
  pub const DAY: Self = Self(11);
  pub const SECOND: Self = Self(14);
}

// ─── Sort key ────────────────────────────────────────────────────────────────

/// The numeric components of a parsed datetime. Field order is the
/// comparison order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DateParts {
  pub year:   i64,
  pub month:  u8,
  pub day:    u8,
  pub hour:   u8,
  pub minute: u8,
  pub second: u8,
}

/// Result of [`parse_date_for_sorting`]. `Undated` sorts after every dated
/// key (variant order).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SortKey {
  Dated(DateParts),
  Undated,
}

impl SortKey {
  /// Two integer columns that sort exactly like the key in SQL:
  /// `(year, packed month..second)`. Undated keys map to `i64::MAX`.
  pub fn sql_columns(&self) -> (i64, i64) {
    match self {
      Self::Dated(p) => {
        let rest = i64::from(p.month) * 100_000_000
          + i64::from(p.day) * 1_000_000
          + i64::from(p.hour) * 10_000
          + i64::from(p.minute) * 100
          + i64::from(p.second);
        (p.year, rest)
      }
      Self::Undated => (i64::MAX, i64::MAX),
    }
  }

  pub fn year(&self) -> Option<i64> {
    match self {
      Self::Dated(p) => Some(p.year),
      Self::Undated => None,
    }
  }
}

/// Parse a signed datetime string into a sort key.
///
/// A leading `-` makes the year negative; `+` or no sign keeps it positive.
/// The magnitude is used as written, so `-0001` is year `-1`.
pub fn parse_date_for_sorting(input: &str) -> SortKey {
  let s = input.trim();
  let (negative, unsigned) = match s.as_bytes().first() {
    Some(b'-') => (true, &s[1..]),
    Some(b'+') => (false, &s[1..]),
    _ => (false, s),
  };

  let (date, time) = match unsigned.split_once('T') {
    Some((d, t)) => (d, Some(t)),
    None => (unsigned, None),
  };

  let mut fields = date.split('-');
  let Some(year) = fields.next().and_then(|y| parse_num::<i64>(y)) else {
    return SortKey::Undated;
  };

  let mut parts = DateParts {
    year: if negative { -year } else { year },
    month: 0,
    day: 0,
    hour: 0,
    minute: 0,
    second: 0,
  };

  // Year-month, then full date. A field that fails to parse ends the walk
  // and keeps whatever was already understood.
  let Some(month) = fields.next().and_then(parse_num::<u8>) else {
    return SortKey::Dated(parts);
  };
  parts.month = month;
  let Some(day) = fields.next().and_then(parse_num::<u8>) else {
    return SortKey::Dated(parts);
  };
  parts.day = day;

  if let Some(time) = time {
    let clock = time.trim_end_matches('Z');
    let hms: Vec<Option<u8>> = clock.split(':').map(parse_num::<u8>).collect();
    if let [Some(h), Some(m), Some(sec)] = hms.as_slice() {
      parts.hour = *h;
      parts.minute = *m;
      parts.second = *sec;
    }
  }

  SortKey::Dated(parts)
}

fn parse_num<T: std::str::FromStr>(s: &str) -> Option<T> {
  if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
    return None;
  }
  s.parse().ok()
}

// ─── TimePoint ───────────────────────────────────────────────────────────────

/// A datetime string together with its precision, the thing every story is
/// sorted by.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimePoint {
  pub datetime:  String,
  pub precision: Precision,
}

impl TimePoint {
  pub fn new(datetime: impl Into<String>, precision: Precision) -> Self {
    Self { datetime: datetime.into(), precision }
  }

  pub fn sort_key(&self) -> SortKey { parse_date_for_sorting(&self.datetime) }

  /// Full comparison key: datetime first, then finer precision first.
  pub fn order_key(&self) -> (SortKey, Reverse<Precision>) {
    (self.sort_key(), Reverse(self.precision))
  }

  /// Chronological comparison under the time comparator.
  pub fn chrono_cmp(&self, other: &Self) -> Ordering {
    self.order_key().cmp(&other.order_key())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn dated(year: i64, month: u8, day: u8) -> SortKey {
    SortKey::Dated(DateParts { year, month, day, hour: 0, minute: 0, second: 0 })
  }

  #[test]
  fn parses_full_timestamp() {
    let key = parse_date_for_sorting("+1969-07-20T20:17:40Z");
    assert_eq!(
      key,
      SortKey::Dated(DateParts {
        year:   1969,
        month:  7,
        day:    20,
        hour:   20,
        minute: 17,
        second: 40,
      })
    );
  }

  #[test]
  fn parses_bce_year() {
    let key = parse_date_for_sorting("-0578-00-00T00:00:00Z");
    assert_eq!(key.year(), Some(-578));
    assert!(key < parse_date_for_sorting("+0079-06-24T00:00:00Z"));
  }

  #[test]
  fn degrades_through_levels() {
    assert_eq!(parse_date_for_sorting("+1066-10-14"), dated(1066, 10, 14));
    assert_eq!(parse_date_for_sorting("1066-10"), dated(1066, 10, 0));
    assert_eq!(parse_date_for_sorting("1066"), dated(1066, 0, 0));
    assert_eq!(parse_date_for_sorting("1066-xx-14"), dated(1066, 0, 0));
    assert_eq!(parse_date_for_sorting("+1066-10-14Tnoon"), dated(1066, 10, 14));
  }

  #[test]
  fn unparseable_sorts_last() {
    assert_eq!(parse_date_for_sorting(""), SortKey::Undated);
    assert_eq!(parse_date_for_sorting("circa spring"), SortKey::Undated);
    assert!(parse_date_for_sorting("+9999-12-31T23:59:59Z") < SortKey::Undated);
  }

  #[test]
  fn finer_precision_sorts_first_on_tie() {
    let day = TimePoint::new("+1815-06-18T00:00:00Z", Precision::DAY);
    let year = TimePoint::new("+1815-06-18T00:00:00Z", Precision::YEAR);
    assert_eq!(day.chrono_cmp(&year), Ordering::Less);
    assert_eq!(year.chrono_cmp(&day), Ordering::Greater);
    assert_eq!(day.chrono_cmp(&day.clone()), Ordering::Equal);
  }

  #[test]
  fn sql_columns_preserve_order() {
    let keys = [
      parse_date_for_sorting("-0044-03-15T00:00:00Z"),
      parse_date_for_sorting("+0001-01-01T00:00:00Z"),
      parse_date_for_sorting("+1492-10-12T00:00:00Z"),
      parse_date_for_sorting("+1492-10-12T08:30:00Z"),
      SortKey::Undated,
    ];
    for pair in keys.windows(2) {
      assert!(pair[0] < pair[1]);
      assert!(pair[0].sql_columns() < pair[1].sql_columns());
    }
  }
}
