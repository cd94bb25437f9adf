//! [`SqliteStore`] — the SQLite implementation of the atlas store traits.

use std::{
  path::Path,
  sync::{Arc, Mutex},
  time::Duration,
};

use atlas_core::{
  instance::{NewSummary, NewTagInstance, Summary, TagInstance},
  order::OrderConfig,
  recent::{CacheConfig, RecentCache},
  store::{AtlasStore, Backend},
  tag::{Tag, TagKind, TagValue},
  time::TimePoint,
};
use chrono::Utc;
use rusqlite::OptionalExtension as _;
use serde::Deserialize;
use uuid::Uuid;

use crate::{
  Error, Result,
  encode::{RawInstance, RawSummary, RawTag, encode_after, encode_dt, encode_uuid, uuid_column},
  ordering::{RebalanceMode, allocate_in, rebalance_in, tag_exists, with_transaction},
  schema::SCHEMA,
};

// ─── Configuration ───────────────────────────────────────────────────────────

/// Tunables for a [`SqliteStore`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
  pub order: OrderConfig,
  pub cache: CacheConfig,
}

/// What the store remembers about a recently seen id.
#[derive(Debug, Clone)]
enum Known {
  Tag { kind: TagKind, time: Option<TimePoint> },
  Summary,
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// A History Atlas store backed by a single SQLite file.
///
/// Cloning is cheap; the connection and cache are reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  pub(crate) conn:   tokio_rusqlite::Connection,
  pub(crate) config: StoreConfig,
  recent:            Arc<Mutex<RecentCache<Uuid, Known>>>,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    Self::open_with(path, StoreConfig::default()).await
  }

  pub async fn open_with(path: impl AsRef<Path>, config: StoreConfig) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    Self::init(conn, config).await
  }

  /// Open an in-memory store.
  pub async fn open_in_memory() -> Result<Self> {
    Self::open_in_memory_with(StoreConfig::default()).await
  }

  pub async fn open_in_memory_with(config: StoreConfig) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    Self::init(conn, config).await
  }

  async fn init(conn: tokio_rusqlite::Connection, config: StoreConfig) -> Result<Self> {
    let store = Self {
      conn,
      config,
      recent: Arc::new(Mutex::new(RecentCache::new(config.cache))),
    };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        // Backfill workers write concurrently; wait for the lock instead of
        // failing with SQLITE_BUSY.
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  pub fn config(&self) -> &StoreConfig { &self.config }

  fn recall(&self, id: Uuid) -> Option<Known> {
    self.recent.lock().ok().and_then(|mut cache| cache.get(&id))
  }

  fn remember(&self, id: Uuid, known: Known) {
    if let Ok(mut cache) = self.recent.lock() {
      cache.insert(id, known);
    }
  }
}

// ─── Write-path helpers ──────────────────────────────────────────────────────

/// Kind and (for TIME tags) time point of a stored tag.
fn tag_header(
  conn: &rusqlite::Connection,
  tag_id: Uuid,
) -> Result<Option<(TagKind, Option<TimePoint>)>> {
  let raw = conn
    .query_row(
      "SELECT tag_id, kind, value_json FROM tags WHERE tag_id = ?1",
      rusqlite::params![encode_uuid(tag_id)],
      RawTag::from_row,
    )
    .optional()?;
  raw
    .map(|raw| raw.into_tag().map(|tag| (tag.kind(), tag.value.time_point())))
    .transpose()
}

fn summary_exists(conn: &rusqlite::Connection, summary_id: Uuid) -> Result<bool> {
  Ok(
    conn
      .query_row(
        "SELECT 1 FROM summaries WHERE summary_id = ?1",
        rusqlite::params![encode_uuid(summary_id)],
        |_| Ok(true),
      )
      .optional()?
      .unwrap_or(false),
  )
}

fn summary_time(conn: &rusqlite::Connection, summary_id: Uuid) -> Result<Option<TimePoint>> {
  let (datetime, precision): (Option<String>, Option<i64>) = conn.query_row(
    "SELECT time_datetime, time_precision FROM summaries WHERE summary_id = ?1",
    rusqlite::params![encode_uuid(summary_id)],
    |row| Ok((row.get(0)?, row.get(1)?)),
  )?;
  crate::encode::decode_time(datetime, precision)
}

/// The TIME tag a summary is already dated by, if any.
fn dating_tag(conn: &rusqlite::Connection, summary_id: Uuid) -> Result<Option<Uuid>> {
  Ok(
    conn
      .query_row(
        "SELECT ti.tag_id FROM tag_instances ti
         JOIN tags t ON t.tag_id = ti.tag_id
         WHERE ti.summary_id = ?1 AND t.kind = 'TIME'
         LIMIT 1",
        rusqlite::params![encode_uuid(summary_id)],
        |row| uuid_column(row, 0),
      )
      .optional()?,
  )
}

fn cache_summary_time(
  conn: &rusqlite::Connection,
  summary_id: Uuid,
  time: &TimePoint,
) -> Result<()> {
  conn.execute(
    "UPDATE summaries SET time_datetime = ?2, time_precision = ?3 WHERE summary_id = ?1",
    rusqlite::params![
      encode_uuid(summary_id),
      time.datetime,
      i64::from(time.precision.0)
    ],
  )?;
  Ok(())
}

// ─── Trait impls ─────────────────────────────────────────────────────────────

impl Backend for SqliteStore {
  type Error = Error;
}

impl AtlasStore for SqliteStore {
  // ── Tags ──────────────────────────────────────────────────────────────────

  async fn add_tag(&self, value: TagValue) -> Result<Tag> {
    let tag = Tag { tag_id: Uuid::new_v4(), value };

    let id_str     = encode_uuid(tag.tag_id);
    let kind_str   = tag.kind().as_str();
    let value_json = tag.value.to_json()?.to_string();
    let at_str     = encode_dt(Utc::now());
    let time       = tag.value.time_point();
    let (year, rest, precision) = match &time {
      Some(t) => {
        let (year, rest) = t.sort_key().sql_columns();
        (Some(year), Some(rest), Some(i64::from(t.precision.0)))
      }
      None => (None, None, None),
    };

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO tags (
             tag_id, kind, value_json, created_at, time_year, time_rest, time_precision
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
          rusqlite::params![id_str, kind_str, value_json, at_str, year, rest, precision],
        )?;
        Ok(())
      })
      .await?;

    self.remember(tag.tag_id, Known::Tag { kind: tag.kind(), time });
    Ok(tag)
  }

  async fn get_tag(&self, id: Uuid) -> Result<Option<Tag>> {
    let id_str = encode_uuid(id);

    let raw: Option<RawTag> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT tag_id, kind, value_json FROM tags WHERE tag_id = ?1",
              rusqlite::params![id_str],
              RawTag::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawTag::into_tag).transpose()
  }

  async fn list_tags(&self, kind: Option<TagKind>) -> Result<Vec<Tag>> {
    let kind_str = kind.map(|k| k.as_str());

    let raws: Vec<RawTag> = self
      .conn
      .call(move |conn| {
        let rows = if let Some(k) = kind_str {
          let mut stmt = conn.prepare(
            "SELECT tag_id, kind, value_json FROM tags WHERE kind = ?1 ORDER BY created_at",
          )?;
          stmt
            .query_map(rusqlite::params![k], RawTag::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?
        } else {
          let mut stmt = conn
            .prepare("SELECT tag_id, kind, value_json FROM tags ORDER BY created_at")?;
          stmt
            .query_map([], RawTag::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?
        };
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawTag::into_tag).collect()
  }

  // ── Summaries ─────────────────────────────────────────────────────────────

  async fn add_summary(&self, input: NewSummary) -> Result<Summary> {
    let summary = Summary {
      summary_id: Uuid::new_v4(),
      text:       input.text,
      citation:   input.citation,
      time:       None,
      created_at: Utc::now(),
    };

    let id_str   = encode_uuid(summary.summary_id);
    let text     = summary.text.clone();
    let citation = summary.citation.clone();
    let at_str   = encode_dt(summary.created_at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO summaries (summary_id, text, citation, created_at)
           VALUES (?1, ?2, ?3, ?4)",
          rusqlite::params![id_str, text, citation, at_str],
        )?;
        Ok(())
      })
      .await?;

    self.remember(summary.summary_id, Known::Summary);
    Ok(summary)
  }

  async fn get_summary(&self, id: Uuid) -> Result<Option<Summary>> {
    let id_str = encode_uuid(id);

    let raw: Option<RawSummary> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT summary_id, text, citation, time_datetime, time_precision, created_at
               FROM summaries WHERE summary_id = ?1",
              rusqlite::params![id_str],
              |row| {
                Ok(RawSummary {
                  summary_id:     row.get(0)?,
                  text:           row.get(1)?,
                  citation:       row.get(2)?,
                  time_datetime:  row.get(3)?,
                  time_precision: row.get(4)?,
                  created_at:     row.get(5)?,
                })
              },
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawSummary::into_summary).transpose()
  }

  // ── Tag instances ─────────────────────────────────────────────────────────

  async fn add_tag_instance(&self, input: NewTagInstance) -> Result<TagInstance> {
    let tag_hint = match self.recall(input.tag_id) {
      Some(Known::Tag { kind, time }) => Some((kind, time)),
      _ => None,
    };
    let summary_known = matches!(self.recall(input.summary_id), Some(Known::Summary));

    let instance_id = Uuid::new_v4();
    let after_json = encode_after(&input.after)?;
    let config = self.config.order;
    let NewTagInstance { tag_id, summary_id, start_char, stop_char, after } = input;

    let hints = after.clone();
    let (story_order, kind, tag_time) = self
      .conn
      .call(move |conn| {
        with_transaction(conn, |tx| {
          let (kind, tag_time) = match tag_hint {
            Some(hint) => hint,
            None => tag_header(tx, tag_id)?.ok_or(atlas_core::Error::TagNotFound(tag_id))?,
          };
          if !summary_known && !summary_exists(tx, summary_id)? {
            return Err(atlas_core::Error::SummaryNotFound(summary_id).into());
          }
          if let Some(time) = &tag_time {
            match dating_tag(tx, summary_id)? {
              Some(time_tag) if time_tag != tag_id => {
                return Err(atlas_core::Error::AlreadyDated { summary_id, time_tag }.into());
              }
              Some(_) => {}
              None => cache_summary_time(tx, summary_id, time)?,
            }
          }
          let time =
            summary_time(tx, summary_id)?.ok_or(atlas_core::Error::MissingTime(summary_id))?;

          let order = match allocate_in(tx, tag_id, &time, &hints, &config) {
            Ok(value) => Some(value),
            Err(Error::Core(atlas_core::Error::Overflow { below, above, .. })) => {
              tracing::warn!(%tag_id, below, above, "story order overflow; rebalancing");
              None
            }
            Err(e) => return Err(e),
          };

          tx.execute(
            "INSERT INTO tag_instances (
               instance_id, tag_id, summary_id, start_char, stop_char, story_order, after_json
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            rusqlite::params![
              encode_uuid(instance_id),
              encode_uuid(tag_id),
              encode_uuid(summary_id),
              i64::from(start_char),
              i64::from(stop_char),
              order,
              after_json,
            ],
          )?;

          let story_order = match order {
            Some(value) => value,
            None => {
              rebalance_in(tx, tag_id, &config, RebalanceMode::Chronological)?;
              tx.query_row(
                "SELECT story_order FROM tag_instances WHERE instance_id = ?1",
                rusqlite::params![encode_uuid(instance_id)],
                |row| row.get(0),
              )?
            }
          };
          Ok((story_order, kind, tag_time))
        })
      })
      .await??;

    self.remember(tag_id, Known::Tag { kind, time: tag_time });
    self.remember(summary_id, Known::Summary);

    Ok(TagInstance {
      instance_id,
      tag_id,
      summary_id,
      start_char,
      stop_char,
      story_order: Some(story_order),
      after,
    })
  }

  async fn story(&self, tag_id: Uuid) -> Result<Vec<TagInstance>> {
    let raws = self
      .conn
      .call(move |conn| {
        match tag_exists(conn, tag_id) {
          Ok(true) => {}
          Ok(false) => return Ok(Err(atlas_core::Error::TagNotFound(tag_id).into())),
          Err(e) => return Ok(Err(e)),
        }
        let sql = format!(
          "SELECT {} FROM tag_instances WHERE tag_id = ?1
           ORDER BY story_order IS NULL, story_order, instance_id",
          RawInstance::COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(rusqlite::params![encode_uuid(tag_id)], RawInstance::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(Ok(rows))
      })
      .await??;

    raws.into_iter().map(RawInstance::into_instance).collect()
  }
}
