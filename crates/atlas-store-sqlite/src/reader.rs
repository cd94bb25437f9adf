//! Traversal reads: range queries on `story_order` and the joins that find a
//! related story.

use atlas_core::{
  story::{Direction, StoryEntry, StoryPointer},
  store::StoryReader,
  tag::TagKind,
};
use rusqlite::OptionalExtension as _;
use uuid::Uuid;

use crate::{
  Result, SqliteStore,
  encode::{RawEntry, encode_uuid, uuid_column},
};

const ENTRY_FROM: &str = "FROM tag_instances i
   JOIN summaries s ON s.summary_id = i.summary_id
   JOIN tags t      ON t.tag_id     = i.tag_id";

impl SqliteStore {
  async fn entries(
    &self,
    story_id: Uuid,
    sql: String,
    bound: Option<(i64, i64)>,
  ) -> Result<Vec<StoryEntry>> {
    let story = encode_uuid(story_id);
    let raws = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare_cached(&sql)?;
        let rows = match bound {
          Some((from, limit)) => stmt
            .query_map(rusqlite::params![story, from, limit], RawEntry::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?,
          None => stmt
            .query_map(rusqlite::params![story], RawEntry::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?,
        };
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(|raw| raw.into_entry(story_id)).collect()
  }
}

impl StoryReader for SqliteStore {
  async fn entry(&self, pointer: StoryPointer) -> Result<Option<StoryEntry>> {
    let story = encode_uuid(pointer.story_id);
    let event = encode_uuid(pointer.event_id);
    let sql = format!(
      "SELECT {} {ENTRY_FROM}
       WHERE i.tag_id = ?1 AND i.summary_id = ?2 AND i.story_order IS NOT NULL
       ORDER BY i.story_order LIMIT 1",
      RawEntry::COLUMNS
    );

    let raw = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(&sql, rusqlite::params![story, event], RawEntry::from_row)
            .optional()?,
        )
      })
      .await?;

    raw.map(|raw| raw.into_entry(pointer.story_id)).transpose()
  }

  async fn story_page(
    &self,
    story_id: Uuid,
    from: Option<i64>,
    direction: Direction,
    limit: usize,
  ) -> Result<Vec<StoryEntry>> {
    let (cmp, sort, edge) = match direction {
      Direction::Next => (">", "ASC", i64::MIN),
      Direction::Prev => ("<", "DESC", i64::MAX),
    };
    let sql = format!(
      "SELECT {} {ENTRY_FROM}
       WHERE i.tag_id = ?1 AND i.story_order {cmp} ?2
       ORDER BY i.story_order {sort} LIMIT ?3",
      RawEntry::COLUMNS
    );
    let limit = i64::try_from(limit).unwrap_or(i64::MAX);
    self.entries(story_id, sql, Some((from.unwrap_or(edge), limit))).await
  }

  async fn story_entries(&self, story_id: Uuid) -> Result<Vec<StoryEntry>> {
    let sql = format!(
      "SELECT {} {ENTRY_FROM}
       WHERE i.tag_id = ?1 AND i.story_order IS NOT NULL
       ORDER BY i.story_order",
      RawEntry::COLUMNS
    );
    self.entries(story_id, sql, None).await
  }

  async fn co_tagged(&self, summary_id: Uuid, kind: TagKind) -> Result<Option<Uuid>> {
    let summary = encode_uuid(summary_id);
    let kind = kind.as_str();

    let id = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT i.tag_id FROM tag_instances i
               JOIN tags t ON t.tag_id = i.tag_id
               WHERE i.summary_id = ?1 AND t.kind = ?2
               ORDER BY i.start_char, i.tag_id
               LIMIT 1",
              rusqlite::params![summary, kind],
              |row| uuid_column(row, 0),
            )
            .optional()?,
        )
      })
      .await?;
    Ok(id)
  }

  async fn adjacent_time_tag(
    &self,
    time_tag_id: Uuid,
    direction: Direction,
  ) -> Result<Option<Uuid>> {
    let tag = encode_uuid(time_tag_id);
    // Ties on the instant go finer precision first, hence the negation.
    let sql = match direction {
      Direction::Next => {
        "SELECT tag_id FROM tags
         WHERE kind = 'TIME' AND time_year IS NOT NULL
           AND (time_year, time_rest, -time_precision, tag_id) > (?1, ?2, ?3, ?4)
         ORDER BY time_year, time_rest, -time_precision, tag_id
         LIMIT 1"
      }
      Direction::Prev => {
        "SELECT tag_id FROM tags
         WHERE kind = 'TIME' AND time_year IS NOT NULL
           AND (time_year, time_rest, -time_precision, tag_id) < (?1, ?2, ?3, ?4)
         ORDER BY time_year DESC, time_rest DESC, -time_precision DESC, tag_id DESC
         LIMIT 1"
      }
    };

    let id = self
      .conn
      .call(move |conn| {
        let key: Option<(i64, i64, i64)> = conn
          .query_row(
            "SELECT time_year, time_rest, -time_precision FROM tags
             WHERE tag_id = ?1 AND kind = 'TIME' AND time_year IS NOT NULL",
            rusqlite::params![tag],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
          )
          .optional()?;
        let Some((year, rest, precision)) = key else {
          return Ok(None);
        };
        Ok(
          conn
            .query_row(
              sql,
              rusqlite::params![year, rest, precision, tag],
              |row| uuid_column(row, 0),
            )
            .optional()?,
        )
      })
      .await?;
    Ok(id)
  }
}
