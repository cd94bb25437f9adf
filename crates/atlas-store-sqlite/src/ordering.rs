//! Story-order maintenance: the SQL side of gap insertion, renumbering and
//! backfill.
//!
//! The synchronous helpers take a `&Connection` (a `Transaction` derefs to
//! one) and are composed inside [`with_transaction`] so each public operation
//! touches one tag in exactly one transaction.

use atlas_core::{
  order::{
    OrderConfig, Renumbering, Slot, StoryLayout, Verification, dependency_order,
    sort_chronologically, verify_story,
  },
  store::{StoryOrdering, TagBackfill},
  time::TimePoint,
};
use rusqlite::{Connection, OptionalExtension as _, Transaction, TransactionBehavior};
use uuid::Uuid;

use crate::{
  Error, Result, SqliteStore,
  encode::{RawStoryRow, encode_uuid, uuid_column},
};

// ─── Transactions ────────────────────────────────────────────────────────────

/// Run `f` in a transaction, committing only if it succeeds. A failed `f`
/// drops the transaction, which rolls it back.
///
/// Takes the write lock at `BEGIN`, so writers on other connections queue on
/// the busy timeout.
pub(crate) fn with_transaction<T>(
  conn: &mut Connection,
  f: impl FnOnce(&Transaction<'_>) -> Result<T>,
) -> tokio_rusqlite::Result<Result<T>> {
  let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
  match f(&tx) {
    Ok(value) => {
      tx.commit()?;
      Ok(Ok(value))
    }
    Err(e) => Ok(Err(e)),
  }
}

// ─── Loading ─────────────────────────────────────────────────────────────────

/// Every instance of a tag with its summary's time: ordered rows by
/// `story_order`, then unordered rows.
pub(crate) fn load_story_rows(
  conn: &Connection,
  tag_id: Uuid,
) -> Result<Vec<atlas_core::order::StoryRow>> {
  let mut stmt = conn.prepare_cached(
    "SELECT i.instance_id, i.summary_id, i.story_order,
            s.time_datetime, s.time_precision, i.after_json
     FROM tag_instances i
     JOIN summaries s ON s.summary_id = i.summary_id
     WHERE i.tag_id = ?1
     ORDER BY i.story_order IS NULL, i.story_order, i.instance_id",
  )?;
  let raws = stmt
    .query_map(rusqlite::params![encode_uuid(tag_id)], |row| {
      Ok(RawStoryRow {
        instance_id:    uuid_column(row, 0)?,
        summary_id:     uuid_column(row, 1)?,
        story_order:    row.get(2)?,
        time_datetime:  row.get(3)?,
        time_precision: row.get(4)?,
        after_json:     row.get(5)?,
      })
    })?
    .collect::<rusqlite::Result<Vec<_>>>()?;

  raws.into_iter().map(RawStoryRow::into_story_row).collect()
}

pub(crate) fn tag_exists(conn: &Connection, tag_id: Uuid) -> Result<bool> {
  Ok(
    conn
      .query_row(
        "SELECT 1 FROM tags WHERE tag_id = ?1",
        rusqlite::params![encode_uuid(tag_id)],
        |_| Ok(true),
      )
      .optional()?
      .unwrap_or(false),
  )
}

// ─── Writing ─────────────────────────────────────────────────────────────────

pub(crate) fn set_order(
  conn: &Connection,
  instance_id: Uuid,
  order: Option<i64>,
) -> Result<()> {
  conn
    .prepare_cached("UPDATE tag_instances SET story_order = ?2 WHERE instance_id = ?1")?
    .execute(rusqlite::params![encode_uuid(instance_id), order])?;
  Ok(())
}

/// Apply both steps of a renumbering.
pub(crate) fn apply_renumbering(conn: &Connection, plan: &Renumbering) -> Result<()> {
  for (id, staged) in plan.staged() {
    set_order(conn, id, Some(staged))?;
  }
  for &(id, value) in plan.finals() {
    set_order(conn, id, Some(value))?;
  }
  Ok(())
}

/// Shift every order `>= from` in one tag up by one, passing through
/// negative staging values so no intermediate row collides.
pub(crate) fn reserve_gap_in(conn: &Connection, tag_id: Uuid, from: i64) -> Result<usize> {
  let tag = encode_uuid(tag_id);
  let moved = conn.execute(
    "UPDATE tag_instances SET story_order = -story_order - 1
     WHERE tag_id = ?1 AND story_order >= ?2",
    rusqlite::params![tag, from],
  )?;
  conn.execute(
    "UPDATE tag_instances SET story_order = -story_order
     WHERE tag_id = ?1 AND story_order < 0",
    rusqlite::params![tag],
  )?;
  Ok(moved)
}

// ─── Operations ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RebalanceMode {
  /// Time comparator only.
  Chronological,
  /// `after` hints first, time comparator among ready rows.
  DependencyAware,
}

pub(crate) fn rebalance_in(
  conn: &Connection,
  tag_id: Uuid,
  config: &OrderConfig,
  mode: RebalanceMode,
) -> Result<usize> {
  let mut rows = load_story_rows(conn, tag_id)?;
  let ids: Vec<Uuid> = match mode {
    RebalanceMode::Chronological => {
      sort_chronologically(&mut rows);
      rows.iter().map(|r| r.instance_id).collect()
    }
    RebalanceMode::DependencyAware => dependency_order(tag_id, &rows)?
      .into_iter()
      .map(|i| rows[i].instance_id)
      .collect(),
  };

  let plan = Renumbering::new(ids, config);
  apply_renumbering(conn, &plan)?;
  Ok(plan.len())
}

/// Plan a slot for a new instance and reserve the gap if the slot needs one.
pub(crate) fn allocate_in(
  conn: &Connection,
  tag_id: Uuid,
  time: &TimePoint,
  after: &[Uuid],
  config: &OrderConfig,
) -> Result<i64> {
  let layout = StoryLayout::new(tag_id, load_story_rows(conn, tag_id)?, *config);
  let slot = layout.plan(time, after)?;
  if let Slot::Shift(from) = slot {
    reserve_gap_in(conn, tag_id, from)?;
  }
  tracing::debug!(%tag_id, ?slot, "allocated story order");
  Ok(slot.value())
}

/// Place every unordered instance of a tag. Propagates the allocator's
/// overflow so the caller's transaction rolls back.
pub(crate) fn backfill_in(
  conn: &Connection,
  tag_id: Uuid,
  config: &OrderConfig,
) -> Result<usize> {
  let rows = load_story_rows(conn, tag_id)?;
  let (mut pending, ordered): (Vec<_>, Vec<_>) =
    rows.into_iter().partition(|r| r.story_order.is_none());
  if pending.is_empty() {
    return Ok(0);
  }
  sort_chronologically(&mut pending);

  let mut layout = StoryLayout::new(tag_id, ordered, *config);
  let appends = match layout.rows().last() {
    None => true,
    Some(last) => pending[0].time.chrono_cmp(&last.time).is_ge(),
  };

  if appends {
    // Everything pending sorts after the story: continue its numbering.
    let start = layout.last_order().map_or(config.base, |last| last + config.step);
    for (i, row) in pending.iter().enumerate() {
      set_order(conn, row.instance_id, Some(start + i as i64 * config.step))?;
    }
    return Ok(pending.len());
  }

  let count = pending.len();
  for row in pending {
    let slot = layout.plan(&row.time, &row.after)?;
    if let Slot::Shift(from) = slot {
      reserve_gap_in(conn, tag_id, from)?;
    }
    set_order(conn, row.instance_id, Some(slot.value()))?;
    layout.place(row, slot);
  }
  Ok(count)
}

// ─── StoryOrdering impl ──────────────────────────────────────────────────────

impl SqliteStore {
  async fn tag_ids(&self, sql: &'static str, params: Vec<String>) -> Result<Vec<Uuid>> {
    let ids = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(sql)?;
        let ids = stmt
          .query_map(rusqlite::params_from_iter(params), |row| uuid_column(row, 0))?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(ids)
      })
      .await?;
    Ok(ids)
  }

  async fn ensure_tag(&self, tag_id: Uuid) -> Result<()> {
    let exists = self
      .conn
      .call(move |conn| Ok(tag_exists(conn, tag_id)))
      .await??;
    if !exists {
      return Err(atlas_core::Error::TagNotFound(tag_id).into());
    }
    Ok(())
  }

  async fn rebalance_with(&self, tag_id: Uuid, mode: RebalanceMode) -> Result<usize> {
    self.ensure_tag(tag_id).await?;
    let config = self.config.order;
    let count = self
      .conn
      .call(move |conn| {
        with_transaction(conn, |tx| rebalance_in(tx, tag_id, &config, mode))
      })
      .await??;
    tracing::info!(%tag_id, ?mode, count, "rebalanced story");
    Ok(count)
  }
}

impl StoryOrdering for SqliteStore {
  async fn tags_pending_order(&self, range: Option<(Uuid, Uuid)>) -> Result<Vec<Uuid>> {
    match range {
      Some((start, stop)) => {
        self
          .tag_ids(
            "SELECT DISTINCT tag_id FROM tag_instances
             WHERE story_order IS NULL AND tag_id BETWEEN ?1 AND ?2
             ORDER BY tag_id",
            vec![encode_uuid(start), encode_uuid(stop)],
          )
          .await
      }
      None => {
        self
          .tag_ids(
            "SELECT DISTINCT tag_id FROM tag_instances
             WHERE story_order IS NULL ORDER BY tag_id",
            vec![],
          )
          .await
      }
    }
  }

  async fn tags_with_instances(&self) -> Result<Vec<Uuid>> {
    self
      .tag_ids("SELECT DISTINCT tag_id FROM tag_instances ORDER BY tag_id", vec![])
      .await
  }

  async fn tags_with_ordered_instances(&self, min: usize) -> Result<Vec<Uuid>> {
    self
      .tag_ids(
        "SELECT tag_id FROM tag_instances
         WHERE story_order IS NOT NULL
         GROUP BY tag_id HAVING COUNT(*) >= CAST(?1 AS INTEGER)
         ORDER BY tag_id",
        vec![min.to_string()],
      )
      .await
  }

  async fn backfill_tag(&self, tag_id: Uuid) -> Result<TagBackfill> {
    let config = self.config.order;
    let result = self
      .conn
      .call(move |conn| with_transaction(conn, |tx| backfill_in(tx, tag_id, &config)))
      .await?;

    match result {
      Ok(count) => Ok(TagBackfill::Placed { count }),
      Err(Error::Core(atlas_core::Error::Overflow { below, above, .. })) => {
        Ok(TagBackfill::Overflowed { below, above })
      }
      Err(e) => Err(e),
    }
  }

  async fn allocate(&self, tag_id: Uuid, time: TimePoint, after: Vec<Uuid>) -> Result<i64> {
    self.ensure_tag(tag_id).await?;
    let config = self.config.order;
    let value = self
      .conn
      .call(move |conn| {
        with_transaction(conn, |tx| allocate_in(tx, tag_id, &time, &after, &config))
      })
      .await??;
    Ok(value)
  }

  async fn reserve_gap(&self, tag_id: Uuid, from: i64) -> Result<usize> {
    let moved = self
      .conn
      .call(move |conn| with_transaction(conn, |tx| reserve_gap_in(tx, tag_id, from)))
      .await??;
    Ok(moved)
  }

  async fn rebalance(&self, tag_id: Uuid) -> Result<usize> {
    self.rebalance_with(tag_id, RebalanceMode::Chronological).await
  }

  async fn rebalance_bulk(&self, tag_id: Uuid) -> Result<usize> {
    self.rebalance_with(tag_id, RebalanceMode::DependencyAware).await
  }

  async fn verify(&self, tag_id: Uuid) -> Result<Verification> {
    self.ensure_tag(tag_id).await?;
    let rows = self
      .conn
      .call(move |conn| Ok(load_story_rows(conn, tag_id)))
      .await??;
    Ok(verify_story(tag_id, rows))
  }

  async fn reset_all(&self) -> Result<usize> {
    let n = self
      .conn
      .call(|conn| {
        Ok(conn.execute(
          "UPDATE tag_instances SET story_order = NULL WHERE story_order IS NOT NULL",
          [],
        )?)
      })
      .await?;
    Ok(n)
  }

  async fn reset_tag(&self, tag_id: Uuid) -> Result<usize> {
    let tag = encode_uuid(tag_id);
    let n = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE tag_instances SET story_order = NULL
           WHERE tag_id = ?1 AND story_order IS NOT NULL",
          rusqlite::params![tag],
        )?)
      })
      .await?;
    Ok(n)
  }
}
