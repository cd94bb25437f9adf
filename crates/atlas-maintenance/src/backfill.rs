//! The bulk backfill driver.
//!
//! Lists the tags that still have unordered instances and hands each one to
//! [`StoryOrdering::backfill_tag`]. A tag whose backfill overflows is
//! rebalanced exactly once; a tag that fails is logged, recorded, and
//! skipped. The per-tag unit of work is the same whether the run is
//! sequential or spread over workers.

use std::{future::Future, num::NonZeroUsize};

use atlas_core::store::{Backend, StoryOrdering, TagBackfill};
use tokio::task::JoinSet;
use uuid::Uuid;

use crate::{Error, Report};

/// How a backfill run spreads its tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Concurrency {
  /// One connection, one tag at a time.
  #[default]
  Sequential,
  /// Each worker opens its own connection and takes one contiguous chunk of
  /// the tag list.
  Workers(NonZeroUsize),
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BackfillOptions {
  /// Only tags with ids in `start..=stop`.
  pub range:       Option<(Uuid, Uuid)>,
  pub concurrency: Concurrency,
}

/// Opens store connections for the driver and its workers.
pub trait Connect: Clone + Send + Sync + 'static {
  type Store: StoryOrdering + 'static;

  fn connect(
    &self,
  ) -> impl Future<Output = Result<Self::Store, <Self::Store as Backend>::Error>> + Send;
}

type StoreError<C> = <<C as Connect>::Store as Backend>::Error;

/// Backfill every tag with unordered instances.
pub async fn backfill<C: Connect>(
  connect: &C,
  options: BackfillOptions,
) -> Result<Report, Error<StoreError<C>>> {
  let store = connect.connect().await.map_err(Error::Connect)?;
  let tags = store
    .tags_pending_order(options.range)
    .await
    .map_err(Error::Store)?;
  tracing::info!(tags = tags.len(), concurrency = ?options.concurrency, "starting backfill");

  let report = match options.concurrency {
    Concurrency::Sequential => backfill_tags(&store, &tags).await,
    Concurrency::Workers(workers) => {
      drop(store);
      run_workers(connect, tags, workers).await?
    }
  };

  tracing::info!(
    tags = report.tags,
    placed = report.placed,
    rebalanced = report.rebalanced,
    failed = report.failed.len(),
    "backfill finished"
  );
  Ok(report)
}

async fn run_workers<C: Connect>(
  connect: &C,
  tags: Vec<Uuid>,
  workers: NonZeroUsize,
) -> Result<Report, Error<StoreError<C>>> {
  let mut set = JoinSet::new();
  for (worker, chunk) in partition(tags, workers).into_iter().enumerate() {
    let connect = connect.clone();
    set.spawn(async move {
      let store = connect.connect().await?;
      tracing::debug!(worker, tags = chunk.len(), "worker started");
      Ok::<_, StoreError<C>>(backfill_tags(&store, &chunk).await)
    });
  }

  let mut report = Report::default();
  while let Some(joined) = set.join_next().await {
    let worker: Result<Report, StoreError<C>> = joined?;
    report.merge(worker.map_err(Error::Connect)?);
  }
  Ok(report)
}

/// Split `tags` into at most `workers` contiguous chunks of near-equal size.
pub fn partition(tags: Vec<Uuid>, workers: NonZeroUsize) -> Vec<Vec<Uuid>> {
  if tags.is_empty() {
    return Vec::new();
  }
  let size = tags.len().div_ceil(workers.get());
  tags.chunks(size).map(<[Uuid]>::to_vec).collect()
}

/// Backfill `tags` one after another on `store`.
pub async fn backfill_tags<S: StoryOrdering>(store: &S, tags: &[Uuid]) -> Report {
  let mut report = Report::default();
  for &tag_id in tags {
    backfill_one(store, tag_id, &mut report).await;
  }
  report
}

/// The per-tag unit of work.
pub async fn backfill_one<S: StoryOrdering>(store: &S, tag_id: Uuid, report: &mut Report) {
  report.tags += 1;
  match store.backfill_tag(tag_id).await {
    Ok(TagBackfill::Placed { count }) => {
      tracing::debug!(%tag_id, count, "placed pending instances");
      report.placed += count;
    }
    Ok(TagBackfill::Overflowed { below, above }) => {
      tracing::warn!(%tag_id, below, above, "backfill overflowed; rebalancing");
      match store.rebalance(tag_id).await {
        Ok(_) => report.rebalanced += 1,
        Err(e) => {
          tracing::error!(%tag_id, error = %e, "rebalance after overflow failed");
          report.fail(tag_id, &e);
        }
      }
    }
    Err(e) => {
      tracing::error!(%tag_id, error = %e, "backfill failed");
      report.fail(tag_id, &e);
    }
  }
}
