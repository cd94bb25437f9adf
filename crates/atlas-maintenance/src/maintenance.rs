//! Fix, reset and verify: the story-order operations besides backfill.

use atlas_core::{order::Verification, store::StoryOrdering};
use rand::seq::IndexedRandom as _;
use uuid::Uuid;

use crate::{Report, VerifyReport};

// ─── Fix ─────────────────────────────────────────────────────────────────────

/// Renumber one tag honouring its `after` hints.
pub async fn fix_tag<S: StoryOrdering>(store: &S, tag_id: Uuid) -> Result<usize, S::Error> {
  let count = store.rebalance_bulk(tag_id).await?;
  tracing::info!(%tag_id, count, "fixed story");
  Ok(count)
}

/// Renumber every tag that has instances. A tag whose hints form a cycle is
/// recorded as failed and left untouched.
pub async fn fix_all<S: StoryOrdering>(store: &S) -> Result<Report, S::Error> {
  let tags = store.tags_with_instances().await?;
  tracing::info!(tags = tags.len(), "fixing every story");

  let mut report = Report::default();
  for tag_id in tags {
    report.tags += 1;
    match store.rebalance_bulk(tag_id).await {
      Ok(_) => report.rebalanced += 1,
      Err(e) => {
        tracing::error!(%tag_id, error = %e, "fix failed");
        report.fail(tag_id, &e);
      }
    }
  }
  Ok(report)
}

// ─── Reset ───────────────────────────────────────────────────────────────────

pub async fn reset_all<S: StoryOrdering>(store: &S) -> Result<usize, S::Error> {
  let cleared = store.reset_all().await?;
  tracing::warn!(cleared, "cleared every story order");
  Ok(cleared)
}

pub async fn reset_tag<S: StoryOrdering>(store: &S, tag_id: Uuid) -> Result<usize, S::Error> {
  let cleared = store.reset_tag(tag_id).await?;
  tracing::info!(%tag_id, cleared, "cleared story order");
  Ok(cleared)
}

// ─── Verify ──────────────────────────────────────────────────────────────────

pub async fn verify_tag<S: StoryOrdering>(
  store: &S,
  tag_id: Uuid,
) -> Result<Verification, S::Error> {
  let verification = store.verify(tag_id).await?;
  match &verification.mismatch {
    None => tracing::info!(%tag_id, checked = verification.checked, "story in order"),
    Some(m) => tracing::warn!(
      %tag_id,
      position = m.position,
      current = %m.current,
      expected = %m.expected,
      "story out of order"
    ),
  }
  Ok(verification)
}

/// Verify every tag that has at least two ordered instances.
pub async fn verify_all<S: StoryOrdering>(store: &S) -> Result<VerifyReport, S::Error> {
  let tags = store.tags_with_ordered_instances(2).await?;
  Ok(verify_tags(store, &tags).await)
}

/// Verify up to `n` tags chosen at random among those with at least two
/// ordered instances.
pub async fn verify_sample<S: StoryOrdering>(
  store: &S,
  n: usize,
) -> Result<VerifyReport, S::Error> {
  let tags = store.tags_with_ordered_instances(2).await?;
  let sample: Vec<Uuid> = tags.choose_multiple(&mut rand::rng(), n).copied().collect();
  tracing::info!(population = tags.len(), sampled = sample.len(), "verifying a sample");
  Ok(verify_tags(store, &sample).await)
}

async fn verify_tags<S: StoryOrdering>(store: &S, tags: &[Uuid]) -> VerifyReport {
  let mut report = VerifyReport::default();
  for &tag_id in tags {
    match verify_tag(store, tag_id).await {
      Ok(verification) => report.record(verification),
      Err(e) => {
        tracing::error!(%tag_id, error = %e, "verify failed");
        report.failed.push(crate::TagFailure { tag_id, message: e.to_string() });
      }
    }
  }
  report
}
