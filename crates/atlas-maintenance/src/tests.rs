//! Driver tests: a counting mock for the per-tag contract, real SQLite for
//! worker pools and the maintenance operations.

use std::{
  collections::{HashMap, HashSet},
  num::NonZeroUsize,
  sync::Mutex,
};

use atlas_core::{
  instance::{NewSummary, NewTagInstance},
  order::{GapStrategy, OrderConfig, Verification},
  store::{AtlasStore, Backend, StoryOrdering, TagBackfill},
  tag::{PersonValue, TagValue, TimeValue},
  time::{Precision, TimePoint},
};
use atlas_store_sqlite::{SqliteStore, StoreConfig};
use uuid::Uuid;

use crate::{
  BackfillOptions, Concurrency, MaintenanceConfig, SqliteConnect, backfill,
  backfill::{backfill_tags, partition},
  config::environment,
  maintenance,
};

// ─── Counting mock ───────────────────────────────────────────────────────────

/// Records every call the driver makes; answers backfill from a script.
#[derive(Default)]
struct CountingStore {
  outcomes:   HashMap<Uuid, TagBackfill>,
  failing:    HashSet<Uuid>,
  backfills:  Mutex<Vec<Uuid>>,
  rebalances: Mutex<Vec<Uuid>>,
}

impl CountingStore {
  fn backfills(&self) -> Vec<Uuid> { self.backfills.lock().unwrap().clone() }

  fn rebalances(&self) -> Vec<Uuid> { self.rebalances.lock().unwrap().clone() }
}

impl Backend for CountingStore {
  type Error = atlas_core::Error;
}

impl StoryOrdering for CountingStore {
  async fn tags_pending_order(&self, _: Option<(Uuid, Uuid)>) -> atlas_core::Result<Vec<Uuid>> {
    let mut tags: Vec<Uuid> = self.outcomes.keys().copied().collect();
    tags.sort();
    Ok(tags)
  }

  async fn tags_with_instances(&self) -> atlas_core::Result<Vec<Uuid>> { Ok(Vec::new()) }

  async fn tags_with_ordered_instances(&self, _: usize) -> atlas_core::Result<Vec<Uuid>> {
    Ok(Vec::new())
  }

  async fn backfill_tag(&self, tag_id: Uuid) -> atlas_core::Result<TagBackfill> {
    self.backfills.lock().unwrap().push(tag_id);
    if self.failing.contains(&tag_id) {
      return Err(atlas_core::Error::MissingTime(tag_id));
    }
    Ok(self.outcomes[&tag_id])
  }

  async fn allocate(&self, _: Uuid, _: TimePoint, _: Vec<Uuid>) -> atlas_core::Result<i64> {
    unreachable!("the driver never allocates")
  }

  async fn reserve_gap(&self, _: Uuid, _: i64) -> atlas_core::Result<usize> {
    unreachable!("the driver never reserves gaps")
  }

  async fn rebalance(&self, tag_id: Uuid) -> atlas_core::Result<usize> {
    self.rebalances.lock().unwrap().push(tag_id);
    Ok(1)
  }

  async fn rebalance_bulk(&self, _: Uuid) -> atlas_core::Result<usize> {
    unreachable!("backfill rebalances chronologically")
  }

  async fn verify(&self, tag_id: Uuid) -> atlas_core::Result<Verification> {
    Ok(Verification { tag_id, checked: 0, mismatch: None })
  }

  async fn reset_all(&self) -> atlas_core::Result<usize> { Ok(0) }

  async fn reset_tag(&self, _: Uuid) -> atlas_core::Result<usize> { Ok(0) }
}

#[tokio::test]
async fn overflow_triggers_exactly_one_rebalance() {
  let placed = Uuid::new_v4();
  let overflowed = Uuid::new_v4();
  let store = CountingStore {
    outcomes: HashMap::from([
      (placed, TagBackfill::Placed { count: 3 }),
      (overflowed, TagBackfill::Overflowed { below: 0, above: 1 }),
    ]),
    ..CountingStore::default()
  };

  let report = backfill_tags(&store, &[placed, overflowed]).await;

  assert_eq!(store.backfills(), vec![placed, overflowed]);
  assert_eq!(store.rebalances(), vec![overflowed]);
  assert_eq!(report.tags, 2);
  assert_eq!(report.placed, 3);
  assert_eq!(report.rebalanced, 1);
  assert!(report.is_clean());
}

#[tokio::test]
async fn failing_tag_is_recorded_and_skipped() {
  let bad = Uuid::new_v4();
  let good = Uuid::new_v4();
  let store = CountingStore {
    outcomes: HashMap::from([(good, TagBackfill::Placed { count: 1 })]),
    failing: HashSet::from([bad]),
    ..CountingStore::default()
  };

  let report = backfill_tags(&store, &[bad, good]).await;

  assert_eq!(store.backfills(), vec![bad, good]);
  assert!(store.rebalances().is_empty());
  assert_eq!(report.tags, 2);
  assert_eq!(report.placed, 1);
  assert_eq!(report.failed.len(), 1);
  assert_eq!(report.failed[0].tag_id, bad);
}

#[test]
fn partition_keeps_chunks_contiguous() {
  let mut tags: Vec<Uuid> = (0..7).map(|_| Uuid::new_v4()).collect();
  tags.sort();

  let chunks = partition(tags.clone(), NonZeroUsize::new(3).unwrap());
  assert_eq!(chunks.iter().map(Vec::len).collect::<Vec<_>>(), vec![3, 3, 1]);
  assert_eq!(chunks.concat(), tags);

  let single = partition(tags.clone(), NonZeroUsize::new(10).unwrap());
  assert_eq!(single.len(), 7);
  assert!(partition(Vec::new(), NonZeroUsize::new(4).unwrap()).is_empty());
}

// ─── SQLite ──────────────────────────────────────────────────────────────────

/// A person tag with `years.len()` dated events. Returns the tag id.
async fn person_with_events(s: &SqliteStore, years: &[i64]) -> Uuid {
  let person = s
    .add_tag(TagValue::Person(PersonValue { names: vec!["Hypatia".into()] }))
    .await
    .unwrap();
  for &year in years {
    let summary = s
      .add_summary(NewSummary { text: format!("in {year}"), citation: None })
      .await
      .unwrap();
    let datetime = format!("+{year:04}-01-01T00:00:00Z");
    let time = s
      .add_tag(TagValue::Time(TimeValue {
        name: year.to_string(),
        datetime,
        calendar_model: "http://www.wikidata.org/entity/Q1985727".into(),
        precision: Precision::YEAR,
      }))
      .await
      .unwrap();
    s.add_tag_instance(NewTagInstance::new(time.tag_id, summary.summary_id))
      .await
      .unwrap();
    s.add_tag_instance(NewTagInstance::new(person.tag_id, summary.summary_id))
      .await
      .unwrap();
  }
  person.tag_id
}

#[tokio::test]
async fn worker_pool_backfills_every_tag() {
  let dir = tempfile::tempdir().unwrap();
  let path = dir.path().join("atlas.db");
  let setup = SqliteStore::open(&path).await.unwrap();

  let mut people = Vec::new();
  for offset in 0..6 {
    let years = [1900 + offset, 1800 + offset, 1850 + offset];
    people.push(person_with_events(&setup, &years).await);
  }
  // 6 people and 18 time tags, one instance per event in each.
  assert_eq!(setup.reset_all().await.unwrap(), 36);

  let connect = SqliteConnect { path: path.clone(), config: StoreConfig::default() };
  let options = BackfillOptions {
    range:       None,
    concurrency: Concurrency::Workers(NonZeroUsize::new(3).unwrap()),
  };
  let report = backfill(&connect, options).await.unwrap();

  assert_eq!(report.tags, 24);
  assert_eq!(report.placed, 36);
  assert!(report.is_clean());
  assert!(setup.tags_pending_order(None).await.unwrap().is_empty());
  for person in people {
    let story = setup.story(person).await.unwrap();
    assert_eq!(story.len(), 3);
    assert!(story.iter().all(|i| i.story_order.is_some_and(|o| o > 0)));
    assert!(setup.verify(person).await.unwrap().is_ok());
  }
}

#[tokio::test]
async fn overflowing_backfill_rebalances_once() {
  let dir = tempfile::tempdir().unwrap();
  let path = dir.path().join("atlas.db");
  let cramped = StoreConfig {
    order: OrderConfig { base: 1, step: 1, gap_strategy: GapStrategy::Midpoint },
    ..StoreConfig::default()
  };
  let setup = SqliteStore::open_with(&path, cramped).await.unwrap();
  let person = person_with_events(&setup, &[1800, 1900, 1950]).await;
  let events: Vec<Uuid> = setup
    .story(person)
    .await
    .unwrap()
    .iter()
    .map(|i| i.summary_id)
    .collect();

  // Clear the story, then mention the person a second time in the first and
  // last events. The pending 1800 instance has no room between 1 and 2.
  setup.reset_tag(person).await.unwrap();
  for summary in [events[0], events[2]] {
    let input = NewTagInstance {
      start_char: 10,
      stop_char: 17,
      ..NewTagInstance::new(person, summary)
    };
    setup.add_tag_instance(input).await.unwrap();
  }
  assert_eq!(setup.tags_pending_order(None).await.unwrap(), vec![person]);

  let connect = SqliteConnect { path, config: cramped };
  let report = backfill(&connect, BackfillOptions::default()).await.unwrap();

  assert_eq!(report.tags, 1);
  assert_eq!(report.placed, 0);
  assert_eq!(report.rebalanced, 1);
  assert!(report.is_clean());

  let story = setup.story(person).await.unwrap();
  let orders: Vec<Option<i64>> = story.iter().map(|i| i.story_order).collect();
  assert_eq!(orders, vec![Some(1), Some(2), Some(3), Some(4), Some(5)]);
  let summaries: Vec<Uuid> = story.iter().map(|i| i.summary_id).collect();
  assert_eq!(summaries, vec![events[0], events[0], events[1], events[2], events[2]]);
  assert!(setup.tags_pending_order(None).await.unwrap().is_empty());
  assert!(setup.verify(person).await.unwrap().is_ok());
}

#[tokio::test]
async fn range_bounds_the_backfill() {
  let dir = tempfile::tempdir().unwrap();
  let path = dir.path().join("atlas.db");
  let setup = SqliteStore::open(&path).await.unwrap();
  for offset in 0..3 {
    person_with_events(&setup, &[1900 + offset]).await;
  }
  setup.reset_all().await.unwrap();
  let pending = setup.tags_pending_order(None).await.unwrap();
  assert_eq!(pending.len(), 6);

  let connect = SqliteConnect { path, config: StoreConfig::default() };
  let options = BackfillOptions {
    range:       Some((pending[1], pending[3])),
    concurrency: Concurrency::Sequential,
  };
  let report = backfill(&connect, options).await.unwrap();

  assert_eq!(report.tags, 3);
  let left = setup.tags_pending_order(None).await.unwrap();
  assert_eq!(left, vec![pending[0], pending[4], pending[5]]);
}

#[tokio::test]
async fn fix_all_skips_cyclic_stories() {
  let s = SqliteStore::open_in_memory().await.unwrap();
  let healthy = person_with_events(&s, &[1900, 1800]).await;

  let cyclic = s
    .add_tag(TagValue::Person(PersonValue { names: vec!["Zeno".into()] }))
    .await
    .unwrap()
    .tag_id;
  let story = s.story(healthy).await.unwrap();
  let (a, b) = (story[0].summary_id, story[1].summary_id);
  for (summary, after) in [(a, b), (b, a)] {
    let input = NewTagInstance { after: vec![after], ..NewTagInstance::new(cyclic, summary) };
    s.add_tag_instance(input).await.unwrap();
  }

  let report = maintenance::fix_all(&s).await.unwrap();
  assert_eq!(report.failed.len(), 1);
  assert_eq!(report.failed[0].tag_id, cyclic);
  // The healthy person and both time tags.
  assert_eq!(report.rebalanced, 3);
}

#[tokio::test]
async fn verify_sample_is_bounded() {
  let s = SqliteStore::open_in_memory().await.unwrap();
  for offset in 0..4 {
    person_with_events(&s, &[1900 + offset, 1950 + offset]).await;
  }

  let report = maintenance::verify_sample(&s, 2).await.unwrap();
  assert_eq!(report.checked, 2);
  assert!(report.is_clean());

  let all = maintenance::verify_all(&s).await.unwrap();
  assert_eq!(all.checked, 4);
}

// ─── Configuration ───────────────────────────────────────────────────────────

#[test]
fn environment_overrides_config_file() {
  let dir = tempfile::tempdir().unwrap();
  let path = dir.path().join("atlas.toml");
  std::fs::write(
    &path,
    "store_path = \"from-file.db\"\n\n[story_order]\nstep = 10\ngap_strategy = \"shift\"\n",
  )
  .unwrap();

  let env = environment().source(Some(::config::Map::from([
    ("ATLAS_STORE_PATH".to_owned(), "/var/lib/atlas/atlas.db".to_owned()),
    ("ATLAS_CACHE__TTL_SECS".to_owned(), "30".to_owned()),
  ])));
  let cfg = MaintenanceConfig::load(&path, env).unwrap();

  assert_eq!(cfg.store_path, std::path::PathBuf::from("/var/lib/atlas/atlas.db"));
  assert_eq!(cfg.story_order.step, 10);
  assert_eq!(cfg.story_order.gap_strategy, GapStrategy::Shift);
  assert_eq!(cfg.story_order.base, OrderConfig::default().base);
  assert_eq!(cfg.cache.ttl_secs, 30);
}

#[test]
fn missing_config_file_falls_back_to_defaults() {
  let dir = tempfile::tempdir().unwrap();
  let env = environment().source(Some(::config::Map::new()));
  let cfg = MaintenanceConfig::load(&dir.path().join("absent.toml"), env).unwrap();
  assert_eq!(cfg.store_path, std::path::PathBuf::from("atlas.db"));
  assert_eq!(cfg.story_order, OrderConfig::default());
}
