//! A bounded, time-expiring memory of recently seen ids.
//!
//! The write path creates a tag or summary and, moments later, attaches tag
//! instances to it. Remembering those ids for a few seconds lets the store
//! skip the existence lookups it would otherwise repeat.

use std::{
  collections::{HashMap, VecDeque},
  hash::Hash,
};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Source of the current time; injected so expiry can be tested.
pub trait Clock: Send + Sync {
  fn now(&self) -> DateTime<Utc>;
}

/// The wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
  fn now(&self) -> DateTime<Utc> { Utc::now() }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
  pub capacity: usize,
  pub ttl_secs: u64,
}

impl Default for CacheConfig {
  fn default() -> Self { Self { capacity: 1024, ttl_secs: 10 } }
}

/// Maps keys to values for at most `ttl`, holding at most `capacity`
/// entries. The oldest insertion is evicted first.
#[derive(Debug)]
pub struct RecentCache<K, V, C = SystemClock> {
  entries:  HashMap<K, (V, DateTime<Utc>)>,
  inserted: VecDeque<(K, DateTime<Utc>)>,
  capacity: usize,
  ttl:      Duration,
  clock:    C,
}

impl<K, V> RecentCache<K, V, SystemClock>
where
  K: Eq + Hash + Clone,
  V: Clone,
{
  pub fn new(config: CacheConfig) -> Self { Self::with_clock(config, SystemClock) }
}

impl<K, V, C> RecentCache<K, V, C>
where
  K: Eq + Hash + Clone,
  V: Clone,
  C: Clock,
{
  pub fn with_clock(config: CacheConfig, clock: C) -> Self {
    let ttl_secs = i64::try_from(config.ttl_secs).unwrap_or(i64::MAX);
    Self {
      entries: HashMap::new(),
      inserted: VecDeque::new(),
      capacity: config.capacity,
      ttl: Duration::try_seconds(ttl_secs).unwrap_or(Duration::MAX),
      clock,
    }
  }

  pub fn insert(&mut self, key: K, value: V) {
    if self.capacity == 0 {
      return;
    }
    let now = self.clock.now();
    self.purge_expired();
    self.entries.insert(key.clone(), (value, now));
    self.inserted.push_back((key, now));

    while self.entries.len() > self.capacity {
      let Some((oldest, at)) = self.inserted.pop_front() else { break };
      // Skip queue entries superseded by a later insert of the same key.
      if self.entries.get(&oldest).is_some_and(|(_, t)| *t == at) {
        self.entries.remove(&oldest);
      }
    }
  }

  /// The value for `key`, if it was inserted less than `ttl` ago.
  pub fn get(&mut self, key: &K) -> Option<V> {
    let now = self.clock.now();
    match self.entries.get(key) {
      Some((value, at)) if now - *at < self.ttl => Some(value.clone()),
      Some(_) => {
        self.entries.remove(key);
        None
      }
      None => None,
    }
  }

  pub fn remove(&mut self, key: &K) { self.entries.remove(key); }

  pub fn len(&self) -> usize { self.entries.len() }

  pub fn is_empty(&self) -> bool { self.entries.is_empty() }

  /// Drop every expired entry.
  pub fn purge_expired(&mut self) {
    let now = self.clock.now();
    while let Some((key, at)) = self.inserted.front() {
      if now - *at < self.ttl {
        break;
      }
      if self.entries.get(key).is_some_and(|(_, t)| t == at) {
        self.entries.remove(key);
      }
      self.inserted.pop_front();
    }
  }
}

#[cfg(test)]
mod tests {
  use std::sync::{
    Arc,
    atomic::{AtomicI64, Ordering},
  };

  use chrono::TimeZone as _;

  use super::*;

  /// A clock that only moves when told to.
  #[derive(Clone, Default)]
  struct ManualClock(Arc<AtomicI64>);

  impl ManualClock {
    fn advance(&self, secs: i64) { self.0.fetch_add(secs, Ordering::SeqCst); }
  }

  impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
      Utc.timestamp_opt(1_700_000_000 + self.0.load(Ordering::SeqCst), 0).unwrap()
    }
  }

  fn cache(capacity: usize) -> (RecentCache<u32, &'static str, ManualClock>, ManualClock) {
    let clock = ManualClock::default();
    let cache =
      RecentCache::with_clock(CacheConfig { capacity, ttl_secs: 10 }, clock.clone());
    (cache, clock)
  }

  #[test]
  fn entries_expire_after_ttl() {
    let (mut c, clock) = cache(8);
    c.insert(1, "one");
    clock.advance(9);
    assert_eq!(c.get(&1), Some("one"));
    clock.advance(1);
    assert_eq!(c.get(&1), None);
    assert!(c.is_empty());
  }

  #[test]
  fn oldest_entry_is_evicted_at_capacity() {
    let (mut c, clock) = cache(2);
    c.insert(1, "one");
    clock.advance(1);
    c.insert(2, "two");
    clock.advance(1);
    c.insert(3, "three");

    assert_eq!(c.len(), 2);
    assert_eq!(c.get(&1), None);
    assert_eq!(c.get(&2), Some("two"));
    assert_eq!(c.get(&3), Some("three"));
  }

  #[test]
  fn reinsert_refreshes_entry() {
    let (mut c, clock) = cache(2);
    c.insert(1, "one");
    clock.advance(8);
    c.insert(1, "uno");
    clock.advance(8);
    assert_eq!(c.get(&1), Some("uno"));

    c.purge_expired();
    assert_eq!(c.len(), 1);
  }

  #[test]
  fn zero_capacity_remembers_nothing() {
    let (mut c, _) = cache(0);
    c.insert(1, "one");
    assert_eq!(c.get(&1), None);
  }
}
