//! TTL cache of resolution results keyed by `(form_kind, modality)`.
//!
//! Writes overwrite; invalidation clears everything and bumps a generation
//! counter. A resolution captures the generation before it reads any
//! configuration or store state, and its insert is dropped if a clear
//! happened in between.

use std::{
  collections::HashMap,
  sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use chrono::{DateTime, Duration as TimeDelta, Utc};
use missive_core::{
  clock::{Clock, SystemClock},
  resolution::ResolutionResult,
  template::{FormKind, Modality},
};

pub const DEFAULT_TTL: TimeDelta = TimeDelta::minutes(5);

type Key = (FormKind, Option<Modality>);

/// Opaque token identifying the cache contents between two clears.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Generation(u64);

#[derive(Default)]
struct Entries {
  generation: u64,
  map:        HashMap<Key, (ResolutionResult, DateTime<Utc>)>,
}

pub struct ResolutionCache {
  ttl:     TimeDelta,
  clock:   Arc<dyn Clock>,
  entries: Mutex<Entries>,
}

impl Default for ResolutionCache {
  fn default() -> Self { Self::new(DEFAULT_TTL) }
}

impl ResolutionCache {
  pub fn new(ttl: TimeDelta) -> Self { Self::with_clock(ttl, Arc::new(SystemClock)) }

  pub fn with_clock(ttl: TimeDelta, clock: Arc<dyn Clock>) -> Self {
    Self { ttl, clock, entries: Mutex::new(Entries::default()) }
  }

  /// A live entry for the key. Expired entries are dropped on the way.
  pub fn get(
    &self,
    form_kind: &FormKind,
    modality: Option<&Modality>,
  ) -> Option<ResolutionResult> {
    let key = (form_kind.clone(), modality.cloned());
    let now = self.clock.now();
    let mut entries = self.lock();
    match entries.map.get(&key) {
      Some((result, expires_at)) if *expires_at > now => Some(result.clone()),
      Some(_) => {
        entries.map.remove(&key);
        None
      }
      None => None,
    }
  }

  pub fn generation(&self) -> Generation { Generation(self.lock().generation) }

  /// Store `result` unless the cache was cleared since `seen` was taken.
  /// Returns whether the entry was written.
  pub fn insert(
    &self,
    seen: Generation,
    form_kind: &FormKind,
    modality: Option<&Modality>,
    result: ResolutionResult,
  ) -> bool {
    let expires_at = self.clock.now() + self.ttl;
    let mut entries = self.lock();
    if entries.generation != seen.0 {
      return false;
    }
    entries
      .map
      .insert((form_kind.clone(), modality.cloned()), (result, expires_at));
    true
  }

  pub fn clear(&self) {
    let mut entries = self.lock();
    entries.map.clear();
    entries.generation = entries.generation.wrapping_add(1);
  }

  pub fn len(&self) -> usize { self.lock().map.len() }

  pub fn is_empty(&self) -> bool { self.len() == 0 }

  fn lock(&self) -> MutexGuard<'_, Entries> {
    self.entries.lock().unwrap_or_else(PoisonError::into_inner)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::testing::ManualClock;

  #[test]
  fn entries_expire_after_ttl() {
    let clock = Arc::new(ManualClock::default());
    let cache = ResolutionCache::with_clock(DEFAULT_TTL, clock.clone());
    let quote = FormKind::new("quote");
    let hosted = Modality::new("hosted");

    let seen = cache.generation();
    cache.insert(seen, &quote, Some(&hosted), ResolutionResult::none("nothing"));
    assert!(cache.get(&quote, Some(&hosted)).is_some());
    assert!(cache.get(&quote, None).is_none());

    clock.advance(TimeDelta::minutes(4));
    assert!(cache.get(&quote, Some(&hosted)).is_some());

    clock.advance(TimeDelta::minutes(1));
    assert!(cache.get(&quote, Some(&hosted)).is_none());
    assert!(cache.is_empty());
  }

  #[test]
  fn clear_drops_everything() {
    let cache = ResolutionCache::default();
    let seen = cache.generation();
    cache.insert(seen, &FormKind::new("a"), None, ResolutionResult::none("x"));
    cache.insert(seen, &FormKind::new("b"), None, ResolutionResult::none("x"));
    assert_eq!(cache.len(), 2);
    cache.clear();
    assert!(cache.is_empty());
  }

  #[test]
  fn insert_after_clear_is_dropped() {
    let cache = ResolutionCache::default();
    let quote = FormKind::new("quote");
    let stale = cache.generation();

    cache.clear();
    assert!(!cache.insert(stale, &quote, None, ResolutionResult::none("old")));
    assert!(cache.get(&quote, None).is_none());

    let fresh = cache.generation();
    assert_ne!(stale, fresh);
    assert!(cache.insert(fresh, &quote, None, ResolutionResult::none("new")));
    assert!(cache.get(&quote, None).is_some());
  }
}
