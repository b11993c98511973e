//! A single cache entry: confirmed value, pending optimistic patches and
//! observer bookkeeping.

use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, Shared};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;

use crate::api::ApiError;

use super::patch::UndoOutcome;
use super::tags::Tag;
use super::traits::QueryKey;

/// A replayable edit applied to a cached value.
pub type Transform<V> = Arc<dyn Fn(&mut V) + Send + Sync>;

/// Shared network request; every waiter receives the same result.
pub(crate) type SharedFetch<V> = Shared<BoxFuture<'static, Result<V, ApiError>>>;

pub(crate) struct InFlight<V> {
  /// Sequence number taken when the request started
  pub seq: u64,
  pub future: SharedFetch<V>,
}

struct PendingPatch<V> {
  seq: u64,
  transform: Transform<V>,
}

/// Read-only view of an entry for rendering.
#[derive(Debug, Clone)]
pub struct EntrySnapshot<V> {
  pub value: Option<V>,
  pub error: Option<ApiError>,
  pub is_fetching: bool,
  pub is_stale: bool,
  pub fetched_at: Option<DateTime<Utc>>,
  pub pending_patches: usize,
  pub version: u64,
}

pub(crate) struct CacheEntry<K: QueryKey> {
  pub key: K,
  /// Last server-confirmed value, with committed patches folded in
  base: Option<K::Value>,
  /// `base` with every pending patch replayed in call order
  value: Option<K::Value>,
  patches: Vec<PendingPatch<K::Value>>,
  pub error: Option<ApiError>,
  pub tags: Vec<Tag>,
  fetched_at: Option<Instant>,
  fetched_at_wall: Option<DateTime<Utc>>,
  invalidated: bool,
  /// Start sequence of the request that produced `base`
  confirmed_seq: u64,
  pub in_flight: Option<InFlight<K::Value>>,
  pub observers: usize,
  unobserved_since: Instant,
  version: watch::Sender<u64>,
}

impl<K: QueryKey> CacheEntry<K> {
  pub fn new(key: K, now: Instant) -> Self {
    let tags = key.provides_tags(None);
    let (version, _) = watch::channel(0);
    Self {
      key,
      base: None,
      value: None,
      patches: Vec::new(),
      error: None,
      tags,
      fetched_at: None,
      fetched_at_wall: None,
      invalidated: false,
      confirmed_seq: 0,
      in_flight: None,
      observers: 0,
      unobserved_since: now,
      version,
    }
  }

  pub fn value(&self) -> Option<&K::Value> {
    self.value.as_ref()
  }

  pub fn fetched_at_wall(&self) -> Option<DateTime<Utc>> {
    self.fetched_at_wall
  }

  pub fn is_stale(&self, now: Instant, stale_after: Duration) -> bool {
    if self.invalidated {
      return true;
    }
    match self.fetched_at {
      Some(at) => now.saturating_duration_since(at) >= stale_after,
      None => true,
    }
  }

  /// Fresh, error-free value that can be served without a network call.
  pub fn fresh_value(&self, now: Instant, stale_after: Duration) -> Option<&K::Value> {
    if self.error.is_some() || self.is_stale(now, stale_after) {
      return None;
    }
    self.value.as_ref()
  }

  pub fn carries(&self, tag: &Tag) -> bool {
    self.tags.contains(tag)
  }

  pub fn mark_invalidated(&mut self) {
    self.invalidated = true;
    self.notify();
  }

  pub fn has_pending_patches(&self) -> bool {
    !self.patches.is_empty()
  }

  /// Store a server response from the request started at `request_seq`.
  ///
  /// Patches older than the request are considered absorbed and dropped; newer
  /// ones are replayed on top of the new base.
  pub fn confirm(&mut self, value: K::Value, request_seq: u64, now: Instant) {
    self.tags = self.key.provides_tags(Some(&value));
    self.base = Some(value);
    self.patches.retain(|p| p.seq > request_seq);
    self.confirmed_seq = self.confirmed_seq.max(request_seq);
    self.error = None;
    self.invalidated = false;
    self.fetched_at = Some(now);
    self.fetched_at_wall = Some(Utc::now());
    self.rebuild();
    self.notify();
  }

  /// Record a failed fetch, keeping whatever value was there before.
  pub fn fail(&mut self, error: ApiError) {
    if self.base.is_none() {
      self.tags = self.key.provides_tags(None);
    }
    self.error = Some(error);
    self.notify();
  }

  /// Apply a patch on top of the current value. Returns false when there is
  /// nothing cached to patch.
  pub fn apply_patch(&mut self, seq: u64, transform: Transform<K::Value>) -> bool {
    let Some(value) = self.value.as_mut() else {
      return false;
    };
    transform(value);
    self.patches.push(PendingPatch { seq, transform });
    self.notify();
    true
  }

  /// Remove exactly one patch, keeping every other pending patch in effect.
  pub fn undo_patch(&mut self, seq: u64) -> UndoOutcome {
    match self.patches.iter().position(|p| p.seq == seq) {
      Some(index) => {
        self.patches.remove(index);
        self.rebuild();
        self.notify();
        UndoOutcome::Reverted
      }
      None if self.confirmed_seq > seq => UndoOutcome::Superseded,
      None => UndoOutcome::Missing,
    }
  }

  /// Fold a patch into the base so it survives until the next server value.
  pub fn commit_patch(&mut self, seq: u64) {
    let Some(index) = self.patches.iter().position(|p| p.seq == seq) else {
      return;
    };
    let patch = self.patches.remove(index);
    if let Some(base) = self.base.as_mut() {
      (patch.transform)(base);
    }
    self.rebuild();
  }

  pub fn is_idle_expired(&self, now: Instant, keep_for: Duration) -> bool {
    self.observers == 0
      && self.in_flight.is_none()
      && self.patches.is_empty()
      && now.saturating_duration_since(self.unobserved_since) >= keep_for
  }

  pub fn add_observer(&mut self) -> watch::Receiver<u64> {
    self.observers += 1;
    self.version.subscribe()
  }

  pub fn remove_observer(&mut self, now: Instant) {
    self.observers = self.observers.saturating_sub(1);
    if self.observers == 0 {
      self.unobserved_since = now;
    }
  }

  /// Publish a state change to observers.
  pub fn notify(&self) {
    self.version.send_modify(|v| *v += 1);
  }

  pub fn snapshot(&self, now: Instant, stale_after: Duration) -> EntrySnapshot<K::Value> {
    EntrySnapshot {
      value: self.value.clone(),
      error: self.error.clone(),
      is_fetching: self.in_flight.is_some(),
      is_stale: self.is_stale(now, stale_after),
      fetched_at: self.fetched_at_wall,
      pending_patches: self.patches.len(),
      version: *self.version.borrow(),
    }
  }

  fn rebuild(&mut self) {
    self.value = self.base.clone().map(|mut value| {
      for patch in &self.patches {
        (patch.transform)(&mut value);
      }
      value
    });
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[derive(Clone)]
  struct Key;

  impl QueryKey for Key {
    type Value = Vec<i32>;

    fn operation(&self) -> &'static str {
      "numbers"
    }

    fn params(&self) -> String {
      String::new()
    }

    fn provides_tags(&self, _value: Option<&Vec<i32>>) -> Vec<Tag> {
      vec![Tag::property_list()]
    }
  }

  fn push(n: i32) -> Transform<Vec<i32>> {
    Arc::new(move |v: &mut Vec<i32>| v.push(n))
  }

  fn confirmed(value: Vec<i32>) -> CacheEntry<Key> {
    let mut entry = CacheEntry::new(Key, Instant::now());
    entry.confirm(value, 1, Instant::now());
    entry
  }

  #[test]
  fn test_patch_without_value_is_noop() {
    let mut entry = CacheEntry::new(Key, Instant::now());
    assert!(!entry.apply_patch(2, push(1)));
    assert!(entry.value().is_none());
  }

  #[test]
  fn test_undo_only_reverts_own_patch() {
    let mut entry = confirmed(vec![0]);
    entry.apply_patch(2, push(1));
    entry.apply_patch(3, push(2));
    assert_eq!(entry.value(), Some(&vec![0, 1, 2]));

    assert_eq!(entry.undo_patch(2), UndoOutcome::Reverted);
    assert_eq!(entry.value(), Some(&vec![0, 2]));

    assert_eq!(entry.undo_patch(3), UndoOutcome::Reverted);
    assert_eq!(entry.value(), Some(&vec![0]));
  }

  #[test]
  fn test_confirm_drops_older_patches() {
    let mut entry = confirmed(vec![0]);
    entry.apply_patch(2, push(1));
    entry.apply_patch(5, push(2));

    // Request started at seq 4: patch 2 predates it, patch 5 does not
    entry.confirm(vec![10], 4, Instant::now());
    assert_eq!(entry.value(), Some(&vec![10, 2]));
    assert_eq!(entry.undo_patch(2), UndoOutcome::Superseded);
    assert_eq!(entry.value(), Some(&vec![10, 2]));
  }

  #[test]
  fn test_commit_keeps_change_after_other_undo() {
    let mut entry = confirmed(vec![0]);
    entry.apply_patch(2, push(1));
    entry.apply_patch(3, push(2));
    entry.commit_patch(2);
    assert_eq!(entry.undo_patch(3), UndoOutcome::Reverted);
    assert_eq!(entry.value(), Some(&vec![0, 1]));
  }

  #[test]
  fn test_fail_keeps_previous_value() {
    let mut entry = confirmed(vec![7]);
    entry.fail(ApiError::Network("offline".into()));
    assert_eq!(entry.value(), Some(&vec![7]));
    assert!(entry.error.is_some());
    assert!(entry
      .fresh_value(Instant::now(), Duration::from_secs(60))
      .is_none());
  }

  #[test]
  fn test_staleness() {
    let now = Instant::now();
    let mut entry = CacheEntry::new(Key, now);
    assert!(entry.is_stale(now, Duration::from_secs(30)));

    entry.confirm(vec![], 1, now);
    assert!(!entry.is_stale(now, Duration::from_secs(30)));
    assert!(entry.is_stale(now + Duration::from_secs(31), Duration::from_secs(30)));

    entry.mark_invalidated();
    assert!(entry.is_stale(now, Duration::from_secs(30)));
  }

  #[test]
  fn test_idle_expiry_requires_no_observers() {
    let now = Instant::now();
    let mut entry = CacheEntry::new(Key, now);
    let _rx = entry.add_observer();
    let later = now + Duration::from_secs(120);
    assert!(!entry.is_idle_expired(later, Duration::from_secs(60)));

    entry.remove_observer(now);
    assert!(entry.is_idle_expired(later, Duration::from_secs(60)));
    assert!(!entry.is_idle_expired(now + Duration::from_secs(10), Duration::from_secs(60)));
  }
}
