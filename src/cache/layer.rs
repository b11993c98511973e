//! Cache layer that orchestrates caching logic with network fetching.

use chrono::Utc;
use futures::FutureExt;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::api::ApiError;

use super::entry::{CacheEntry, EntrySnapshot, InFlight, SharedFetch, Transform};
use super::patch::{PatchHandle, PatchSet, UndoOutcome, UndoToken};
use super::tags::Tag;
use super::traits::{CacheResult, Fetcher, QueryKey};

/// Timing knobs for a cache.
#[derive(Debug, Clone, Copy)]
pub struct CacheConfig {
  /// How long a successful fetch is served without refetching
  pub stale_after: Duration,
  /// How long an unobserved entry is kept before eviction
  pub keep_unused_for: Duration,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      stale_after: Duration::from_secs(30),
      keep_unused_for: Duration::from_secs(60),
    }
  }
}

/// Outcome of an invalidation pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct InvalidationReport {
  /// Entries carrying one of the tags
  pub marked_stale: usize,
  /// Observed entries for which a refetch was started
  pub refetching: usize,
}

struct Inner<K: QueryKey> {
  entries: HashMap<String, CacheEntry<K>>,
  next_seq: u64,
}

impl<K: QueryKey> Inner<K> {
  fn next_seq(&mut self) -> u64 {
    self.next_seq += 1;
    self.next_seq
  }

  fn entry(&mut self, key: &K, now: Instant) -> &mut CacheEntry<K> {
    self
      .entries
      .entry(key.cache_hash())
      .or_insert_with(|| CacheEntry::new(key.clone(), now))
  }
}

fn lock<K: QueryKey>(inner: &Mutex<Inner<K>>) -> MutexGuard<'_, Inner<K>> {
  // Entries stay consistent even if a holder panicked: every mutation completes
  // before the guard is released.
  inner.lock().unwrap_or_else(PoisonError::into_inner)
}

/// In-memory query cache keyed by (operation, parameters).
///
/// All mutations happen in short synchronous sections, so on the single-threaded
/// runtime an invalidation or patch always runs to completion before any other
/// callback observes the cache.
pub struct QueryCache<K: QueryKey> {
  inner: Arc<Mutex<Inner<K>>>,
  fetcher: Arc<dyn Fetcher<K>>,
  config: CacheConfig,
}

impl<K: QueryKey> Clone for QueryCache<K> {
  fn clone(&self) -> Self {
    Self {
      inner: Arc::clone(&self.inner),
      fetcher: Arc::clone(&self.fetcher),
      config: self.config,
    }
  }
}

impl<K: QueryKey> QueryCache<K> {
  /// Create a cache that uses `fetcher` for every network call.
  pub fn new(fetcher: impl Fetcher<K>, config: CacheConfig) -> Self {
    Self {
      inner: Arc::new(Mutex::new(Inner {
        entries: HashMap::new(),
        next_seq: 0,
      })),
      fetcher: Arc::new(fetcher),
      config,
    }
  }

  pub fn config(&self) -> CacheConfig {
    self.config
  }

  /// Fetch with cache-first strategy.
  ///
  /// 1. Fresh entry: return it, no network call
  /// 2. Request for this key already running: wait for it
  /// 3. Otherwise: fetch, store the value and its tags, notify observers
  ///
  /// On failure the previous value is kept and the error is returned.
  pub async fn fetch(&self, key: &K) -> Result<CacheResult<K::Value>, ApiError> {
    self.fetch_inner(key, false).await
  }

  /// Fetch from the network even if the entry is fresh.
  pub async fn refetch(&self, key: &K) -> Result<CacheResult<K::Value>, ApiError> {
    self.fetch_inner(key, true).await
  }

  async fn fetch_inner(&self, key: &K, force: bool) -> Result<CacheResult<K::Value>, ApiError> {
    let (seq, future) = {
      let mut inner = lock(&self.inner);
      let now = Instant::now();
      let mut joined = None;

      if let Some(entry) = inner.entries.get(&key.cache_hash()) {
        if !force {
          if let Some(value) = entry.fresh_value(now, self.config.stale_after) {
            debug!(query = %key.description(), "Cache hit");
            let cached_at = entry.fetched_at_wall().unwrap_or_else(Utc::now);
            return Ok(CacheResult::from_cache(value.clone(), cached_at));
          }
        }
        if let Some(in_flight) = &entry.in_flight {
          debug!(query = %key.description(), "Joining in-flight request");
          joined = Some((in_flight.seq, in_flight.future.clone()));
        }
      }

      match joined {
        Some(joined) => joined,
        None => self.begin_fetch(&mut inner, key, now),
      }
    };

    let result = future.await;
    self.complete(key, seq, &result);
    result.map(CacheResult::from_network)
  }

  /// Start a network request and record it on the entry. Must be called with
  /// the lock held so that no second request can start for the same key.
  ///
  /// On a runtime the request is driven by its own task, so the entry is
  /// settled even if every caller stops waiting.
  fn begin_fetch(
    &self,
    inner: &mut Inner<K>,
    key: &K,
    now: Instant,
  ) -> (u64, SharedFetch<K::Value>) {
    let seq = inner.next_seq();
    let future = self.fetcher.fetch(key).shared();
    let entry = inner.entry(key, now);
    entry.in_flight = Some(InFlight {
      seq,
      future: future.clone(),
    });
    entry.notify();
    debug!(query = %key.description(), seq, "Cache miss, fetching");

    if let Ok(runtime) = tokio::runtime::Handle::try_current() {
      let cache = self.clone();
      let key = key.clone();
      let driven = future.clone();
      runtime.spawn(async move {
        let result = driven.await;
        cache.complete(&key, seq, &result);
      });
    }
    (seq, future)
  }

  /// Store the result of request `seq`. Only the first waiter settles it.
  fn complete(&self, key: &K, seq: u64, result: &Result<K::Value, ApiError>) {
    let mut inner = lock(&self.inner);
    let now = Instant::now();
    let entry = inner.entry(key, now);

    if !entry.in_flight.as_ref().is_some_and(|f| f.seq == seq) {
      return;
    }
    entry.in_flight = None;

    match result {
      Ok(value) => {
        entry.confirm(value.clone(), seq, now);
        debug!(query = %key.description(), observers = entry.observers, "Stored fetch result");
      }
      Err(err) => {
        warn!(query = %key.description(), error = %err, "Fetch failed, keeping previous value");
        entry.fail(err.clone());
      }
    }
  }

  /// Mark every entry carrying one of `tags` as stale.
  ///
  /// Observed entries are refetched right away (at most one request per entry);
  /// unobserved ones are refetched lazily on their next `fetch`.
  pub fn invalidate(&self, tags: &[Tag]) -> InvalidationReport {
    let can_refetch = tokio::runtime::Handle::try_current().is_ok();
    let mut report = InvalidationReport::default();

    {
      let mut inner = lock(&self.inner);
      let now = Instant::now();
      let hashes: Vec<String> = inner
        .entries
        .iter()
        .filter(|(_, entry)| tags.iter().any(|tag| entry.carries(tag)))
        .map(|(hash, _)| hash.clone())
        .collect();

      for hash in hashes {
        let Some(entry) = inner.entries.get_mut(&hash) else {
          continue;
        };
        entry.mark_invalidated();
        report.marked_stale += 1;

        let should_refetch = entry.observers > 0 && entry.in_flight.is_none();
        let key = entry.key.clone();
        if should_refetch && can_refetch {
          // Settled by the task begin_fetch spawns
          self.begin_fetch(&mut inner, &key, now);
          report.refetching += 1;
        }
      }
    }

    debug!(
      tags = ?tags.iter().map(Tag::to_string).collect::<Vec<_>>(),
      marked_stale = report.marked_stale,
      refetching = report.refetching,
      "Invalidated tags"
    );
    report
  }

  /// Apply `transform` to the cached value for `key` right away.
  ///
  /// Patches on the same entry apply in call order and each token undoes only
  /// its own change. When nothing is cached the token is a no-op.
  pub fn update_locally(
    &self,
    key: &K,
    transform: impl Fn(&mut K::Value) + Send + Sync + 'static,
  ) -> UndoToken {
    let transform: Transform<K::Value> = Arc::new(transform);
    let mut inner = lock(&self.inner);
    let seq = inner.next_seq();
    let hash = key.cache_hash();
    let applied = inner
      .entries
      .get_mut(&hash)
      .is_some_and(|entry| entry.apply_patch(seq, transform));

    debug!(query = %key.description(), seq, applied, "Applied local patch");
    UndoToken::new(EntryPatch {
      inner: Arc::clone(&self.inner),
      hash,
      description: key.description(),
      seq,
      applied,
      resolved: false,
    })
  }

  /// Apply one transform to every cached entry accepted by `predicate`, as one
  /// step. Returns the patches in application order.
  pub fn update_matching(
    &self,
    predicate: impl Fn(&K, &K::Value) -> bool,
    transform: impl Fn(&mut K::Value) + Send + Sync + 'static,
  ) -> PatchSet {
    let transform: Transform<K::Value> = Arc::new(transform);
    let mut inner = lock(&self.inner);
    let targets: Vec<(String, String)> = inner
      .entries
      .iter()
      .filter(|(_, entry)| entry.value().is_some_and(|v| predicate(&entry.key, v)))
      .map(|(hash, entry)| (hash.clone(), entry.key.description()))
      .collect();

    let mut patches = PatchSet::new();
    for (hash, description) in targets {
      let seq = inner.next_seq();
      let applied = inner
        .entries
        .get_mut(&hash)
        .is_some_and(|entry| entry.apply_patch(seq, Arc::clone(&transform)));
      debug!(query = %description, seq, applied, "Applied local patch");
      patches.push(UndoToken::new(EntryPatch {
        inner: Arc::clone(&self.inner),
        hash,
        description,
        seq,
        applied,
        resolved: false,
      }));
    }
    patches
  }

  /// Apply several keyed patches under one lock acquisition.
  pub fn update_many(&self, patches: Vec<(K, Transform<K::Value>)>) -> PatchSet {
    let mut inner = lock(&self.inner);
    let mut set = PatchSet::new();
    for (key, transform) in patches {
      let seq = inner.next_seq();
      let hash = key.cache_hash();
      let applied = inner
        .entries
        .get_mut(&hash)
        .is_some_and(|entry| entry.apply_patch(seq, transform));
      set.push(UndoToken::new(EntryPatch {
        inner: Arc::clone(&self.inner),
        hash,
        description: key.description(),
        seq,
        applied,
        resolved: false,
      }));
    }
    set
  }

  /// Register an observer. Dropping the subscription unregisters it.
  pub fn subscribe(&self, key: &K) -> Subscription<K> {
    let mut inner = lock(&self.inner);
    let receiver = inner.entry(key, Instant::now()).add_observer();
    Subscription {
      inner: Arc::clone(&self.inner),
      hash: key.cache_hash(),
      receiver,
    }
  }

  pub fn snapshot(&self, key: &K) -> Option<EntrySnapshot<K::Value>> {
    let inner = lock(&self.inner);
    inner
      .entries
      .get(&key.cache_hash())
      .map(|entry| entry.snapshot(Instant::now(), self.config.stale_after))
  }

  /// Current value for `key`, including pending patches.
  pub fn value(&self, key: &K) -> Option<K::Value> {
    let inner = lock(&self.inner);
    inner
      .entries
      .get(&key.cache_hash())
      .and_then(|entry| entry.value().cloned())
  }

  /// Drop entries that have been unobserved for longer than their retention.
  pub fn evict_idle(&self) -> usize {
    self.evict_idle_at(Instant::now())
  }

  pub fn evict_idle_at(&self, now: Instant) -> usize {
    let default_keep = self.config.keep_unused_for;
    let mut inner = lock(&self.inner);
    let before = inner.entries.len();
    inner.entries.retain(|_, entry| {
      let keep_for = entry.key.keep_unused_for().unwrap_or(default_keep);
      let expired = entry.is_idle_expired(now, keep_for);
      if expired {
        debug!(query = %entry.key.description(), "Evicting idle entry");
      }
      !expired
    });
    before - inner.entries.len()
  }

  pub fn len(&self) -> usize {
    lock(&self.inner).entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

/// Observer registration for one entry.
pub struct Subscription<K: QueryKey> {
  inner: Arc<Mutex<Inner<K>>>,
  hash: String,
  receiver: watch::Receiver<u64>,
}

impl<K: QueryKey> Subscription<K> {
  /// True once after each change to the entry since the last call.
  pub fn has_changed(&mut self) -> bool {
    match self.receiver.has_changed() {
      Ok(true) => {
        self.receiver.borrow_and_update();
        true
      }
      _ => false,
    }
  }

  /// Wait for the next change. Returns false if the entry was dropped.
  pub async fn changed(&mut self) -> bool {
    self.receiver.changed().await.is_ok()
  }
}

impl<K: QueryKey> Drop for Subscription<K> {
  fn drop(&mut self) {
    let mut inner = lock(&self.inner);
    if let Some(entry) = inner.entries.get_mut(&self.hash) {
      entry.remove_observer(Instant::now());
    }
  }
}

struct EntryPatch<K: QueryKey> {
  inner: Arc<Mutex<Inner<K>>>,
  hash: String,
  description: String,
  seq: u64,
  applied: bool,
  resolved: bool,
}

impl<K: QueryKey> PatchHandle for EntryPatch<K> {
  fn applied(&self) -> bool {
    self.applied
  }

  fn undo(&mut self) -> UndoOutcome {
    if self.resolved {
      return UndoOutcome::Missing;
    }
    self.resolved = true;
    if !self.applied {
      return UndoOutcome::NotApplied;
    }

    let mut inner = lock(&self.inner);
    let outcome = inner
      .entries
      .get_mut(&self.hash)
      .map(|entry| entry.undo_patch(self.seq))
      .unwrap_or(UndoOutcome::Missing);
    debug!(query = %self.description, seq = self.seq, ?outcome, "Undo local patch");
    outcome
  }

  fn commit(&mut self) {
    if self.resolved {
      return;
    }
    self.resolved = true;
    if !self.applied {
      return;
    }

    let mut inner = lock(&self.inner);
    if let Some(entry) = inner.entries.get_mut(&self.hash) {
      entry.commit_patch(self.seq);
    }
  }

  fn describe(&self) -> String {
    format!("{}#{}", self.description, self.seq)
  }
}

impl<K: QueryKey> Drop for EntryPatch<K> {
  fn drop(&mut self) {
    // An unresolved patch never becomes confirmed state
    if !self.resolved {
      let outcome = self.undo();
      debug!(query = %self.description, seq = self.seq, ?outcome, "Dropped unresolved patch");
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::tags::tags_for_list;
  use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

  #[derive(Clone, Debug)]
  enum TestKey {
    List(&'static str),
    Item(&'static str),
  }

  impl QueryKey for TestKey {
    type Value = Vec<String>;

    fn operation(&self) -> &'static str {
      match self {
        TestKey::List(_) => "list",
        TestKey::Item(_) => "item",
      }
    }

    fn params(&self) -> String {
      match self {
        TestKey::List(filter) | TestKey::Item(filter) => filter.to_string(),
      }
    }

    fn provides_tags(&self, value: Option<&Vec<String>>) -> Vec<Tag> {
      match self {
        TestKey::List(_) => tags_for_list(
          value.map(|v| v.iter().map(String::as_str)),
          Tag::property_list(),
          Tag::property,
        ),
        TestKey::Item(id) => vec![Tag::property(id)],
      }
    }
  }

  struct Harness {
    cache: QueryCache<TestKey>,
    calls: Arc<AtomicUsize>,
    failing: Arc<AtomicBool>,
  }

  fn harness(config: CacheConfig, delay: Duration) -> Harness {
    let calls = Arc::new(AtomicUsize::new(0));
    let failing = Arc::new(AtomicBool::new(false));
    let (c, f) = (calls.clone(), failing.clone());

    let cache = QueryCache::new(
      move |key: &TestKey| {
        let key = key.clone();
        let calls = c.clone();
        let failing = f.clone();
        async move {
          let call = calls.fetch_add(1, Ordering::SeqCst) + 1;
          if !delay.is_zero() {
            tokio::time::sleep(delay).await;
          }
          if failing.load(Ordering::SeqCst) {
            return Err(ApiError::Network("connection refused".into()));
          }
          Ok(match key {
            TestKey::List(_) => vec!["a".to_string(), "b".to_string()],
            TestKey::Item(id) => vec![format!("{}@{}", id, call)],
          })
        }
      },
      config,
    );

    Harness {
      cache,
      calls,
      failing,
    }
  }

  fn default_harness() -> Harness {
    harness(CacheConfig::default(), Duration::ZERO)
  }

  async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
  }

  #[tokio::test]
  async fn test_second_fetch_served_from_cache() {
    let h = default_harness();
    let key = TestKey::List("all");

    let first = h.cache.fetch(&key).await.unwrap();
    assert!(!first.is_from_cache());

    let second = h.cache.fetch(&key).await.unwrap();
    assert!(second.is_from_cache());
    assert_eq!(second.data, first.data);
    assert_eq!(h.calls.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn test_different_params_are_different_entries() {
    let h = default_harness();
    h.cache.fetch(&TestKey::List("all")).await.unwrap();
    h.cache.fetch(&TestKey::List("london")).await.unwrap();
    assert_eq!(h.calls.load(Ordering::SeqCst), 2);
    assert_eq!(h.cache.len(), 2);
  }

  #[tokio::test]
  async fn test_failure_keeps_previous_value() {
    let h = default_harness();
    let key = TestKey::Item("a");
    h.cache.fetch(&key).await.unwrap();

    h.failing.store(true, Ordering::SeqCst);
    let err = h.cache.refetch(&key).await.unwrap_err();
    assert!(err.is_network());

    let snapshot = h.cache.snapshot(&key).unwrap();
    assert_eq!(snapshot.value, Some(vec!["a@1".to_string()]));
    assert_eq!(snapshot.error, Some(err));
  }

  #[tokio::test]
  async fn test_fetch_after_failure_retries() {
    let h = default_harness();
    let key = TestKey::Item("a");
    h.failing.store(true, Ordering::SeqCst);
    assert!(h.cache.fetch(&key).await.is_err());

    h.failing.store(false, Ordering::SeqCst);
    let result = h.cache.fetch(&key).await.unwrap();
    assert!(!result.is_from_cache());
    assert!(h.cache.snapshot(&key).unwrap().error.is_none());
  }

  #[tokio::test]
  async fn test_concurrent_fetches_share_one_request() {
    let h = harness(CacheConfig::default(), Duration::from_millis(20));
    let key = TestKey::List("all");

    let (a, b) = tokio::join!(h.cache.fetch(&key), h.cache.fetch(&key));
    assert_eq!(a.unwrap().data, b.unwrap().data);
    assert_eq!(h.calls.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn test_item_invalidation_only_touches_tagged_entries() {
    let h = default_harness();
    h.cache.fetch(&TestKey::List("all")).await.unwrap();
    h.cache.fetch(&TestKey::Item("a")).await.unwrap();
    h.cache.fetch(&TestKey::Item("b")).await.unwrap();
    h.cache.fetch(&TestKey::Item("c")).await.unwrap();

    let report = h.cache.invalidate(&[Tag::property("b")]);
    assert_eq!(report.marked_stale, 2);
    assert_eq!(report.refetching, 0);

    assert!(h.cache.snapshot(&TestKey::List("all")).unwrap().is_stale);
    assert!(h.cache.snapshot(&TestKey::Item("b")).unwrap().is_stale);
    assert!(!h.cache.snapshot(&TestKey::Item("a")).unwrap().is_stale);
    assert!(!h.cache.snapshot(&TestKey::Item("c")).unwrap().is_stale);
  }

  #[tokio::test]
  async fn test_unobserved_invalidation_refetches_lazily() {
    let h = default_harness();
    let key = TestKey::Item("a");
    h.cache.fetch(&key).await.unwrap();

    h.cache.invalidate(&[Tag::property("a")]);
    settle().await;
    assert_eq!(h.calls.load(Ordering::SeqCst), 1);

    let result = h.cache.fetch(&key).await.unwrap();
    assert!(!result.is_from_cache());
    assert_eq!(h.calls.load(Ordering::SeqCst), 2);
  }

  #[tokio::test]
  async fn test_observed_invalidation_refetches_once() {
    let h = default_harness();
    let key = TestKey::Item("a");
    h.cache.fetch(&key).await.unwrap();
    let mut sub = h.cache.subscribe(&key);

    let first = h.cache.invalidate(&[Tag::property("a")]);
    let second = h.cache.invalidate(&[Tag::property("a")]);
    assert_eq!(first.refetching, 1);
    assert_eq!(second.refetching, 0);

    settle().await;
    assert_eq!(h.calls.load(Ordering::SeqCst), 2);
    assert!(sub.has_changed());

    let snapshot = h.cache.snapshot(&key).unwrap();
    assert!(!snapshot.is_stale);
    assert_eq!(snapshot.value, Some(vec!["a@2".to_string()]));
  }

  #[tokio::test]
  async fn test_update_locally_round_trip() {
    let h = default_harness();
    let key = TestKey::List("all");
    h.cache.fetch(&key).await.unwrap();
    let before = h.cache.value(&key);

    let token = h
      .cache
      .update_locally(&key, |v| v.insert(0, "temp".to_string()));
    assert!(token.is_applied());
    assert_eq!(h.cache.value(&key).unwrap().len(), 3);

    assert_eq!(token.undo(), UndoOutcome::Reverted);
    assert_eq!(h.cache.value(&key), before);
  }

  #[tokio::test]
  async fn test_update_locally_without_entry_is_noop() {
    let h = default_harness();
    let token = h
      .cache
      .update_locally(&TestKey::Item("x"), |v| v.push("y".to_string()));
    assert!(!token.is_applied());
    assert_eq!(token.undo(), UndoOutcome::NotApplied);
  }

  #[tokio::test]
  async fn test_patches_undo_independently() {
    let h = default_harness();
    let key = TestKey::List("all");
    h.cache.fetch(&key).await.unwrap();

    let first = h.cache.update_locally(&key, |v| v.push("first".to_string()));
    let second = h.cache.update_locally(&key, |v| v.push("second".to_string()));

    assert_eq!(first.undo(), UndoOutcome::Reverted);
    assert_eq!(
      h.cache.value(&key).unwrap(),
      vec!["a".to_string(), "b".to_string(), "second".to_string()]
    );
    second.commit();
    assert_eq!(h.cache.value(&key).unwrap().len(), 3);
  }

  #[tokio::test]
  async fn test_undo_after_newer_confirmation_is_refused() {
    let h = default_harness();
    let key = TestKey::Item("a");
    h.cache.fetch(&key).await.unwrap();

    let token = h.cache.update_locally(&key, |v| v[0] = "optimistic".to_string());
    h.cache.refetch(&key).await.unwrap();

    assert_eq!(token.undo(), UndoOutcome::Superseded);
    assert_eq!(h.cache.value(&key), Some(vec!["a@2".to_string()]));
  }

  #[tokio::test]
  async fn test_update_matching_patches_selected_entries() {
    let h = default_harness();
    h.cache.fetch(&TestKey::Item("a")).await.unwrap();
    h.cache.fetch(&TestKey::Item("b")).await.unwrap();

    let patches = h.cache.update_matching(
      |key, _| matches!(key, TestKey::Item("a")),
      |v| v.push("patched".to_string()),
    );
    assert_eq!(patches.applied_count(), 1);
    assert_eq!(h.cache.value(&TestKey::Item("a")).unwrap().len(), 2);
    assert_eq!(h.cache.value(&TestKey::Item("b")).unwrap().len(), 1);

    patches.undo();
    assert_eq!(h.cache.value(&TestKey::Item("a")).unwrap().len(), 1);
  }

  #[tokio::test]
  async fn test_update_many_undoes_in_reverse() {
    let h = default_harness();
    let key = TestKey::Item("a");
    h.cache.fetch(&key).await.unwrap();

    let push_x: Transform<Vec<String>> = Arc::new(|v| v.push("x".to_string()));
    let push_y: Transform<Vec<String>> = Arc::new(|v| v.push("y".to_string()));
    let patches = h
      .cache
      .update_many(vec![(key.clone(), push_x), (key.clone(), push_y)]);
    assert_eq!(h.cache.value(&key).unwrap().len(), 3);

    let outcomes = patches.undo();
    assert_eq!(outcomes, vec![UndoOutcome::Reverted, UndoOutcome::Reverted]);
    assert_eq!(h.cache.value(&key), Some(vec!["a@1".to_string()]));
  }

  #[tokio::test]
  async fn test_subscription_sees_patch_and_undo() {
    let h = default_harness();
    let key = TestKey::List("all");
    h.cache.fetch(&key).await.unwrap();
    let mut sub = h.cache.subscribe(&key);
    assert!(!sub.has_changed());

    let token = h.cache.update_locally(&key, |v| v.clear());
    assert!(sub.has_changed());
    assert!(!sub.has_changed());

    token.undo();
    assert!(sub.has_changed());
  }

  #[tokio::test]
  async fn test_idle_entries_are_evicted() {
    let h = default_harness();
    let observed = TestKey::Item("a");
    let idle = TestKey::Item("b");
    h.cache.fetch(&observed).await.unwrap();
    h.cache.fetch(&idle).await.unwrap();
    let _sub = h.cache.subscribe(&observed);

    let later = Instant::now() + Duration::from_secs(61);
    assert_eq!(h.cache.evict_idle_at(later), 1);
    assert!(h.cache.snapshot(&observed).is_some());
    assert!(h.cache.snapshot(&idle).is_none());
  }

  #[tokio::test]
  async fn test_dropping_subscription_starts_idle_clock() {
    let h = default_harness();
    let key = TestKey::Item("a");
    h.cache.fetch(&key).await.unwrap();
    let sub = h.cache.subscribe(&key);
    drop(sub);

    assert_eq!(h.cache.evict_idle_at(Instant::now()), 0);
    assert_eq!(
      h.cache.evict_idle_at(Instant::now() + Duration::from_secs(60)),
      1
    );
  }

  #[tokio::test]
  async fn test_abandoned_fetch_still_settles_entry() {
    let h = harness(CacheConfig::default(), Duration::from_millis(50));
    let key = TestKey::Item("a");

    let waited = tokio::time::timeout(Duration::from_millis(5), h.cache.fetch(&key)).await;
    assert!(waited.is_err());

    tokio::time::sleep(Duration::from_millis(200)).await;
    let snapshot = h.cache.snapshot(&key).unwrap();
    assert!(!snapshot.is_fetching);
    assert_eq!(snapshot.value, Some(vec!["a@1".to_string()]));
    assert_eq!(h.calls.load(Ordering::SeqCst), 1);

    let later = Instant::now() + Duration::from_secs(3600);
    assert_eq!(h.cache.evict_idle_at(later), 1);
  }

  #[tokio::test]
  async fn test_response_after_unsubscribe_still_updates_entry() {
    let h = harness(CacheConfig::default(), Duration::from_millis(20));
    let key = TestKey::Item("a");
    let sub = h.cache.subscribe(&key);

    let cache = h.cache.clone();
    let task = tokio::spawn(async move { cache.fetch(&TestKey::Item("a")).await });
    tokio::task::yield_now().await;
    drop(sub);

    task.await.unwrap().unwrap();
    assert_eq!(h.cache.value(&key), Some(vec!["a@1".to_string()]));
  }
}
