//! Optimistic mutations: patch the cache first, then confirm or roll back.

use std::future::Future;
use tracing::{debug, info, warn};

use crate::api::ApiError;

use super::layer::{InvalidationReport, QueryCache};
use super::patch::{PatchSet, UndoOutcome};
use super::tags::Tag;
use super::traits::QueryKey;

/// Anything that can drop cached data by tag.
///
/// Lets one mutation invalidate caches of different key types.
pub trait Invalidate: Send + Sync {
  fn invalidate_tags(&self, tags: &[Tag]) -> InvalidationReport;
}

impl<K: QueryKey> Invalidate for QueryCache<K> {
  fn invalidate_tags(&self, tags: &[Tag]) -> InvalidationReport {
    self.invalidate(tags)
  }
}

/// Lifecycle of a single mutation.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum MutationState {
  #[default]
  Idle,
  /// Local patches applied, request outstanding
  Pending,
  /// Server accepted the change; patches kept until refetch, tags invalidated
  Confirmed,
  /// Server rejected the change; patches undone
  RolledBack,
}

impl MutationState {
  pub fn is_terminal(&self) -> bool {
    matches!(self, MutationState::Confirmed | MutationState::RolledBack)
  }
}

/// One optimistic mutation and the patches it owns.
pub struct OptimisticMutation {
  name: String,
  state: MutationState,
  patches: PatchSet,
  invalidates: Vec<Tag>,
}

impl OptimisticMutation {
  pub fn new(name: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      state: MutationState::Idle,
      patches: PatchSet::new(),
      invalidates: Vec::new(),
    }
  }

  /// Tags to invalidate once the server confirms.
  pub fn invalidates(mut self, tags: Vec<Tag>) -> Self {
    self.invalidates = tags;
    self
  }

  /// Take ownership of already-applied patches.
  pub fn with_patches(mut self, patches: PatchSet) -> Self {
    self.patches.extend(patches);
    if self.state == MutationState::Idle {
      self.state = MutationState::Pending;
    }
    self
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn state(&self) -> MutationState {
    self.state
  }

  pub fn patch_count(&self) -> usize {
    self.patches.len()
  }

  /// Keep the patches and invalidate the mutation's tags on every cache.
  pub fn confirm(&mut self, caches: &[&dyn Invalidate]) {
    if self.state.is_terminal() {
      return;
    }
    std::mem::take(&mut self.patches).commit();
    for cache in caches {
      cache.invalidate_tags(&self.invalidates);
    }
    self.state = MutationState::Confirmed;
    info!(mutation = %self.name, "Mutation confirmed");
  }

  /// Undo every patch, newest first.
  pub fn roll_back(&mut self) -> Vec<UndoOutcome> {
    if self.state.is_terminal() {
      return Vec::new();
    }
    let outcomes = std::mem::take(&mut self.patches).undo();
    self.state = MutationState::RolledBack;
    debug!(mutation = %self.name, ?outcomes, "Rolled back local patches");
    outcomes
  }

  /// Await the request and settle the mutation on its result.
  ///
  /// Patches must already be applied: they are visible from the moment they
  /// were created, before this future is first polled.
  pub async fn run<T, Fut>(
    &mut self,
    request: Fut,
    caches: &[&dyn Invalidate],
  ) -> Result<T, ApiError>
  where
    Fut: Future<Output = Result<T, ApiError>>,
  {
    if self.state == MutationState::Idle {
      self.state = MutationState::Pending;
    }
    debug!(mutation = %self.name, patches = self.patches.len(), "Mutation pending");

    match request.await {
      Ok(value) => {
        self.confirm(caches);
        Ok(value)
      }
      Err(err) => {
        warn!(mutation = %self.name, error = %err, "Mutation failed, rolling back");
        self.roll_back();
        Err(err)
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::layer::CacheConfig;
  use std::sync::atomic::{AtomicUsize, Ordering};
  use std::sync::Arc;

  #[derive(Clone, Debug)]
  struct Counter(&'static str);

  impl QueryKey for Counter {
    type Value = i64;

    fn operation(&self) -> &'static str {
      "counter"
    }

    fn params(&self) -> String {
      self.0.to_string()
    }

    fn provides_tags(&self, _value: Option<&i64>) -> Vec<Tag> {
      vec![Tag::property(self.0)]
    }
  }

  fn cache() -> (QueryCache<Counter>, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let c = calls.clone();
    let cache = QueryCache::new(
      move |_key: &Counter| {
        let calls = c.clone();
        async move { Ok(calls.fetch_add(1, Ordering::SeqCst) as i64 * 100) }
      },
      CacheConfig::default(),
    );
    (cache, calls)
  }

  #[test]
  fn test_terminal_states() {
    assert!(!MutationState::Idle.is_terminal());
    assert!(!MutationState::Pending.is_terminal());
    assert!(MutationState::Confirmed.is_terminal());
    assert!(MutationState::RolledBack.is_terminal());
  }

  #[tokio::test]
  async fn test_success_commits_and_invalidates() {
    let (cache, _) = cache();
    let key = Counter("p-1");
    cache.fetch(&key).await.unwrap();

    let patches = cache.update_matching(|_, _| true, |v| *v += 1);
    let mut mutation = OptimisticMutation::new("bump")
      .with_patches(patches)
      .invalidates(vec![Tag::property("p-1")]);
    assert_eq!(mutation.state(), MutationState::Pending);
    assert_eq!(cache.value(&key), Some(1));

    let result = mutation.run(async { Ok("done") }, &[&cache]).await;
    assert_eq!(result.unwrap(), "done");
    assert_eq!(mutation.state(), MutationState::Confirmed);

    let snapshot = cache.snapshot(&key).unwrap();
    assert_eq!(snapshot.value, Some(1));
    assert!(snapshot.is_stale);
    assert_eq!(snapshot.pending_patches, 0);
  }

  #[tokio::test]
  async fn test_failure_rolls_back_and_surfaces_error() {
    let (cache, calls) = cache();
    let key = Counter("p-1");
    cache.fetch(&key).await.unwrap();
    let mut sub = cache.subscribe(&key);

    let patches = cache.update_matching(|_, _| true, |v| *v = 42);
    assert!(sub.has_changed());
    let mut mutation = OptimisticMutation::new("set").with_patches(patches);

    let err = mutation
      .run(
        async { Err::<(), _>(ApiError::Network("offline".into())) },
        &[&cache],
      )
      .await
      .unwrap_err();

    assert!(err.is_network());
    assert_eq!(mutation.state(), MutationState::RolledBack);
    assert_eq!(cache.value(&key), Some(0));
    assert!(sub.has_changed());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn test_settled_mutation_ignores_further_calls() {
    let (cache, _) = cache();
    let key = Counter("p-1");
    cache.fetch(&key).await.unwrap();

    let patches = cache.update_matching(|_, _| true, |v| *v += 5);
    let mut mutation = OptimisticMutation::new("bump").with_patches(patches);
    mutation.confirm(&[&cache]);
    assert!(mutation.roll_back().is_empty());
    assert_eq!(mutation.state(), MutationState::Confirmed);
    assert_eq!(cache.value(&key), Some(5));
  }
}
