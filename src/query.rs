//! View-side handle on a cached query.
//!
//! A `Query<K>` subscribes to one cache entry for as long as the view holds it.
//! Fetches run as tasks on the runtime and land in the cache; the view calls
//! `poll()` on every tick and re-renders when it returns true.
//!
//! # Example
//!
//! ```ignore
//! let mut query = Query::new(api.lists(), PropertyListKey::new(params));
//! query.fetch();
//!
//! // In event loop tick
//! if query.poll() {
//!     // State changed, trigger re-render
//! }
//!
//! // In render
//! match query.state() {
//!     QueryState::Loading => render_spinner(),
//!     QueryState::Success | QueryState::Error => render_rows(query.data()),
//!     QueryState::Idle => {}
//! }
//! ```

use tracing::debug;

use crate::api::ApiError;
use crate::cache::{EntrySnapshot, QueryCache, QueryKey, Subscription};

/// What a view should show for a query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryState {
  /// Nothing requested yet
  Idle,
  /// First fetch in progress, no data to show
  Loading,
  /// Data available (possibly being refreshed)
  Success,
  /// Last fetch failed and there is no data to fall back on
  Error,
}

pub struct Query<K: QueryKey> {
  cache: QueryCache<K>,
  key: K,
  subscription: Subscription<K>,
  snapshot: Option<EntrySnapshot<K::Value>>,
  /// Value of the previous key, shown until the current key has data or fails
  placeholder: Option<K::Value>,
}

impl<K: QueryKey> Query<K> {
  /// Observe `key` in `cache`. Nothing is fetched until `fetch` is called.
  pub fn new(cache: &QueryCache<K>, key: K) -> Self {
    let subscription = cache.subscribe(&key);
    let snapshot = cache.snapshot(&key);
    Self {
      cache: cache.clone(),
      key,
      subscription,
      snapshot,
      placeholder: None,
    }
  }

  pub fn key(&self) -> &K {
    &self.key
  }

  /// Switch to another key, dropping the old subscription, and fetch it.
  ///
  /// Until the new key has a value, `data()` keeps returning the old one.
  pub fn set_key(&mut self, key: K) {
    debug!(from = %self.key.description(), to = %key.description(), "Query key changed");
    let previous = self.data().cloned();
    self.subscription = self.cache.subscribe(&key);
    self.snapshot = self.cache.snapshot(&key);
    self.key = key;
    self.placeholder = previous;
    self.drop_settled_placeholder();
    self.fetch();
  }

  fn drop_settled_placeholder(&mut self) {
    let settled = self
      .snapshot
      .as_ref()
      .is_some_and(|s| s.value.is_some() || s.error.is_some());
    if settled {
      self.placeholder = None;
    }
  }

  /// Fetch unless the cached value is fresh. Concurrent calls share a request.
  pub fn fetch(&mut self) {
    self.spawn(false);
  }

  /// Fetch from the network even if the cached value is fresh.
  pub fn refetch(&mut self) {
    self.spawn(true);
  }

  fn spawn(&mut self, force: bool) {
    let cache = self.cache.clone();
    let key = self.key.clone();
    tokio::spawn(async move {
      // Outcome is recorded in the cache entry and reaches us through the subscription
      let _ = if force {
        cache.refetch(&key).await
      } else {
        cache.fetch(&key).await
      };
    });
  }

  /// Pick up changes to the entry. Returns true if the view should re-render.
  pub fn poll(&mut self) -> bool {
    let changed = self.subscription.has_changed();
    if changed || self.snapshot.is_none() {
      let snapshot = self.cache.snapshot(&self.key);
      let appeared = self.snapshot.is_none() && snapshot.is_some();
      self.snapshot = snapshot;
      self.drop_settled_placeholder();
      return changed || appeared;
    }
    false
  }

  pub fn state(&self) -> QueryState {
    if self.is_placeholder() {
      return QueryState::Success;
    }
    match &self.snapshot {
      None => QueryState::Idle,
      Some(s) if s.value.is_some() => QueryState::Success,
      Some(s) if s.is_fetching => QueryState::Loading,
      Some(s) if s.error.is_some() => QueryState::Error,
      Some(_) => QueryState::Idle,
    }
  }

  /// Latest value, including optimistic patches. Kept after a failed refetch.
  pub fn data(&self) -> Option<&K::Value> {
    self
      .snapshot
      .as_ref()
      .and_then(|s| s.value.as_ref())
      .or(self.placeholder.as_ref())
  }

  /// True while `data()` is the previous key's value.
  pub fn is_placeholder(&self) -> bool {
    let current = self.snapshot.as_ref().and_then(|s| s.value.as_ref());
    self.placeholder.is_some() && current.is_none()
  }

  /// Error from the most recent fetch, if it failed.
  pub fn error(&self) -> Option<&ApiError> {
    self.snapshot.as_ref().and_then(|s| s.error.as_ref())
  }

  pub fn is_loading(&self) -> bool {
    self.snapshot.as_ref().is_some_and(|s| s.is_fetching)
  }

  pub fn is_stale(&self) -> bool {
    self.snapshot.as_ref().is_some_and(|s| s.is_stale)
  }
}

impl<K: QueryKey + std::fmt::Debug> std::fmt::Debug for Query<K> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Query")
      .field("key", &self.key)
      .field("state", &self.state())
      .finish_non_exhaustive()
  }
}
