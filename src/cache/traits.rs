//! Core traits and types for the caching system.

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use sha2::{Digest, Sha256};
use std::future::Future;
use std::time::Duration;

use crate::api::ApiError;

use super::tags::Tag;

/// Identifies one cacheable request: an operation plus its parameters.
///
/// Two keys with the same operation and canonical parameter string address the
/// same cache entry.
pub trait QueryKey: Clone + Send + Sync + 'static {
  /// Value stored for this key
  type Value: Clone + PartialEq + Send + Sync + 'static;

  /// Operation name (e.g., "getPropertiesList")
  fn operation(&self) -> &'static str;

  /// Canonical parameter string. Equal parameter sets must render identically.
  fn params(&self) -> String;

  /// Tags for a fetched value, or for a failed fetch when `value` is None.
  fn provides_tags(&self, value: Option<&Self::Value>) -> Vec<Tag>;

  /// Idle retention for this key; None uses the cache default.
  fn keep_unused_for(&self) -> Option<Duration> {
    None
  }

  /// Stable, fixed-length hash used as the cache entry key.
  fn cache_hash(&self) -> String {
    let mut hasher = Sha256::new();
    hasher.update(self.operation().as_bytes());
    hasher.update(b":");
    hasher.update(self.params().as_bytes());
    hex::encode(hasher.finalize())
  }

  /// Human-readable description for logs.
  fn description(&self) -> String {
    format!("{}({})", self.operation(), self.params())
  }
}

/// Performs the network call behind a query key.
///
/// Each cache owns one fetcher so that invalidated entries can be refetched
/// without the caller being involved.
pub trait Fetcher<K: QueryKey>: Send + Sync + 'static {
  fn fetch(&self, key: &K) -> BoxFuture<'static, Result<K::Value, ApiError>>;
}

impl<K, F, Fut> Fetcher<K> for F
where
  K: QueryKey,
  F: Fn(&K) -> Fut + Send + Sync + 'static,
  Fut: Future<Output = Result<K::Value, ApiError>> + Send + 'static,
{
  fn fetch(&self, key: &K) -> BoxFuture<'static, Result<K::Value, ApiError>> {
    Box::pin(self(key))
  }
}

/// Result from a cache operation, including data and metadata about the source.
#[derive(Debug, Clone)]
pub struct CacheResult<T> {
  /// The actual data
  pub data: T,
  /// Where the data came from
  pub source: CacheSource,
  /// When the data was fetched from the server
  pub cached_at: DateTime<Utc>,
}

impl<T> CacheResult<T> {
  /// Create a new cache result from fresh network data.
  pub fn from_network(data: T) -> Self {
    Self {
      data,
      source: CacheSource::Network,
      cached_at: Utc::now(),
    }
  }

  /// Create a new cache result from cached data.
  pub fn from_cache(data: T, cached_at: DateTime<Utc>) -> Self {
    Self {
      data,
      source: CacheSource::Cache,
      cached_at,
    }
  }

  pub fn is_from_cache(&self) -> bool {
    self.source == CacheSource::Cache
  }
}

/// Indicates where cached data came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
  /// Fresh data from network
  Network,
  /// Served from a fresh cache entry without a network call
  Cache,
}
