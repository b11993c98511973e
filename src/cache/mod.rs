//! Tag-based query cache with optimistic updates.
//!
//! This module provides the data layer the views sit on:
//! - Caches query results keyed by operation + parameters
//! - Labels entries with tags so mutations can invalidate related queries
//! - Applies optimistic patches with per-patch undo
//! - Deduplicates concurrent requests and refetches observed entries on invalidation

mod entry;
mod layer;
mod mutation;
mod patch;
mod tags;
mod traits;

pub use entry::{EntrySnapshot, Transform};
pub use layer::{CacheConfig, InvalidationReport, QueryCache, Subscription};
pub use mutation::{Invalidate, MutationState, OptimisticMutation};
pub use patch::{PatchSet, UndoOutcome, UndoToken};
pub use tags::{tags_for_list, Tag, TagKind, LIST_ID};
pub use traits::{CacheResult, CacheSource, Fetcher, QueryKey};
