//! Undo handles for optimistic edits.

use std::fmt;
use tracing::warn;

/// What happened when an optimistic patch was undone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UndoOutcome {
  /// The patch was removed and the entry rebuilt without it
  Reverted,
  /// A server response newer than the patch already replaced it; nothing changed
  Superseded,
  /// Nothing was cached when the patch was created, so there is nothing to revert
  NotApplied,
  /// The entry is gone (evicted) or the patch was already resolved
  Missing,
}

/// Cache-specific side of an undo token.
pub(crate) trait PatchHandle: Send {
  fn applied(&self) -> bool;
  fn undo(&mut self) -> UndoOutcome;
  fn commit(&mut self);
  fn describe(&self) -> String;
}

/// Returned by `update_locally`. Either `undo` it (mutation failed) or `commit`
/// it (mutation confirmed). Dropping an unresolved token undoes it.
pub struct UndoToken {
  handle: Box<dyn PatchHandle>,
}

impl UndoToken {
  pub(crate) fn new(handle: impl PatchHandle + 'static) -> Self {
    Self {
      handle: Box::new(handle),
    }
  }

  /// Whether the patch changed anything when it was created.
  pub fn is_applied(&self) -> bool {
    self.handle.applied()
  }

  /// Revert this patch only; later patches on the same entry stay in effect.
  pub fn undo(mut self) -> UndoOutcome {
    let outcome = self.handle.undo();
    if outcome == UndoOutcome::Superseded {
      warn!(
        patch = %self.handle.describe(),
        "Refusing undo: entry was confirmed by a newer server response"
      );
    }
    outcome
  }

  /// Keep the patch's change until the next server value replaces it.
  pub fn commit(mut self) {
    self.handle.commit();
  }
}

impl fmt::Debug for UndoToken {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("UndoToken")
      .field("patch", &self.handle.describe())
      .field("applied", &self.handle.applied())
      .finish()
  }
}

/// Ordered group of patches created by one mutation, resolved as a unit.
#[derive(Debug, Default)]
pub struct PatchSet {
  tokens: Vec<UndoToken>,
}

impl PatchSet {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn push(&mut self, token: UndoToken) {
    self.tokens.push(token);
  }

  pub fn extend(&mut self, other: PatchSet) {
    self.tokens.extend(other.tokens);
  }

  pub fn len(&self) -> usize {
    self.tokens.len()
  }

  pub fn is_empty(&self) -> bool {
    self.tokens.is_empty()
  }

  /// Number of patches that actually changed a cached value.
  pub fn applied_count(&self) -> usize {
    self.tokens.iter().filter(|t| t.is_applied()).count()
  }

  /// Undo every patch, newest first.
  pub fn undo(self) -> Vec<UndoOutcome> {
    self.tokens.into_iter().rev().map(UndoToken::undo).collect()
  }

  pub fn commit(self) {
    for token in self.tokens {
      token.commit();
    }
  }
}
