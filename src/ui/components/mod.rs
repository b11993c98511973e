mod footer;
mod input;
mod search_input;

pub use footer::{draw_footer, StatusLevel, StatusMessage};
pub use input::{InputResult, TextInput};
pub use search_input::{Debouncer, SearchEvent, SearchInput};

/// Outcome of offering a key to a component.
///
/// Components return this so the parent view knows whether to keep
/// looking for a handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyResult<T> {
  /// Key was consumed, nothing for the parent to do
  Handled,
  /// Key was consumed and produced an event for the parent
  Event(T),
  /// Key was not consumed, parent should try the next handler
  NotHandled,
}
