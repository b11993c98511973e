use crossterm::event::KeyEvent;
use ratatui::prelude::*;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{info, warn};

use crate::config::SearchConfig;
use crate::event::Event;
use crate::lookup::AddressLookup;
use crate::properties::{PendingMutation, PropertyApi};
use crate::ui::components::StatusMessage;

/// A keyboard shortcut hint for display in the header
#[derive(Debug, Clone)]
pub struct ShortcutInfo {
  pub key: &'static str,
  pub label: &'static str,
  pub priority: u8, // Lower = shown first
}

impl ShortcutInfo {
  pub const fn new(key: &'static str, label: &'static str) -> Self {
    Self {
      key,
      label,
      priority: 100,
    }
  }

  pub const fn with_priority(mut self, priority: u8) -> Self {
    self.priority = priority;
    self
  }
}

/// Shared handles every view needs.
///
/// Cheap to clone; views keep their own copy.
#[derive(Clone)]
pub struct ViewContext {
  pub api: PropertyApi,
  pub lookup: Option<AddressLookup>,
  pub search: SearchConfig,
  events: UnboundedSender<Event>,
}

impl ViewContext {
  pub fn new(
    api: PropertyApi,
    lookup: Option<AddressLookup>,
    search: SearchConfig,
    events: UnboundedSender<Event>,
  ) -> Self {
    Self {
      api,
      lookup,
      search,
      events,
    }
  }

  /// Show a message in the footer
  pub fn notify(&self, message: StatusMessage) {
    // Receiver only goes away on shutdown
    let _ = self.events.send(Event::Status(message));
  }

  /// Send a mutation whose optimistic patches are already applied, and
  /// report the outcome in the footer once the server answers.
  pub fn run_mutation<T: Send + 'static>(&self, label: &'static str, pending: PendingMutation<T>) {
    let events = self.events.clone();
    tokio::spawn(async move {
      let message = match pending.settle().await {
        Ok(_) => {
          info!(mutation = label, "Mutation confirmed");
          StatusMessage::success(format!("{} succeeded", label))
        }
        Err(err) => {
          warn!(mutation = label, error = %err, "Mutation rolled back");
          StatusMessage::error(format!("{} failed: {}", label, err))
        }
      };
      let _ = events.send(Event::Status(message));
    });
  }
}

/// Actions that a view can request in response to user input
pub enum ViewAction {
  /// No action needed
  None,
  /// Push a new view onto the stack
  Push(Box<dyn View>),
  /// Pop current view from stack (go back)
  Pop,
}

/// Trait for view behavior
///
/// Views handle their own input modes (search, form editing) and return
/// actions for the App to execute: App → View → Components.
///
/// Views that show server data hold a `Query<K>` and poll it in `tick()`.
pub trait View {
  /// Handle a key event, returning an action for App to execute
  fn handle_key(&mut self, key: KeyEvent) -> ViewAction;

  /// Render the view to the frame
  fn render(&mut self, frame: &mut Frame, area: Rect);

  /// Get the breadcrumb label for this view
  fn breadcrumb_label(&self) -> String;

  /// Called on each tick to poll queries and debounced input
  fn tick(&mut self) {}

  /// Called when the view above this one is popped
  fn on_resume(&mut self) {}

  /// True while the view is capturing text, so global keys are not applied
  fn is_editing(&self) -> bool {
    false
  }

  /// Keyboard shortcuts to display in the header
  fn shortcuts(&self) -> Vec<ShortcutInfo> {
    vec![ShortcutInfo::new("q", "back").with_priority(90)]
  }
}
