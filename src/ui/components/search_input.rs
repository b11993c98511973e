use std::time::{Duration, Instant};

use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Clear, Paragraph};

use super::input::{InputResult, TextInput};
use super::KeyResult;
use crate::config::SearchConfig;
use crate::properties::validate::validate_search;

/// Events emitted by the search box that the parent view applies
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchEvent {
  /// Search term to apply (already trimmed; empty clears the filter)
  Changed(String),
}

/// Holds back search terms until typing pauses.
///
/// Each keystroke restarts the quiet period. Terms over the length limit
/// set an error instead and are never emitted.
#[derive(Debug, Clone)]
pub struct Debouncer {
  delay: Duration,
  max_length: usize,
  pending: Option<(String, Instant)>,
  last_emitted: String,
  error: Option<String>,
}

impl Debouncer {
  pub fn new(delay: Duration, max_length: usize) -> Self {
    Self {
      delay,
      max_length,
      pending: None,
      last_emitted: String::new(),
      error: None,
    }
  }

  pub fn max_length(&self) -> usize {
    self.max_length
  }

  /// Record the latest raw input.
  pub fn on_input(&mut self, value: &str, now: Instant) {
    match validate_search(value, self.max_length) {
      Ok(term) => {
        self.error = None;
        self.pending = Some((term, now));
      }
      Err(err) => {
        self.error = Some(err.to_string());
        self.pending = None;
      }
    }
  }

  /// Emit the pending term once the quiet period has passed.
  pub fn poll(&mut self, now: Instant) -> Option<String> {
    match &self.pending {
      Some((_, at)) if now.duration_since(*at) >= self.delay => self.flush(),
      _ => None,
    }
  }

  /// Emit the pending term immediately.
  pub fn flush(&mut self) -> Option<String> {
    let (term, _) = self.pending.take()?;
    if term == self.last_emitted {
      return None;
    }
    self.last_emitted = term.clone();
    Some(term)
  }

  /// Forget pending input and report an empty term if one was applied.
  pub fn reset(&mut self) -> Option<String> {
    self.pending = None;
    self.error = None;
    if self.last_emitted.is_empty() {
      return None;
    }
    self.last_emitted.clear();
    Some(String::new())
  }

  pub fn error(&self) -> Option<&str> {
    self.error.as_deref()
  }
}

/// Search box overlay with debounced emission
#[derive(Debug, Clone)]
pub struct SearchInput {
  input: TextInput,
  debouncer: Debouncer,
  active: bool,
}

impl SearchInput {
  pub fn new(config: &SearchConfig) -> Self {
    Self {
      input: TextInput::new(),
      debouncer: Debouncer::new(config.debounce(), config.max_length),
      active: false,
    }
  }

  /// Start with a term already applied (e.g. from config)
  pub fn with_term(mut self, term: &str) -> Self {
    self.input.set_value(term);
    self.debouncer.last_emitted = term.trim().to_string();
    self
  }

  pub fn is_active(&self) -> bool {
    self.active
  }

  pub fn query(&self) -> &str {
    self.input.value()
  }

  /// Call regardless of active state; `/` opens the box.
  pub fn handle_key(&mut self, key: KeyEvent) -> KeyResult<SearchEvent> {
    self.handle_key_at(key, Instant::now())
  }

  fn handle_key_at(&mut self, key: KeyEvent, now: Instant) -> KeyResult<SearchEvent> {
    if !self.active {
      if key.code == KeyCode::Char('/') {
        self.active = true;
        return KeyResult::Handled;
      }
      return KeyResult::NotHandled;
    }

    match self.input.handle_key(key) {
      InputResult::Changed => {
        self.debouncer.on_input(self.input.value(), now);
        KeyResult::Handled
      }
      InputResult::Submitted(_) => {
        if self.debouncer.error().is_some() {
          return KeyResult::Handled;
        }
        self.active = false;
        emitted(self.debouncer.flush())
      }
      InputResult::Cancelled => {
        self.active = false;
        self.input.clear();
        emitted(self.debouncer.reset())
      }
      InputResult::Consumed => KeyResult::Handled,
      // Swallow everything else so view shortcuts don't fire while typing
      InputResult::NotHandled => KeyResult::Handled,
    }
  }

  /// Call on every tick; returns a term once typing has paused.
  pub fn poll(&mut self) -> Option<String> {
    self.debouncer.poll(Instant::now())
  }

  pub fn render_overlay(&self, frame: &mut Frame, area: Rect) {
    if !self.active {
      return;
    }

    let width = overlay_width(area.width);
    let height = if self.debouncer.error().is_some() { 4 } else { 3 };
    let overlay_area = Rect::new(area.x + 1, area.y + 1, width, height.min(area.height));

    frame.render_widget(Clear, overlay_area);

    let border = if self.debouncer.error().is_some() {
      Color::Red
    } else {
      Color::Yellow
    };
    let counter = format!(
      " {}/{} ",
      self.input.len(),
      self.debouncer.max_length()
    );
    let block = Block::default()
      .borders(Borders::ALL)
      .border_style(Style::default().fg(border))
      .title(" Search address ")
      .title_bottom(Line::from(counter).right_aligned());

    let inner = block.inner(overlay_area);
    frame.render_widget(block, overlay_area);

    if inner.height == 0 {
      return;
    }

    let mut lines = vec![Line::from(vec![
      Span::styled("/", Style::default().fg(Color::Yellow)),
      Span::raw(self.input.value()),
      Span::styled("_", Style::default().fg(Color::Yellow)),
    ])];
    if let Some(error) = self.debouncer.error() {
      lines.push(Line::styled(error, Style::default().fg(Color::Red)));
    }
    frame.render_widget(Paragraph::new(lines), inner);
  }
}

/// 60% of the available width, kept between 30 and 60 columns
fn overlay_width(available: u16) -> u16 {
  let share = u32::from(available) * 60 / 100;
  u16::try_from(share)
    .unwrap_or(u16::MAX)
    .clamp(30, 60)
    .min(available)
}

fn emitted(term: Option<String>) -> KeyResult<SearchEvent> {
  match term {
    Some(term) => KeyResult::Event(SearchEvent::Changed(term)),
    None => KeyResult::Handled,
  }
}
