use chrono::{DateTime, Utc};
use ratatui::prelude::Color;

/// Truncate to at most `max_chars` characters, ending in "..." when cut
pub fn truncate(s: &str, max_chars: usize) -> String {
  if s.chars().count() <= max_chars {
    return s.to_string();
  }
  let kept: String = s.chars().take(max_chars.saturating_sub(3)).collect();
  format!("{}...", kept)
}

pub fn active_label(is_active: bool) -> &'static str {
  if is_active {
    "Active"
  } else {
    "Archived"
  }
}

pub fn active_color(is_active: bool) -> Color {
  if is_active {
    Color::Green
  } else {
    Color::DarkGray
  }
}

pub fn format_date(at: &DateTime<Utc>) -> String {
  at.format("%d %b %Y %H:%M").to_string()
}
