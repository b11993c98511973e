use std::time::{Duration, Instant};

use ratatui::prelude::*;
use ratatui::widgets::Paragraph;

/// How long a status message stays in the footer
const STATUS_TTL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusLevel {
  Info,
  Success,
  Error,
}

/// Transient message shown at the right of the footer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusMessage {
  pub level: StatusLevel,
  pub text: String,
  pub shown_at: Instant,
}

impl StatusMessage {
  pub fn info(text: impl Into<String>) -> Self {
    Self::new(StatusLevel::Info, text)
  }

  pub fn success(text: impl Into<String>) -> Self {
    Self::new(StatusLevel::Success, text)
  }

  pub fn error(text: impl Into<String>) -> Self {
    Self::new(StatusLevel::Error, text)
  }

  fn new(level: StatusLevel, text: impl Into<String>) -> Self {
    Self {
      level,
      text: text.into(),
      shown_at: Instant::now(),
    }
  }

  /// Errors stay twice as long as other messages
  pub fn is_expired(&self, now: Instant) -> bool {
    let ttl = match self.level {
      StatusLevel::Error => STATUS_TTL * 2,
      _ => STATUS_TTL,
    };
    now.duration_since(self.shown_at) >= ttl
  }

  fn color(&self) -> Color {
    match self.level {
      StatusLevel::Info => Color::White,
      StatusLevel::Success => Color::Green,
      StatusLevel::Error => Color::Red,
    }
  }
}

/// Draw the footer bar with view breadcrumb and the latest status message
pub fn draw_footer(
  frame: &mut Frame,
  area: Rect,
  breadcrumb: &[String],
  status: Option<&StatusMessage>,
) {
  let mut spans = vec![Span::raw(" ")];

  for (i, part) in breadcrumb.iter().enumerate() {
    if i > 0 {
      spans.push(Span::styled(" > ", Style::default().fg(Color::DarkGray)));
    }

    let style = if i == breadcrumb.len() - 1 {
      Style::default().fg(Color::Cyan).bold()
    } else {
      Style::default().fg(Color::White)
    };

    spans.push(Span::styled(part.clone(), style));
  }

  let [left, right] =
    Layout::horizontal([Constraint::Min(10), Constraint::Percentage(50)]).areas(area);

  let bar = Style::default().bg(Color::Black);
  frame.render_widget(Paragraph::new(Line::from(spans)).style(bar), left);

  let message = status
    .map(|s| Line::styled(format!("{} ", s.text), Style::default().fg(s.color())))
    .unwrap_or_default()
    .right_aligned();
  frame.render_widget(Paragraph::new(message).style(bar), right);
}
