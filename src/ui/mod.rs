pub mod components;
pub mod renderfns;
pub mod view;
pub mod views;

use crate::app::App;
use components::draw_footer;
use ratatui::prelude::*;
use ratatui::widgets::TableState;
use renderfns::draw_header;

/// Main draw function: header, current view, footer
pub fn draw(frame: &mut Frame, app: &mut App) {
  let [header, content, footer] = Layout::vertical([
    Constraint::Length(1),
    Constraint::Min(1),
    Constraint::Length(1),
  ])
  .areas(frame.area());

  let title = app.title().to_string();
  let breadcrumb = app.breadcrumb();
  let status = app.status().cloned();

  if let Some(view) = app.current_view_mut() {
    draw_header(frame, header, &title, &view.shortcuts());
    view.render(frame, content);
  }

  draw_footer(frame, footer, &breadcrumb, status.as_ref());
}

/// Keep a table selection inside `0..len`, selecting the first row when
/// rows appear and clearing it when they all go away.
pub fn ensure_valid_selection(state: &mut TableState, len: usize) {
  match state.selected() {
    _ if len == 0 => state.select(None),
    None => state.select(Some(0)),
    Some(i) if i >= len => state.select(Some(len - 1)),
    Some(_) => {}
  }
}
