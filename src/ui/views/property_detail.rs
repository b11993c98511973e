use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Paragraph, Row, Table, TableState};

use crate::properties::{
  PropertyDetailKey, PropertyWithReports, ReportFilters, ReportStatus, ReportType,
};
use crate::query::{Query, QueryState};
use crate::ui::components::StatusMessage;
use crate::ui::ensure_valid_selection;
use crate::ui::renderfns::{active_color, active_label, format_date, truncate};
use crate::ui::view::{ShortcutInfo, View, ViewAction, ViewContext};
use crate::ui::views::PropertyFormView;

/// One property with its reports
pub struct PropertyDetailView {
  ctx: ViewContext,
  id: String,
  query: Query<PropertyDetailKey>,
  reports_state: TableState,
}

impl PropertyDetailView {
  pub fn new(ctx: ViewContext, id: String) -> Self {
    let mut query = Query::new(ctx.api.details(), PropertyDetailKey::new(id.clone()));
    query.fetch();

    Self {
      ctx,
      id,
      query,
      reports_state: TableState::default(),
    }
  }

  fn detail(&self) -> Option<&PropertyWithReports> {
    self.query.data()
  }

  fn filters(&self) -> &ReportFilters {
    &self.query.key().filters
  }

  fn set_filters(&mut self, filters: ReportFilters) {
    self
      .query
      .set_key(PropertyDetailKey::with_filters(self.id.clone(), filters));
  }

  fn archive(&self) {
    let Some(detail) = self.detail() else {
      return;
    };
    if !detail.property.is_active {
      self.ctx.notify(StatusMessage::info("Property is already archived"));
      return;
    }
    match self.ctx.api.archive_property(&self.id) {
      Ok(pending) => self.ctx.run_mutation("Archive property", pending),
      Err(err) => self.ctx.notify(StatusMessage::error(err.to_string())),
    }
  }

  fn render_fields(&self, frame: &mut Frame, area: Rect, detail: &PropertyWithReports) {
    let property = &detail.property;
    let label = Style::default().fg(Color::DarkGray);
    let field = |name: &'static str, value: String| {
      Line::from(vec![
        Span::styled(format!("{:<14}", name), label),
        Span::raw(value),
      ])
    };

    let lines = vec![
      field("Name", property.display_name().to_string()),
      field("Address", property.address.clone()),
      field("City", property.city.clone()),
      field("Postcode", property.postcode.clone()),
      Line::from(vec![
        Span::styled(format!("{:<14}", "Status"), label),
        Span::styled(
          active_label(property.is_active),
          Style::default().fg(active_color(property.is_active)),
        ),
      ]),
      field("Reports", property.no_of_reports.to_string()),
      field("Created", format_date(&property.created_at)),
      field("Last activity", format_date(&property.updated_at)),
    ];

    let block = Block::default()
      .title(format!(" {} ", truncate(property.display_name(), 60)))
      .borders(Borders::ALL)
      .border_style(Style::default().fg(Color::Blue));
    frame.render_widget(Paragraph::new(lines).block(block), area);
  }

  fn render_reports(&mut self, frame: &mut Frame, area: Rect) {
    let len = self.detail().map(|d| d.reports.len()).unwrap_or(0);
    ensure_valid_selection(&mut self.reports_state, len);

    let filters = self.filters();
    let mut title = format!(" Reports ({}) ", len);
    if let Some(t) = filters.report_type.first() {
      title.push_str(&format!("type: {} ", t.label()));
    }
    if let Some(s) = filters.report_status.first() {
      title.push_str(&format!("status: {} ", s.label()));
    }
    let block = Block::default()
      .title(title)
      .borders(Borders::ALL)
      .border_style(Style::default().fg(Color::Blue));

    if len == 0 {
      let paragraph = Paragraph::new("No reports.")
        .block(block)
        .style(Style::default().fg(Color::DarkGray));
      frame.render_widget(paragraph, area);
      return;
    }

    let rows: Vec<Row> = self
      .detail()
      .map(|d| d.reports.as_slice())
      .unwrap_or(&[])
      .iter()
      .map(|report| {
        Row::new(vec![
          report.report_type.label().to_string(),
          report.status.label().to_string(),
          format_date(&report.created_at),
          report.completion_date.clone().unwrap_or_default(),
          truncate(report.notes.as_deref().unwrap_or(""), 50),
        ])
      })
      .collect();

    let table = Table::new(
      rows,
      [
        Constraint::Length(12),
        Constraint::Length(14),
        Constraint::Length(18),
        Constraint::Length(12),
        Constraint::Min(10),
      ],
    )
    .header(
      Row::new(["Type", "Status", "Created", "Completed", "Notes"])
        .style(Style::default().fg(Color::Yellow).bold()),
    )
    .block(block)
    .row_highlight_style(Style::default().bg(Color::DarkGray))
    .highlight_symbol("> ");

    frame.render_stateful_widget(table, area, &mut self.reports_state);
  }
}

/// None → each variant in turn → None
fn cycle_one<T: Copy + PartialEq>(all: &[T], current: &[T]) -> Vec<T> {
  match current.first() {
    None => all.first().copied().into_iter().collect(),
    Some(c) => {
      let index = all.iter().position(|t| t == c).unwrap_or(all.len());
      all.get(index + 1).copied().into_iter().collect()
    }
  }
}

impl View for PropertyDetailView {
  fn handle_key(&mut self, key: KeyEvent) -> ViewAction {
    match key.code {
      KeyCode::Char('j') | KeyCode::Down => self.reports_state.select_next(),
      KeyCode::Char('k') | KeyCode::Up => self.reports_state.select_previous(),
      KeyCode::Char('a') => self.archive(),
      KeyCode::Char('e') => {
        if let Some(detail) = self.detail() {
          return ViewAction::Push(Box::new(PropertyFormView::edit(
            self.ctx.clone(),
            detail.property.clone(),
          )));
        }
      }
      KeyCode::Char('t') => {
        let mut filters = self.filters().clone();
        filters.report_type = cycle_one(&ReportType::ALL, &filters.report_type);
        self.set_filters(filters);
      }
      KeyCode::Char('x') => {
        let mut filters = self.filters().clone();
        filters.report_status = cycle_one(&ReportStatus::ALL, &filters.report_status);
        self.set_filters(filters);
      }
      KeyCode::Char('r') => self.query.refetch(),
      KeyCode::Char('q') | KeyCode::Esc => return ViewAction::Pop,
      _ => {}
    }
    ViewAction::None
  }

  fn render(&mut self, frame: &mut Frame, area: Rect) {
    let Some(detail) = self.detail().cloned() else {
      let content = match self.query.state() {
        QueryState::Error => format!(
          "Failed to load property: {}. Press 'r' to retry.",
          self
            .query
            .error()
            .map(|e| e.to_string())
            .unwrap_or_default()
        ),
        _ => "Loading property...".to_string(),
      };
      let block = Block::default()
        .title(format!(" Property {} ", self.id))
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Blue));
      frame.render_widget(
        Paragraph::new(content)
          .block(block)
          .style(Style::default().fg(Color::DarkGray)),
        area,
      );
      return;
    };

    let [fields, reports] =
      Layout::vertical([Constraint::Length(10), Constraint::Min(3)]).areas(area);
    self.render_fields(frame, fields, &detail);
    self.render_reports(frame, reports);
  }

  fn breadcrumb_label(&self) -> String {
    self
      .detail()
      .map(|d| truncate(d.property.display_name(), 30))
      .unwrap_or_else(|| self.id.clone())
  }

  fn tick(&mut self) {
    self.query.poll();
  }

  fn on_resume(&mut self) {
    self.query.fetch();
  }

  fn shortcuts(&self) -> Vec<ShortcutInfo> {
    vec![
      ShortcutInfo::new("e", "edit").with_priority(10),
      ShortcutInfo::new("a", "archive").with_priority(11),
      ShortcutInfo::new("t", "report type").with_priority(20),
      ShortcutInfo::new("x", "report status").with_priority(21),
      ShortcutInfo::new("r", "refresh").with_priority(30),
      ShortcutInfo::new("q", "back").with_priority(90),
    ]
  }
}
