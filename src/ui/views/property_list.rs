use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Cell, Paragraph, Row, Table, TableState};

use crate::properties::{ListParams, Property, PropertyListKey, SortField, PAGE_SIZES};
use crate::query::{Query, QueryState};
use crate::ui::components::{KeyResult, SearchEvent, SearchInput, StatusMessage};
use crate::ui::ensure_valid_selection;
use crate::ui::renderfns::{active_color, active_label, truncate};
use crate::ui::view::{ShortcutInfo, View, ViewAction, ViewContext};
use crate::ui::views::{PropertyDetailView, PropertyFormView};

/// Paginated, filterable table of properties
pub struct PropertyListView {
  ctx: ViewContext,
  query: Query<PropertyListKey>,
  table_state: TableState,
  search: SearchInput,
}

impl PropertyListView {
  pub fn new(ctx: ViewContext, params: ListParams) -> Self {
    let search = SearchInput::new(&ctx.search).with_term(params.search.as_deref().unwrap_or(""));
    let mut query = Query::new(ctx.api.lists(), PropertyListKey::new(params));
    query.fetch();

    Self {
      ctx,
      query,
      table_state: TableState::default(),
      search,
    }
  }

  fn params(&self) -> &ListParams {
    &self.query.key().params
  }

  fn rows(&self) -> &[Property] {
    self.query.data().map(|p| p.data.as_slice()).unwrap_or(&[])
  }

  fn selected(&self) -> Option<&Property> {
    self.table_state.selected().and_then(|i| self.rows().get(i))
  }

  fn total_pages(&self) -> u32 {
    self
      .query
      .data()
      .map(|p| p.pagination.total_pages)
      .unwrap_or(1)
  }

  /// Switch to new list parameters, keeping rows on screen until the new page lands
  fn apply(&mut self, params: ListParams) {
    if &params != self.params() {
      self.query.set_key(PropertyListKey::new(params));
      self.table_state.select(Some(0));
    }
  }

  fn apply_search(&mut self, term: String) {
    let mut params = self.params().with_page(1);
    params.search = Some(term).filter(|t| !t.is_empty());
    self.apply(params);
  }

  fn archive_selected(&self) {
    let Some(property) = self.selected() else {
      return;
    };
    if property.is_provisional() {
      self
        .ctx
        .notify(StatusMessage::info("Property is still being created"));
      return;
    }
    if !property.is_active {
      self.ctx.notify(StatusMessage::info("Property is already archived"));
      return;
    }
    match self.ctx.api.archive_property(&property.id) {
      Ok(pending) => self.ctx.run_mutation("Archive property", pending),
      Err(err) => self.ctx.notify(StatusMessage::error(err.to_string())),
    }
  }

  fn title(&self) -> String {
    let params = self.params();
    let total = self.query.data().map(|p| p.pagination.total).unwrap_or(0);
    let mut title = format!(
      " Properties ({}) page {}/{} ",
      total,
      params.page,
      self.total_pages().max(1)
    );
    if let Some(sort) = params.sort_by {
      title.push_str(&format!(
        "sort: {} {} ",
        sort.label(),
        params.sort_order.unwrap_or_default()
      ));
    }
    if let Some(active) = params.is_active {
      title.push_str(&format!("[{}] ", active_label(active)));
    }
    if let Some(search) = &params.search {
      title.push_str(&format!("/{} ", search));
    }
    if self.query.is_loading() {
      title.push_str("(loading...) ");
    } else if self.query.error().is_some() && self.query.data().is_some() {
      title.push_str("(refresh failed, r to retry) ");
    }
    title
  }

  fn render_table(&mut self, frame: &mut Frame, area: Rect) {
    let len = self.rows().len();
    ensure_valid_selection(&mut self.table_state, len);

    let block = Block::default()
      .title(self.title())
      .title_alignment(Alignment::Center)
      .borders(Borders::ALL)
      .border_style(Style::default().fg(Color::Blue));

    if len == 0 {
      let content = match self.query.state() {
        QueryState::Loading | QueryState::Idle => "Loading properties...".to_string(),
        QueryState::Error => format!(
          "Failed to load properties: {}. Press 'r' to retry.",
          self
            .query
            .error()
            .map(|e| e.to_string())
            .unwrap_or_default()
        ),
        QueryState::Success => "No properties found.".to_string(),
      };
      let paragraph = Paragraph::new(content)
        .block(block)
        .style(Style::default().fg(Color::DarkGray));
      frame.render_widget(paragraph, area);
      return;
    }

    let header = Row::new(["Name", "Address", "City", "Postcode", "Reports", "Status"])
      .style(Style::default().fg(Color::Yellow).bold());

    let rows: Vec<Row> = self
      .rows()
      .iter()
      .map(|property| {
        let row = Row::new(vec![
          Cell::from(truncate(property.display_name(), 24)).style(Style::default().fg(Color::Cyan)),
          Cell::from(truncate(&property.address, 40)),
          Cell::from(truncate(&property.city, 16)),
          Cell::from(property.postcode.clone()),
          Cell::from(property.no_of_reports.to_string()),
          Cell::from(active_label(property.is_active))
            .style(Style::default().fg(active_color(property.is_active))),
        ]);
        if property.is_provisional() {
          row.style(Style::default().add_modifier(Modifier::ITALIC | Modifier::DIM))
        } else {
          row
        }
      })
      .collect();

    let widths = [
      Constraint::Length(24),
      Constraint::Min(20),
      Constraint::Length(16),
      Constraint::Length(9),
      Constraint::Length(7),
      Constraint::Length(8),
    ];

    let table = Table::new(rows, widths)
      .header(header)
      .block(block)
      .row_highlight_style(
        Style::default()
          .bg(Color::DarkGray)
          .add_modifier(Modifier::BOLD),
      )
      .highlight_symbol("> ");

    frame.render_stateful_widget(table, area, &mut self.table_state);
  }
}

/// Next allowed page size, wrapping at either end
fn cycle_page_size(limit: u32, forward: bool) -> u32 {
  let index = PAGE_SIZES.iter().position(|&s| s == limit).unwrap_or(0);
  let len = PAGE_SIZES.len();
  let next = if forward {
    (index + 1) % len
  } else {
    (index + len - 1) % len
  };
  PAGE_SIZES[next]
}

/// All → active → archived → all
fn cycle_active_filter(current: Option<bool>) -> Option<bool> {
  match current {
    None => Some(true),
    Some(true) => Some(false),
    Some(false) => None,
  }
}

impl View for PropertyListView {
  fn handle_key(&mut self, key: KeyEvent) -> ViewAction {
    match self.search.handle_key(key) {
      KeyResult::Event(SearchEvent::Changed(term)) => {
        self.apply_search(term);
        return ViewAction::None;
      }
      KeyResult::Handled => return ViewAction::None,
      KeyResult::NotHandled => {}
    }

    match key.code {
      KeyCode::Char('j') | KeyCode::Down => self.table_state.select_next(),
      KeyCode::Char('k') | KeyCode::Up => self.table_state.select_previous(),
      KeyCode::Char('n') | KeyCode::Right => {
        let page = self.params().page;
        if page < self.total_pages() {
          self.apply(self.params().with_page(page + 1));
        }
      }
      KeyCode::Char('p') | KeyCode::Left => {
        let page = self.params().page;
        if page > 1 {
          self.apply(self.params().with_page(page - 1));
        }
      }
      KeyCode::Char(c @ ('+' | '-')) => {
        let mut params = self.params().with_page(1);
        params.limit = cycle_page_size(params.limit, c == '+');
        self.apply(params);
      }
      KeyCode::Char('s') => {
        let mut params = self.params().with_page(1);
        params.sort_by = Some(params.sort_by.map_or(SortField::Address, |f| f.next()));
        self.apply(params);
      }
      KeyCode::Char('o') => {
        let mut params = self.params().with_page(1);
        params.sort_order = Some(params.sort_order.unwrap_or_default().toggle());
        self.apply(params);
      }
      KeyCode::Char('f') => {
        let mut params = self.params().with_page(1);
        params.is_active = cycle_active_filter(params.is_active);
        self.apply(params);
      }
      KeyCode::Char('a') => self.archive_selected(),
      KeyCode::Char('c') => {
        return ViewAction::Push(Box::new(PropertyFormView::create(self.ctx.clone())));
      }
      KeyCode::Char('e') => {
        if let Some(property) = self.selected().filter(|p| !p.is_provisional()) {
          return ViewAction::Push(Box::new(PropertyFormView::edit(
            self.ctx.clone(),
            property.clone(),
          )));
        }
      }
      KeyCode::Enter => {
        if let Some(property) = self.selected().filter(|p| !p.is_provisional()) {
          return ViewAction::Push(Box::new(PropertyDetailView::new(
            self.ctx.clone(),
            property.id.clone(),
          )));
        }
      }
      KeyCode::Char('r') => self.query.refetch(),
      KeyCode::Char('q') | KeyCode::Esc => return ViewAction::Pop,
      _ => {}
    }
    ViewAction::None
  }

  fn render(&mut self, frame: &mut Frame, area: Rect) {
    self.render_table(frame, area);
    self.search.render_overlay(frame, area);
  }

  fn breadcrumb_label(&self) -> String {
    match &self.params().city {
      Some(city) => format!("Properties [{}]", city),
      None => "Properties".to_string(),
    }
  }

  fn tick(&mut self) {
    if let Some(term) = self.search.poll() {
      self.apply_search(term);
    }
    self.query.poll();
  }

  fn on_resume(&mut self) {
    // Refetches only if the page went stale while covered
    self.query.fetch();
  }

  fn is_editing(&self) -> bool {
    self.search.is_active()
  }

  fn shortcuts(&self) -> Vec<ShortcutInfo> {
    vec![
      ShortcutInfo::new("/", "search").with_priority(10),
      ShortcutInfo::new("n/p", "page").with_priority(20),
      ShortcutInfo::new("+/-", "size").with_priority(21),
      ShortcutInfo::new("s/o", "sort").with_priority(22),
      ShortcutInfo::new("f", "active").with_priority(23),
      ShortcutInfo::new("c", "create").with_priority(30),
      ShortcutInfo::new("e", "edit").with_priority(31),
      ShortcutInfo::new("a", "archive").with_priority(32),
      ShortcutInfo::new("r", "refresh").with_priority(40),
      ShortcutInfo::new("q", "quit").with_priority(90),
    ]
  }
}
