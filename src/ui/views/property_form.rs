use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph};
use tokio::sync::oneshot;
use tracing::debug;

use crate::api::{ApiError, ValidationError};
use crate::lookup::{split_address, LookupError, LookupOutcome, NO_ADDRESSES_MESSAGE};
use crate::properties::{CreatePropertyRequest, Property, UpdatePropertyRequest};
use crate::ui::components::{InputResult, StatusMessage, TextInput};
use crate::ui::view::{ShortcutInfo, View, ViewAction, ViewContext};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
  Postcode,
  Address,
  City,
}

impl Field {
  const ALL: [Field; 3] = [Field::Postcode, Field::Address, Field::City];

  fn key(&self) -> &'static str {
    match self {
      Field::Postcode => "postcode",
      Field::Address => "address",
      Field::City => "city",
    }
  }

  fn label(&self) -> &'static str {
    match self {
      Field::Postcode => "Postal code",
      Field::Address => "Address",
      Field::City => "City",
    }
  }

  fn next(&self) -> Self {
    match self {
      Field::Postcode => Field::Address,
      Field::Address => Field::City,
      Field::City => Field::Postcode,
    }
  }

  fn previous(&self) -> Self {
    match self {
      Field::Postcode => Field::City,
      Field::Address => Field::Postcode,
      Field::City => Field::Address,
    }
  }
}

enum Mode {
  Create,
  Edit(Property),
}

/// Progress of a postcode lookup
enum Lookup {
  Idle,
  Searching(oneshot::Receiver<Result<LookupOutcome, LookupError>>),
  Picking(Vec<String>, ListState),
  Failed(String),
}

/// Create or edit a property's address
pub struct PropertyFormView {
  ctx: ViewContext,
  mode: Mode,
  postcode: TextInput,
  address: TextInput,
  city: TextInput,
  focus: Field,
  errors: ValidationError,
  lookup: Lookup,
}

impl PropertyFormView {
  pub fn create(ctx: ViewContext) -> Self {
    Self::with_mode(ctx, Mode::Create)
  }

  pub fn edit(ctx: ViewContext, property: Property) -> Self {
    Self::with_mode(ctx, Mode::Edit(property))
  }

  fn with_mode(ctx: ViewContext, mode: Mode) -> Self {
    let (postcode, address, city) = match &mode {
      Mode::Create => Default::default(),
      Mode::Edit(p) => (
        TextInput::with_value(&p.postcode),
        TextInput::with_value(&p.address),
        TextInput::with_value(&p.city),
      ),
    };
    Self {
      ctx,
      mode,
      postcode,
      address,
      city,
      focus: Field::Postcode,
      errors: ValidationError::new(),
      lookup: Lookup::Idle,
    }
  }

  fn input(&self, field: Field) -> &TextInput {
    match field {
      Field::Postcode => &self.postcode,
      Field::Address => &self.address,
      Field::City => &self.city,
    }
  }

  fn input_mut(&mut self, field: Field) -> &mut TextInput {
    match field {
      Field::Postcode => &mut self.postcode,
      Field::Address => &mut self.address,
      Field::City => &mut self.city,
    }
  }

  fn start_lookup(&mut self) {
    let Some(lookup) = self.ctx.lookup.clone() else {
      self.lookup = Lookup::Failed("Address lookup is not configured".to_string());
      return;
    };
    let postcode = self.postcode.value().to_string();
    let (tx, rx) = oneshot::channel();
    tokio::spawn(async move {
      let _ = tx.send(lookup.find(&postcode).await);
    });
    self.lookup = Lookup::Searching(rx);
  }

  fn poll_lookup(&mut self) {
    let Lookup::Searching(rx) = &mut self.lookup else {
      return;
    };
    let result = match rx.try_recv() {
      Ok(result) => result,
      Err(oneshot::error::TryRecvError::Empty) => return,
      Err(oneshot::error::TryRecvError::Closed) => {
        Err(LookupError::Network("Lookup was interrupted".to_string()))
      }
    };
    self.lookup = match result {
      Ok(LookupOutcome::Found(addresses)) => {
        debug!(count = addresses.len(), "Address lookup returned");
        Lookup::Picking(addresses, ListState::default().with_selected(Some(0)))
      }
      Ok(LookupOutcome::NoneFound) => Lookup::Failed(NO_ADDRESSES_MESSAGE.to_string()),
      Err(err) => Lookup::Failed(err.to_string()),
    };
  }

  fn pick_address(&mut self, address: &str) {
    let (line, city) = split_address(address);
    self.address.set_value(&line);
    if !city.is_empty() {
      self.city.set_value(&city);
    }
    self.lookup = Lookup::Idle;
    self.focus = Field::Address;
  }

  /// Handle keys while the address picker is open
  fn handle_picker_key(&mut self, key: KeyEvent) {
    let Lookup::Picking(addresses, state) = &mut self.lookup else {
      return;
    };
    match key.code {
      KeyCode::Down | KeyCode::Char('j') => state.select_next(),
      KeyCode::Up | KeyCode::Char('k') => state.select_previous(),
      KeyCode::Enter => {
        let chosen = state
          .selected()
          .and_then(|i| addresses.get(i.min(addresses.len().saturating_sub(1))))
          .cloned();
        if let Some(address) = chosen {
          self.pick_address(&address);
        }
      }
      KeyCode::Esc => self.lookup = Lookup::Idle,
      _ => {}
    }
  }

  /// Changed fields only; unchanged ones are left out of the update
  fn update_request(&self, original: &Property) -> UpdatePropertyRequest {
    let changed = |input: &TextInput, before: &str| {
      let value = input.value().trim();
      (value != before).then(|| value.to_string())
    };
    UpdatePropertyRequest {
      id: original.id.clone(),
      address: changed(&self.address, &original.address),
      city: changed(&self.city, &original.city),
      postcode: changed(&self.postcode, &original.postcode),
    }
  }

  fn submit(&mut self) -> ViewAction {
    let result = match &self.mode {
      Mode::Create => {
        let request = CreatePropertyRequest {
          address: self.address.value().to_string(),
          city: self.city.value().to_string(),
          postcode: self.postcode.value().to_string(),
        };
        self
          .ctx
          .api
          .create_property(&request)
          .map(|pending| self.ctx.run_mutation("Create property", pending))
      }
      Mode::Edit(original) => {
        let request = self.update_request(original);
        self
          .ctx
          .api
          .update_property(&request)
          .map(|pending| self.ctx.run_mutation("Update property", pending))
      }
    };

    match result {
      Ok(()) => ViewAction::Pop,
      Err(ApiError::Validation(errors)) => {
        if let Some(first) = Field::ALL
          .iter()
          .find(|f| errors.for_field(f.key()).is_some())
        {
          self.focus = *first;
        }
        self.errors = errors;
        ViewAction::None
      }
      Err(err) => {
        self.ctx.notify(StatusMessage::error(err.to_string()));
        ViewAction::None
      }
    }
  }

  fn render_field(&self, frame: &mut Frame, area: Rect, field: Field) {
    let focused = self.focus == field;
    let error = self.errors.for_field(field.key());
    let border = match (focused, error.is_some()) {
      (_, true) => Color::Red,
      (true, false) => Color::Yellow,
      (false, false) => Color::DarkGray,
    };
    let mut block = Block::default()
      .borders(Borders::ALL)
      .border_style(Style::default().fg(border))
      .title(format!(" {} ", field.label()));
    if let Some(error) = error {
      block = block.title_bottom(Line::styled(
        format!(" {} ", error),
        Style::default().fg(Color::Red),
      ));
    }

    let mut spans = vec![Span::raw(self.input(field).value().to_string())];
    if focused {
      spans.push(Span::styled("_", Style::default().fg(Color::Yellow)));
    }
    frame.render_widget(Paragraph::new(Line::from(spans)).block(block), area);
  }

  fn render_lookup(&mut self, frame: &mut Frame, area: Rect) {
    match &mut self.lookup {
      Lookup::Idle => {}
      Lookup::Searching(_) => {
        frame.render_widget(
          Paragraph::new("Looking up addresses...").style(Style::default().fg(Color::DarkGray)),
          area,
        );
      }
      Lookup::Failed(message) => {
        frame.render_widget(
          Paragraph::new(message.as_str()).style(Style::default().fg(Color::Red)),
          area,
        );
      }
      Lookup::Picking(addresses, state) => {
        let height = (addresses.len() as u16 + 2).min(area.height);
        let picker = Rect::new(area.x, area.y, area.width, height);
        frame.render_widget(Clear, picker);
        let items: Vec<ListItem> = addresses
          .iter()
          .map(|a| ListItem::new(a.as_str()))
          .collect();
        let list = List::new(items)
          .block(
            Block::default()
              .borders(Borders::ALL)
              .border_style(Style::default().fg(Color::Yellow))
              .title(format!(" Select address ({}) ", addresses.len())),
          )
          .highlight_style(Style::default().bg(Color::DarkGray).bold())
          .highlight_symbol("> ");
        frame.render_stateful_widget(list, picker, state);
      }
    }
  }
}

impl View for PropertyFormView {
  fn handle_key(&mut self, key: KeyEvent) -> ViewAction {
    if matches!(self.lookup, Lookup::Picking(..)) {
      self.handle_picker_key(key);
      return ViewAction::None;
    }

    match key.code {
      KeyCode::Tab | KeyCode::Down => {
        self.focus = self.focus.next();
        return ViewAction::None;
      }
      KeyCode::BackTab | KeyCode::Up => {
        self.focus = self.focus.previous();
        return ViewAction::None;
      }
      KeyCode::Char('s') if key.modifiers.contains(KeyModifiers::CONTROL) => {
        return self.submit();
      }
      KeyCode::Char('l') if key.modifiers.contains(KeyModifiers::CONTROL) => {
        self.start_lookup();
        return ViewAction::None;
      }
      _ => {}
    }

    let focus = self.focus;
    match self.input_mut(focus).handle_key(key) {
      InputResult::Submitted(_) if focus == Field::Postcode => {
        self.start_lookup();
        ViewAction::None
      }
      InputResult::Submitted(_) => self.submit(),
      InputResult::Cancelled => ViewAction::Pop,
      InputResult::Changed => {
        if focus == Field::Postcode && matches!(self.lookup, Lookup::Failed(_)) {
          self.lookup = Lookup::Idle;
        }
        ViewAction::None
      }
      InputResult::Consumed | InputResult::NotHandled => ViewAction::None,
    }
  }

  fn render(&mut self, frame: &mut Frame, area: Rect) {
    let title = match &self.mode {
      Mode::Create => " New property ".to_string(),
      Mode::Edit(p) => format!(" Edit {} ", p.display_name()),
    };
    let outer = Block::default()
      .title(title)
      .title_alignment(Alignment::Center)
      .borders(Borders::ALL)
      .border_style(Style::default().fg(Color::Blue));
    let inner = outer.inner(area);
    frame.render_widget(outer, area);

    let [postcode, lookup, address, city, general] = Layout::vertical([
      Constraint::Length(3),
      Constraint::Length(1),
      Constraint::Length(3),
      Constraint::Length(3),
      Constraint::Min(1),
    ])
    .areas(inner);

    self.render_field(frame, postcode, Field::Postcode);
    self.render_field(frame, address, Field::Address);
    self.render_field(frame, city, Field::City);

    // Errors that don't belong to a visible field
    let other: Vec<Line> = self
      .errors
      .errors()
      .iter()
      .filter(|e| Field::ALL.iter().all(|f| f.key() != e.field))
      .map(|e| Line::styled(e.message.clone(), Style::default().fg(Color::Red)))
      .collect();
    frame.render_widget(Paragraph::new(other), general);

    // Picker overlays the fields below the postcode
    let picker_area = Rect::new(
      lookup.x,
      lookup.y,
      lookup.width,
      inner.bottom().saturating_sub(lookup.y),
    );
    self.render_lookup(frame, picker_area);
  }

  fn breadcrumb_label(&self) -> String {
    match &self.mode {
      Mode::Create => "New".to_string(),
      Mode::Edit(_) => "Edit".to_string(),
    }
  }

  fn tick(&mut self) {
    self.poll_lookup();
  }

  fn is_editing(&self) -> bool {
    true
  }

  fn shortcuts(&self) -> Vec<ShortcutInfo> {
    vec![
      ShortcutInfo::new("tab", "next field").with_priority(10),
      ShortcutInfo::new("enter", "lookup/save").with_priority(20),
      ShortcutInfo::new("ctrl-s", "save").with_priority(21),
      ShortcutInfo::new("esc", "cancel").with_priority(90),
    ]
  }
}
