use crate::api::ApiClient;
use crate::config::Config;
use crate::event::{Event, EventHandler};
use crate::lookup::AddressLookup;
use crate::properties::PropertyApi;
use crate::ui;
use crate::ui::components::StatusMessage;
use crate::ui::renderfns::header::extract_host;
use crate::ui::view::{View, ViewAction, ViewContext};
use crate::ui::views::PropertyListView;
use color_eyre::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use crossterm::terminal::{
  disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::ExecutableCommand;
use ratatui::prelude::*;
use std::io::stdout;
use std::time::{Duration, Instant};
use tracing::{info, warn};

const TICK_RATE: Duration = Duration::from_millis(100);

/// Main application state
pub struct App {
  /// Navigation stack - root is always at index 0
  view_stack: Vec<Box<dyn View>>,

  /// Header title
  title: String,

  /// Latest footer message
  status: Option<StatusMessage>,

  config: Config,
  api: PropertyApi,
  lookup: Option<AddressLookup>,

  should_quit: bool,
}

impl App {
  pub fn new(config: Config) -> Result<Self> {
    let client = ApiClient::new(&config.api.url, config.api_timeout())?;
    let api = PropertyApi::new(client, Config::request_context(), config.cache_config());

    let lookup = match config.lookup_key() {
      Some(key) => Some(AddressLookup::new(
        &config.lookup.url,
        key,
        config.lookup_timeout(),
      )?),
      None => {
        warn!("No address lookup key configured, postcode lookup disabled");
        None
      }
    };

    let title = config
      .title
      .clone()
      .unwrap_or_else(|| extract_host(&config.api.url).to_string());

    Ok(Self {
      view_stack: Vec::new(),
      title,
      status: None,
      config,
      api,
      lookup,
      should_quit: false,
    })
  }

  pub async fn run(&mut self) -> Result<()> {
    // Setup terminal
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;

    let mut events = EventHandler::new(TICK_RATE);
    let ctx = ViewContext::new(
      self.api.clone(),
      self.lookup.clone(),
      self.config.search.clone(),
      events.sender(),
    );
    self
      .view_stack
      .push(Box::new(PropertyListView::new(ctx, self.config.list.clone())));
    info!(api = %self.config.api.url, "Started");

    let result = self.event_loop(&mut terminal, &mut events).await;

    // Restore the terminal even if drawing failed
    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;

    result
  }

  async fn event_loop(
    &mut self,
    terminal: &mut Terminal<CrosstermBackend<std::io::Stdout>>,
    events: &mut EventHandler,
  ) -> Result<()> {
    while !self.should_quit {
      terminal.draw(|frame| ui::draw(frame, self))?;

      match events.next().await {
        Some(event) => self.handle_event(event),
        None => break,
      }
    }
    Ok(())
  }

  fn handle_event(&mut self, event: Event) {
    match event {
      Event::Key(key) => self.handle_key(key),
      Event::Tick => self.tick(),
      Event::Status(message) => self.status = Some(message),
    }
  }

  fn tick(&mut self) {
    for view in &mut self.view_stack {
      view.tick();
    }
    self.api.lists().evict_idle();
    self.api.details().evict_idle();

    if self
      .status
      .as_ref()
      .is_some_and(|s| s.is_expired(Instant::now()))
    {
      self.status = None;
    }
  }

  fn handle_key(&mut self, key: KeyEvent) {
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
      self.should_quit = true;
      return;
    }

    let action = match self.view_stack.last_mut() {
      Some(view) => view.handle_key(key),
      None => ViewAction::Pop,
    };
    self.apply(action);
  }

  fn apply(&mut self, action: ViewAction) {
    match action {
      ViewAction::None => {}
      ViewAction::Push(view) => self.view_stack.push(view),
      ViewAction::Pop => {
        if self.view_stack.len() > 1 {
          self.view_stack.pop();
          if let Some(view) = self.view_stack.last_mut() {
            view.on_resume();
          }
        } else {
          self.should_quit = true;
        }
      }
    }
  }

  pub fn current_view_mut(&mut self) -> Option<&mut Box<dyn View>> {
    self.view_stack.last_mut()
  }

  pub fn breadcrumb(&self) -> Vec<String> {
    self
      .view_stack
      .iter()
      .map(|view| view.breadcrumb_label())
      .collect()
  }

  pub fn title(&self) -> &str {
    &self.title
  }

  pub fn status(&self) -> Option<&StatusMessage> {
    self.status.as_ref()
  }
}
