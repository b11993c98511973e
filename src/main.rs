mod api;
mod app;
mod cache;
mod config;
mod event;
mod lookup;
mod properties;
mod query;
mod ui;

use clap::Parser;
use color_eyre::Result;
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "propdash")]
#[command(about = "A terminal dashboard for property management, inspired by k9s")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/propdash/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Only list properties in this city
  #[arg(long)]
  city: Option<String>,

  /// Write logs to this file instead of the daily log under the data directory
  #[arg(long)]
  log_file: Option<PathBuf>,
}

/// Log to a file so output never lands on the terminal UI.
/// Filter with PROPDASH_LOG (e.g. `propdash=debug`), default `info`.
fn init_logging(log_file: Option<&Path>) -> Result<WorkerGuard> {
  let appender = match log_file {
    Some(path) => {
      let dir = path.parent().filter(|p| !p.as_os_str().is_empty());
      let name = path
        .file_name()
        .ok_or_else(|| color_eyre::eyre::eyre!("Invalid log file: {}", path.display()))?;
      rolling::never(dir.unwrap_or_else(|| Path::new(".")), name)
    }
    None => rolling::daily(config::Config::data_dir().join("logs"), "propdash.log"),
  };
  let (writer, guard) = tracing_appender::non_blocking(appender);

  let filter = EnvFilter::try_from_env("PROPDASH_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(writer)
    .with_ansi(false)
    .init();

  Ok(guard)
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();
  let _log_guard = init_logging(args.log_file.as_deref())?;

  // Load configuration
  let mut config = config::Config::load(args.config.as_deref())?;

  // Override city filter if specified on command line
  if let Some(city) = args.city {
    config.list.city = Some(city).filter(|c| !c.trim().is_empty());
  }

  // Initialize and run the app
  let mut app = app::App::new(config)?;
  app.run().await?;

  Ok(())
}
