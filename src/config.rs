use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::api::RequestContext;
use crate::cache::CacheConfig;
use crate::properties::validate::{validate_list_params, DEFAULT_SEARCH_MAX_LENGTH};
use crate::properties::ListParams;

const DEFAULT_API_URL: &str = "http://localhost:3001/api";
const DEFAULT_LOOKUP_URL: &str = "https://api.getaddress.io";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
  #[serde(default)]
  pub api: ApiConfig,
  #[serde(default)]
  pub lookup: LookupConfig,
  #[serde(default)]
  pub cache: CacheSettings,
  #[serde(default)]
  pub search: SearchConfig,
  /// Initial list filters, page size and sort
  #[serde(default)]
  pub list: ListParams,
  /// Custom title for header (defaults to the API host if not set)
  pub title: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ApiConfig {
  pub url: String,
  pub timeout_secs: u64,
}

impl Default for ApiConfig {
  fn default() -> Self {
    Self {
      url: DEFAULT_API_URL.to_string(),
      timeout_secs: 30,
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct LookupConfig {
  pub url: String,
  /// Prefer PROPDASH_LOOKUP_KEY over storing the key here
  pub api_key: Option<String>,
  pub timeout_secs: u64,
}

impl Default for LookupConfig {
  fn default() -> Self {
    Self {
      url: DEFAULT_LOOKUP_URL.to_string(),
      api_key: None,
      timeout_secs: 10,
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct CacheSettings {
  pub stale_after_secs: u64,
  pub keep_unused_for_secs: u64,
}

impl Default for CacheSettings {
  fn default() -> Self {
    let defaults = CacheConfig::default();
    Self {
      stale_after_secs: defaults.stale_after.as_secs(),
      keep_unused_for_secs: defaults.keep_unused_for.as_secs(),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct SearchConfig {
  pub debounce_ms: u64,
  pub max_length: usize,
}

impl Default for SearchConfig {
  fn default() -> Self {
    Self {
      debounce_ms: 500,
      max_length: DEFAULT_SEARCH_MAX_LENGTH,
    }
  }
}

impl SearchConfig {
  pub fn debounce(&self) -> Duration {
    Duration::from_millis(self.debounce_ms)
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./propdash.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/propdash/config.yaml
  ///
  /// Without any file the built-in defaults are used.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    let config = match path {
      Some(p) => Self::load_from_path(&p)?,
      None => Config::default(),
    };
    config.validate()?;
    Ok(config)
  }

  fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from("propdash.yaml");
    if local.exists() {
      return Some(local);
    }

    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("propdash").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents).map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  pub fn parse(contents: &str) -> Result<Self> {
    let config: Config = serde_yaml::from_str(contents)?;
    Ok(config)
  }

  fn validate(&self) -> Result<()> {
    validate_list_params(&self.list).map_err(|e| eyre!("Invalid list settings: {}", e))?;
    if self.search.max_length == 0 {
      return Err(eyre!("search.max_length must be at least 1"));
    }
    Ok(())
  }

  pub fn cache_config(&self) -> CacheConfig {
    CacheConfig {
      stale_after: Duration::from_secs(self.cache.stale_after_secs),
      keep_unused_for: Duration::from_secs(self.cache.keep_unused_for_secs),
    }
  }

  pub fn api_timeout(&self) -> Duration {
    Duration::from_secs(self.api.timeout_secs)
  }

  pub fn lookup_timeout(&self) -> Duration {
    Duration::from_secs(self.lookup.timeout_secs)
  }

  /// Request context for the API, with the token from PROPDASH_API_TOKEN if set.
  pub fn request_context() -> RequestContext {
    match std::env::var("PROPDASH_API_TOKEN") {
      Ok(token) if !token.trim().is_empty() => RequestContext::with_token(token),
      _ => RequestContext::anonymous(),
    }
  }

  /// Address lookup key: PROPDASH_LOOKUP_KEY, then the config file.
  pub fn lookup_key(&self) -> Option<String> {
    std::env::var("PROPDASH_LOOKUP_KEY")
      .ok()
      .filter(|k| !k.trim().is_empty())
      .or_else(|| self.lookup.api_key.clone())
  }

  /// Directory for log files.
  pub fn data_dir() -> PathBuf {
    dirs::data_local_dir()
      .unwrap_or_else(std::env::temp_dir)
      .join("propdash")
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::properties::SortField;

  #[test]
  fn test_empty_file_uses_defaults() {
    let config = Config::parse("{}").unwrap();
    assert_eq!(config.api.url, DEFAULT_API_URL);
    assert_eq!(config.list, ListParams::default());
    assert_eq!(config.search.max_length, 100);
    assert_eq!(config.cache_config().stale_after, Duration::from_secs(30));
  }

  #[test]
  fn test_full_file() {
    let yaml = r#"
api:
  url: https://props.example.com/api
  timeout_secs: 5
lookup:
  api_key: abc
cache:
  stale_after_secs: 10
search:
  debounce_ms: 250
list:
  limit: 25
  city: London
  sort_by: updated_at
  sort_order: desc
title: Lettings
"#;
    let config = Config::parse(yaml).unwrap();
    assert_eq!(config.api.timeout_secs, 5);
    assert_eq!(config.lookup.url, DEFAULT_LOOKUP_URL);
    assert_eq!(config.cache.keep_unused_for_secs, 60);
    assert_eq!(config.search.debounce(), Duration::from_millis(250));
    assert_eq!(config.list.limit, 25);
    assert_eq!(config.list.sort_by, Some(SortField::UpdatedAt));
    assert!(config.validate().is_ok());
  }

  #[test]
  fn test_unknown_fields_are_rejected() {
    assert!(Config::parse("database:\n  url: x\n").is_err());
    assert!(Config::parse("api:\n  uri: x\n").is_err());
    assert!(Config::parse("list:\n  per_page: 10\n").is_err());
  }

  #[test]
  fn test_invalid_page_size_fails_validation() {
    let config = Config::parse("list:\n  limit: 15\n").unwrap();
    assert!(config.validate().is_err());
  }
}
