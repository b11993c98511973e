//! Postcode to address lookup against an external service.

use color_eyre::{eyre::eyre, Result};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

pub const NO_ADDRESSES_MESSAGE: &str = "No addresses found for this postal code";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LookupError {
  #[error("Please enter a postal code")]
  EmptyPostcode,
  /// Message reported by the lookup service
  #[error("{0}")]
  Service(String),
  #[error("Failed to parse API response")]
  Parse,
  #[error("{0}")]
  Network(String),
}

/// A successful lookup; "no matches" is a valid answer, not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupOutcome {
  Found(Vec<String>),
  NoneFound,
}

#[derive(Debug, Default, Deserialize)]
struct FindResponse {
  #[serde(default)]
  addresses: Vec<String>,
  #[serde(rename = "Message")]
  message_upper: Option<String>,
  message: Option<String>,
  error: Option<String>,
}

impl FindResponse {
  fn service_message(self) -> Option<String> {
    self
      .message_upper
      .or(self.message)
      .or(self.error)
      .filter(|m| !m.trim().is_empty())
  }
}

#[derive(Clone)]
pub struct AddressLookup {
  client: Client,
  base: Url,
  api_key: String,
}

impl AddressLookup {
  pub fn new(base_url: &str, api_key: impl Into<String>, timeout: Duration) -> Result<Self> {
    let base =
      Url::parse(base_url).map_err(|e| eyre!("Invalid lookup URL {}: {}", base_url, e))?;
    if base.cannot_be_a_base() {
      return Err(eyre!("Invalid lookup URL {}: not a base URL", base_url));
    }
    let client = Client::builder()
      .timeout(timeout)
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self {
      client,
      base,
      api_key: api_key.into(),
    })
  }

  /// Look up candidate addresses for a postcode.
  pub async fn find(&self, postcode: &str) -> Result<LookupOutcome, LookupError> {
    let postcode = postcode.trim().to_uppercase();
    if postcode.is_empty() {
      return Err(LookupError::EmptyPostcode);
    }

    let mut url = self.base.clone();
    if let Ok(mut path) = url.path_segments_mut() {
      path.pop_if_empty().extend(["find", postcode.as_str()]);
    }
    url.query_pairs_mut().append_pair("api-key", &self.api_key);

    debug!(postcode = %postcode, "Looking up addresses");
    let response = self.client.get(url).send().await.map_err(|e| {
      warn!(postcode = %postcode, error = %e, "Address lookup failed");
      LookupError::Network(e.to_string())
    })?;

    let status = response.status();
    let bytes = response
      .bytes()
      .await
      .map_err(|e| LookupError::Network(e.to_string()))?;
    let body: FindResponse = serde_json::from_slice(&bytes).map_err(|_| LookupError::Parse)?;

    if !status.is_success() {
      let message = body
        .service_message()
        .unwrap_or_else(|| "Failed to fetch addresses".to_string());
      warn!(postcode = %postcode, status = status.as_u16(), message = %message, "Lookup service error");
      return Err(LookupError::Service(message));
    }

    if body.addresses.is_empty() {
      return Ok(LookupOutcome::NoneFound);
    }
    Ok(LookupOutcome::Found(
      body.addresses.iter().map(|a| normalize_address(a)).collect(),
    ))
  }
}

/// Re-join comma separated parts with a single ", ".
pub fn normalize_address(address: &str) -> String {
  address
    .split(',')
    .map(str::trim)
    .collect::<Vec<_>>()
    .join(", ")
}

/// Split a looked-up address into (street address, city).
///
/// Blank parts are dropped and the last remaining part is taken as the city.
pub fn split_address(address: &str) -> (String, String) {
  let parts: Vec<&str> = address
    .split(',')
    .map(str::trim)
    .filter(|p| !p.is_empty())
    .collect();

  match parts.split_last() {
    Some((city, rest)) if !rest.is_empty() => (rest.join(", "), city.to_string()),
    Some((only, _)) => (only.to_string(), String::new()),
    None => (String::new(), String::new()),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use httpmock::MockServer;
  use serde_json::json;

  fn lookup(server: &MockServer) -> AddressLookup {
    AddressLookup::new(&server.base_url(), "key-1", Duration::from_secs(5)).unwrap()
  }

  #[test]
  fn test_split_address() {
    assert_eq!(
      split_address("10 Downing St, , Westminster, London"),
      ("10 Downing St, Westminster".to_string(), "London".to_string())
    );
    assert_eq!(
      split_address("Somewhere"),
      ("Somewhere".to_string(), String::new())
    );
    assert_eq!(split_address(" , "), (String::new(), String::new()));
  }

  #[test]
  fn test_normalize_address() {
    assert_eq!(normalize_address("1 Main St ,Flat 2,  London"), "1 Main St, Flat 2, London");
  }

  #[tokio::test]
  async fn test_empty_postcode_fails_without_request() {
    let server = MockServer::start();
    let err = lookup(&server).find("   ").await.unwrap_err();
    assert_eq!(err, LookupError::EmptyPostcode);
    assert_eq!(err.to_string(), "Please enter a postal code");
  }

  #[tokio::test]
  async fn test_found_addresses_are_normalized() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
      when
        .method("GET")
        .path("/find/NW34TX")
        .query_param("api-key", "key-1");
      then.status(200).json_body(json!({
        "postcode": "NW34TX",
        "addresses": ["1 Main St,,,London", "2 Main St, , , London"]
      }));
    });

    let outcome = lookup(&server).find("nw34tx").await.unwrap();
    mock.assert();
    assert_eq!(
      outcome,
      LookupOutcome::Found(vec![
        "1 Main St, , , London".to_string(),
        "2 Main St, , , London".to_string()
      ])
    );
  }

  #[tokio::test]
  async fn test_empty_result_is_not_an_error() {
    let server = MockServer::start();
    server.mock(|when, then| {
      when.method("GET").path("/find/ZZ11ZZ");
      then.status(200).json_body(json!({"addresses": []}));
    });

    let outcome = lookup(&server).find("ZZ11ZZ").await.unwrap();
    assert_eq!(outcome, LookupOutcome::NoneFound);
  }

  #[tokio::test]
  async fn test_service_message_is_surfaced() {
    let server = MockServer::start();
    server.mock(|when, then| {
      when.method("GET").path("/find/XX11XX");
      then
        .status(401)
        .json_body(json!({"Message": "Api key is not valid."}));
    });

    let err = lookup(&server).find("XX11XX").await.unwrap_err();
    assert_eq!(err, LookupError::Service("Api key is not valid.".into()));
  }

  #[tokio::test]
  async fn test_unparsable_body() {
    let server = MockServer::start();
    server.mock(|when, then| {
      when.method("GET").path("/find/NW34TX");
      then.status(500).body("<html>oops</html>");
    });

    let err = lookup(&server).find("NW34TX").await.unwrap_err();
    assert_eq!(err.to_string(), "Failed to parse API response");
  }
}
