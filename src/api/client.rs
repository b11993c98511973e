use color_eyre::{eyre::eyre, Result};
use reqwest::{Client, Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use super::error::ApiError;

/// Per-request state supplied by the application: currently only the
/// credential. Built once at startup and handed to whoever issues requests.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
  pub token: Option<String>,
}

impl RequestContext {
  pub fn anonymous() -> Self {
    Self::default()
  }

  pub fn with_token(token: impl Into<String>) -> Self {
    Self {
      token: Some(token.into()),
    }
  }

  fn bearer(&self) -> Option<&str> {
    self
      .token
      .as_deref()
      .map(str::trim)
      .filter(|t| !t.is_empty())
  }
}

/// Query string builder that never sends empty placeholders.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams {
  pairs: Vec<(&'static str, String)>,
}

impl QueryParams {
  pub fn new() -> Self {
    Self::default()
  }

  /// Add a value; empty strings are skipped.
  pub fn set(mut self, name: &'static str, value: impl ToString) -> Self {
    let value = value.to_string();
    if !value.is_empty() {
      self.pairs.push((name, value));
    }
    self
  }

  pub fn opt<T: ToString>(self, name: &'static str, value: Option<T>) -> Self {
    match value {
      Some(value) => self.set(name, value),
      None => self,
    }
  }

  /// Add a list as one comma-joined value; empty lists are skipped.
  pub fn list<T: AsRef<str>>(self, name: &'static str, values: &[T]) -> Self {
    let joined = values
      .iter()
      .map(AsRef::as_ref)
      .filter(|v| !v.is_empty())
      .collect::<Vec<_>>()
      .join(",");
    self.set(name, joined)
  }

  pub fn pairs(&self) -> &[(&'static str, String)] {
    &self.pairs
  }

  pub fn get(&self, name: &str) -> Option<&str> {
    self
      .pairs
      .iter()
      .find(|(k, _)| *k == name)
      .map(|(_, v)| v.as_str())
  }

  pub fn is_empty(&self) -> bool {
    self.pairs.is_empty()
  }

  /// Stable text form, used for cache keys.
  pub fn canonical(&self) -> String {
    self
      .pairs
      .iter()
      .map(|(k, v)| format!("{}={}", k, v))
      .collect::<Vec<_>>()
      .join("&")
  }
}

/// Thin JSON client for the property API.
#[derive(Clone)]
pub struct ApiClient {
  client: Client,
  base: Url,
}

impl ApiClient {
  pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
    let base = Url::parse(base_url).map_err(|e| eyre!("Invalid API URL {}: {}", base_url, e))?;
    if base.cannot_be_a_base() {
      return Err(eyre!("Invalid API URL {}: not a base URL", base_url));
    }

    let client = Client::builder()
      .user_agent(concat!("propdash/", env!("CARGO_PKG_VERSION")))
      .timeout(timeout)
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self { client, base })
  }

  pub fn base_url(&self) -> &Url {
    &self.base
  }

  /// Absolute URL for the given path segments (each one percent-encoded).
  pub fn endpoint(&self, segments: &[&str], query: &QueryParams) -> Url {
    let mut url = self.base.clone();
    if let Ok(mut path) = url.path_segments_mut() {
      path.pop_if_empty().extend(segments);
    }
    if !query.is_empty() {
      url
        .query_pairs_mut()
        .extend_pairs(query.pairs().iter().map(|(k, v)| (*k, v.as_str())));
    }
    url
  }

  pub async fn get<T: DeserializeOwned>(
    &self,
    ctx: &RequestContext,
    segments: &[&str],
    query: &QueryParams,
  ) -> Result<T, ApiError> {
    let url = self.endpoint(segments, query);
    self.execute(ctx, self.client.get(url)).await
  }

  /// Send a request with a JSON body.
  pub async fn send<B: Serialize + ?Sized, T: DeserializeOwned>(
    &self,
    ctx: &RequestContext,
    method: Method,
    segments: &[&str],
    body: &B,
  ) -> Result<T, ApiError> {
    let url = self.endpoint(segments, &QueryParams::new());
    self
      .execute(ctx, self.client.request(method, url).json(body))
      .await
  }

  /// Send a request without a body.
  pub async fn send_empty<T: DeserializeOwned>(
    &self,
    ctx: &RequestContext,
    method: Method,
    segments: &[&str],
  ) -> Result<T, ApiError> {
    let url = self.endpoint(segments, &QueryParams::new());
    self.execute(ctx, self.client.request(method, url)).await
  }

  async fn execute<T: DeserializeOwned>(
    &self,
    ctx: &RequestContext,
    mut request: RequestBuilder,
  ) -> Result<T, ApiError> {
    if let Some(token) = ctx.bearer() {
      request = request.bearer_auth(token);
    }

    let request = request.build().map_err(ApiError::from)?;
    let method = request.method().clone();
    let url = request.url().clone();
    debug!(%method, url = %url, "Sending request");

    let response = self.client.execute(request).await.map_err(|e| {
      warn!(%method, url = %url, error = %e, "Request failed");
      ApiError::Network(e.to_string())
    })?;

    let status = response.status();
    let bytes = response.bytes().await.map_err(ApiError::from)?;
    debug!(%method, url = %url, status = status.as_u16(), "Received response");

    if !status.is_success() {
      let err = ApiError::from_status(status, &bytes);
      warn!(%method, url = %url, status = status.as_u16(), error = %err, "Server rejected request");
      return Err(err);
    }

    // Bodiless success (204) decodes as JSON null
    let body: &[u8] = if bytes.is_empty() { b"null" } else { &bytes };
    serde_json::from_slice(body).map_err(|e| ApiError::Decode(e.to_string()))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use httpmock::MockServer;
  use serde_json::{json, Value};

  fn client(server: &MockServer) -> ApiClient {
    ApiClient::new(&server.url("/api"), Duration::from_secs(5)).unwrap()
  }

  #[test]
  fn test_query_params_skip_empty_values() {
    let params = QueryParams::new()
      .set("page", 1)
      .opt("city", None::<String>)
      .opt("search", Some(""))
      .set("postcode", "NW3 4TX")
      .list("report_type", &["checkin", "checkout"])
      .list::<&str>("report_status", &[]);

    assert_eq!(
      params.canonical(),
      "page=1&postcode=NW3 4TX&report_type=checkin,checkout"
    );
    assert_eq!(params.get("city"), None);
  }

  #[test]
  fn test_endpoint_keeps_base_path_and_encodes_segments() {
    let client = ApiClient::new("http://localhost:3001/api", Duration::from_secs(1)).unwrap();
    let url = client.endpoint(&["properties", "a b"], &QueryParams::new().set("page", 2));
    assert_eq!(url.as_str(), "http://localhost:3001/api/properties/a%20b?page=2");

    let trailing = ApiClient::new("http://localhost:3001/api/", Duration::from_secs(1)).unwrap();
    let url = trailing.endpoint(&["properties"], &QueryParams::new());
    assert_eq!(url.as_str(), "http://localhost:3001/api/properties");
  }

  #[test]
  fn test_rejects_non_base_url() {
    assert!(ApiClient::new("mailto:someone@example.com", Duration::from_secs(1)).is_err());
    assert!(ApiClient::new("not a url", Duration::from_secs(1)).is_err());
  }

  #[tokio::test]
  async fn test_get_sends_bearer_and_query() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
      when
        .method("GET")
        .path("/api/properties")
        .query_param("page", "1")
        .query_param("city", "London")
        .header("authorization", "Bearer secret");
      then
        .status(200)
        .header("content-type", "application/json")
        .json_body(json!({"ok": true}));
    });

    let params = QueryParams::new().set("page", 1).set("city", "London");
    let body: Value = client(&server)
      .get(&RequestContext::with_token("secret"), &["properties"], &params)
      .await
      .unwrap();

    mock.assert();
    assert_eq!(body, json!({"ok": true}));
  }

  #[tokio::test]
  async fn test_no_token_means_no_authorization_header() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
      when
        .method("GET")
        .path("/api/properties")
        .header_missing("authorization");
      then.status(200).json_body(json!([]));
    });

    let _: Value = client(&server)
      .get(&RequestContext::anonymous(), &["properties"], &QueryParams::new())
      .await
      .unwrap();
    mock.assert();
  }

  #[tokio::test]
  async fn test_send_posts_json_body() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
      when
        .method("POST")
        .path("/api/properties")
        .header("content-type", "application/json")
        .json_body(json!({"address": "1 Main St"}));
      then.status(201).json_body(json!({"created": true}));
    });

    let body: Value = client(&server)
      .send(
        &RequestContext::anonymous(),
        Method::POST,
        &["properties"],
        &json!({"address": "1 Main St"}),
      )
      .await
      .unwrap();
    mock.assert();
    assert_eq!(body["created"], true);
  }

  #[tokio::test]
  async fn test_server_message_is_surfaced() {
    let server = MockServer::start();
    server.mock(|when, then| {
      when.method("PUT").path("/api/properties/p-1/archive");
      then
        .status(422)
        .json_body(json!({"message": "Property already archived", "errors": {"id": ["archived"]}}));
    });

    let err = client(&server)
      .send_empty::<Value>(
        &RequestContext::anonymous(),
        Method::PUT,
        &["properties", "p-1", "archive"],
      )
      .await
      .unwrap_err();

    assert_eq!(err.status(), Some(422));
    assert_eq!(err.to_string(), "Property already archived");
  }

  #[tokio::test]
  async fn test_generic_message_without_structured_body() {
    let server = MockServer::start();
    server.mock(|when, then| {
      when.method("GET").path("/api/properties");
      then.status(503).body("upstream down");
    });

    let err = client(&server)
      .get::<Value>(&RequestContext::anonymous(), &["properties"], &QueryParams::new())
      .await
      .unwrap_err();
    assert_eq!(err.to_string(), "Request failed with status 503");
  }

  #[tokio::test]
  async fn test_unexpected_body_is_decode_error() {
    let server = MockServer::start();
    server.mock(|when, then| {
      when.method("GET").path("/api/properties");
      then.status(200).body("<html>");
    });

    let err = client(&server)
      .get::<Value>(&RequestContext::anonymous(), &["properties"], &QueryParams::new())
      .await
      .unwrap_err();
    assert!(matches!(err, ApiError::Decode(_)));
  }

  #[tokio::test]
  async fn test_connection_refused_is_network_error() {
    let client = ApiClient::new("http://127.0.0.1:1/api", Duration::from_secs(2)).unwrap();
    let err = client
      .get::<Value>(&RequestContext::anonymous(), &["properties"], &QueryParams::new())
      .await
      .unwrap_err();
    assert!(err.is_network());
  }
}
