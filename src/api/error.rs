use std::collections::BTreeMap;
use std::fmt;

use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;

/// Failures surfaced by the data-fetch client and everything built on it.
///
/// Cloneable so that one in-flight request can be shared by several waiters.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
  /// No response was received
  #[error("Network error: {0}")]
  Network(String),

  /// Non-2xx response
  #[error("{message}")]
  Server {
    status: u16,
    message: String,
    field_errors: BTreeMap<String, Vec<String>>,
  },

  /// Response arrived but its body did not match the expected shape
  #[error("Invalid response: {0}")]
  Decode(String),

  /// Rejected client-side before any request was made
  #[error(transparent)]
  Validation(#[from] ValidationError),
}

/// Error body the server sends alongside a failing status.
#[derive(Debug, Deserialize)]
struct ApiErrorBody {
  message: Option<String>,
  #[serde(default)]
  errors: BTreeMap<String, Vec<String>>,
}

impl ApiError {
  /// Classify a non-2xx response, preferring the server's own message.
  pub fn from_status(status: StatusCode, body: &[u8]) -> Self {
    let parsed = serde_json::from_slice::<ApiErrorBody>(body).ok();
    let (message, field_errors) = match parsed {
      Some(ApiErrorBody {
        message: Some(message),
        errors,
      }) if !message.trim().is_empty() => (message, errors),
      Some(ApiErrorBody { errors, .. }) => (generic_message(status), errors),
      None => (generic_message(status), BTreeMap::new()),
    };

    ApiError::Server {
      status: status.as_u16(),
      message,
      field_errors,
    }
  }

  /// HTTP status for server-signaled failures.
  pub fn status(&self) -> Option<u16> {
    match self {
      ApiError::Server { status, .. } => Some(*status),
      _ => None,
    }
  }

  pub fn is_network(&self) -> bool {
    matches!(self, ApiError::Network(_))
  }
}

impl From<reqwest::Error> for ApiError {
  fn from(err: reqwest::Error) -> Self {
    if err.is_decode() {
      ApiError::Decode(err.to_string())
    } else {
      ApiError::Network(err.to_string())
    }
  }
}

fn generic_message(status: StatusCode) -> String {
  format!("Request failed with status {}", status.as_u16())
}

/// A single failed field check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
  pub field: &'static str,
  pub message: String,
}

/// One or more client-side validation failures.
#[derive(Debug, Clone, Default, PartialEq, Eq, Error)]
pub struct ValidationError {
  errors: Vec<FieldError>,
}

impl ValidationError {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn single(field: &'static str, message: impl Into<String>) -> Self {
    let mut err = Self::new();
    err.push(field, message);
    err
  }

  pub fn push(&mut self, field: &'static str, message: impl Into<String>) {
    self.errors.push(FieldError {
      field,
      message: message.into(),
    });
  }

  pub fn is_empty(&self) -> bool {
    self.errors.is_empty()
  }

  pub fn errors(&self) -> &[FieldError] {
    &self.errors
  }

  /// First message recorded for a field.
  pub fn for_field(&self, field: &str) -> Option<&str> {
    self
      .errors
      .iter()
      .find(|e| e.field == field)
      .map(|e| e.message.as_str())
  }

  pub fn extend(&mut self, other: ValidationError) {
    self.errors.extend(other.errors);
  }

  /// `Ok(value)` when nothing was recorded.
  pub fn into_result<T>(self, value: T) -> Result<T, ValidationError> {
    if self.is_empty() {
      Ok(value)
    } else {
      Err(self)
    }
  }
}

impl fmt::Display for ValidationError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    for (i, err) in self.errors.iter().enumerate() {
      if i > 0 {
        f.write_str("; ")?;
      }
      f.write_str(&err.message)?;
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_from_status_uses_server_message() {
    let body = br#"{"message":"Property not found","success":false}"#;
    let err = ApiError::from_status(StatusCode::NOT_FOUND, body);
    assert_eq!(err.status(), Some(404));
    assert_eq!(err.to_string(), "Property not found");
  }

  #[test]
  fn test_from_status_keeps_field_errors() {
    let body = br#"{"message":"Invalid","errors":{"postcode":["is invalid"]}}"#;
    match ApiError::from_status(StatusCode::UNPROCESSABLE_ENTITY, body) {
      ApiError::Server { field_errors, .. } => {
        assert_eq!(field_errors["postcode"], vec!["is invalid".to_string()]);
      }
      other => panic!("unexpected error: {:?}", other),
    }
  }

  #[test]
  fn test_from_status_generic_message() {
    let err = ApiError::from_status(StatusCode::BAD_GATEWAY, b"<html>bad gateway</html>");
    assert_eq!(err.to_string(), "Request failed with status 502");

    let err = ApiError::from_status(StatusCode::INTERNAL_SERVER_ERROR, br#"{"message":"  "}"#);
    assert_eq!(err.to_string(), "Request failed with status 500");
  }

  #[test]
  fn test_validation_error_display() {
    let mut err = ValidationError::new();
    err.push("address", "Address is required");
    err.push("city", "City is required");
    assert_eq!(err.to_string(), "Address is required; City is required");
    assert_eq!(err.for_field("city"), Some("City is required"));
    assert_eq!(err.for_field("postcode"), None);
  }

  #[test]
  fn test_empty_validation_is_ok() {
    assert!(ValidationError::new().into_result(()).is_ok());
  }
}
