//! Wire envelopes shared by every endpoint.

use serde::{Deserialize, Serialize};

/// Single-resource envelope: `{data, message, success}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse<T> {
  pub data: T,
  #[serde(default)]
  pub message: String,
  #[serde(default)]
  pub success: bool,
}

impl<T> ApiResponse<T> {
  pub fn ok(data: T) -> Self {
    Self {
      data,
      message: String::new(),
      success: true,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
  pub page: u32,
  pub limit: u32,
  pub total: u64,
  pub total_pages: u32,
}

/// One page of a list resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Paginated<T> {
  pub data: Vec<T>,
  pub pagination: Pagination,
}

/// List responses arrive either bare or inside the single-resource envelope.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ListEnvelope<T> {
  Wrapped(ApiResponse<Paginated<T>>),
  Bare(Paginated<T>),
}

impl<T> ListEnvelope<T> {
  pub fn into_page(self) -> Paginated<T> {
    match self {
      ListEnvelope::Wrapped(response) => response.data,
      ListEnvelope::Bare(page) => page,
    }
  }
}
