//! HTTP access to the property API.

mod client;
mod error;
mod types;

pub use client::{ApiClient, QueryParams, RequestContext};
pub use error::{ApiError, FieldError, ValidationError};
pub use types::{ApiResponse, ListEnvelope, Paginated, Pagination};
