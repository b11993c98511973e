//! Property domain: wire types, validation, cache keys and endpoints.

mod api;
mod keys;
mod types;
pub mod validate;

pub use api::{PendingMutation, PropertyApi};
pub use keys::{PropertyDetailKey, PropertyListKey};
pub use types::{
  CreatePropertyRequest, ListParams, Property, PropertyWithReports, Report, ReportFilters,
  ReportStatus, ReportType, SortField, SortOrder, UpdatePropertyRequest, DEFAULT_LIMIT,
  DEFAULT_PAGE, PAGE_SIZES,
};
