use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::api::QueryParams;

/// Page sizes the list endpoint accepts
pub const PAGE_SIZES: [u32; 6] = [5, 10, 20, 25, 30, 40];
pub const DEFAULT_PAGE: u32 = 1;
pub const DEFAULT_LIMIT: u32 = 10;

/// Prefix of ids assigned to properties created locally and not yet confirmed
pub const PROVISIONAL_PREFIX: &str = "temp-";

/// Property as shown in list views
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Property {
  pub id: String,
  pub name: String,
  pub city: String,
  pub address: String,
  pub postcode: String,
  pub no_of_reports: u32,
  pub is_active: bool,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

impl Property {
  /// Placeholder shown until the server confirms a create. The server assigns
  /// the real id and name.
  pub fn provisional(request: &CreatePropertyRequest, now: DateTime<Utc>) -> Self {
    Self {
      id: format!("{}{}", PROVISIONAL_PREFIX, now.timestamp_millis()),
      name: String::new(),
      city: request.city.clone(),
      address: request.address.clone(),
      postcode: request.postcode.clone(),
      no_of_reports: 0,
      is_active: true,
      created_at: now,
      updated_at: now,
    }
  }

  pub fn is_provisional(&self) -> bool {
    self.id.starts_with(PROVISIONAL_PREFIX)
  }

  /// Bump `updated_at`, never moving it backwards.
  pub fn touch(&mut self, now: DateTime<Utc>) {
    self.updated_at = self.updated_at.max(now);
  }

  /// Name for display; provisional and unnamed properties fall back to the address.
  pub fn display_name(&self) -> &str {
    if self.name.is_empty() {
      &self.address
    } else {
      &self.name
    }
  }
}

/// Property with its reports, as returned by the detail endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyWithReports {
  #[serde(flatten)]
  pub property: Property,
  #[serde(default)]
  pub reports: Vec<Report>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
  pub id: String,
  #[serde(rename = "type")]
  pub report_type: ReportType,
  pub status: ReportStatus,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
  #[serde(default)]
  pub completion_date: Option<String>,
  #[serde(default)]
  pub notes: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReportType {
  #[serde(rename = "checkin")]
  Checkin,
  #[serde(rename = "checkout")]
  Checkout,
  #[serde(rename = "inventory")]
  Inventory,
  #[serde(rename = "mid-tenancy")]
  MidTenancy,
}

impl ReportType {
  pub const ALL: [ReportType; 4] = [
    ReportType::Checkin,
    ReportType::Checkout,
    ReportType::Inventory,
    ReportType::MidTenancy,
  ];

  pub fn as_str(&self) -> &'static str {
    match self {
      ReportType::Checkin => "checkin",
      ReportType::Checkout => "checkout",
      ReportType::Inventory => "inventory",
      ReportType::MidTenancy => "mid-tenancy",
    }
  }

  pub fn label(&self) -> &'static str {
    match self {
      ReportType::Checkin => "Check-in",
      ReportType::Checkout => "Check-out",
      ReportType::Inventory => "Inventory",
      ReportType::MidTenancy => "Mid-tenancy",
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
  InProgress,
  TenantReview,
  Complete,
}

impl ReportStatus {
  pub const ALL: [ReportStatus; 3] = [
    ReportStatus::InProgress,
    ReportStatus::TenantReview,
    ReportStatus::Complete,
  ];

  pub fn as_str(&self) -> &'static str {
    match self {
      ReportStatus::InProgress => "in_progress",
      ReportStatus::TenantReview => "tenant_review",
      ReportStatus::Complete => "complete",
    }
  }

  pub fn label(&self) -> &'static str {
    match self {
      ReportStatus::InProgress => "In progress",
      ReportStatus::TenantReview => "Tenant review",
      ReportStatus::Complete => "Complete",
    }
  }
}

/// Body of `POST /properties`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatePropertyRequest {
  pub address: String,
  pub city: String,
  pub postcode: String,
}

/// Partial update for `PUT /properties/{id}`; absent fields are left alone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UpdatePropertyRequest {
  #[serde(skip)]
  pub id: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub address: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub city: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub postcode: Option<String>,
}

impl UpdatePropertyRequest {
  pub fn is_empty(&self) -> bool {
    self.address.is_none() && self.city.is_none() && self.postcode.is_none()
  }

  /// Merge the provided fields into `property`.
  pub fn apply_to(&self, property: &mut Property) {
    if let Some(address) = &self.address {
      property.address = address.clone();
    }
    if let Some(city) = &self.city {
      property.city = city.clone();
    }
    if let Some(postcode) = &self.postcode {
      property.postcode = postcode.clone();
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
  Address,
  City,
  Postcode,
  NoOfReports,
  CreatedAt,
  UpdatedAt,
}

impl SortField {
  pub const ALL: [SortField; 6] = [
    SortField::Address,
    SortField::City,
    SortField::Postcode,
    SortField::NoOfReports,
    SortField::CreatedAt,
    SortField::UpdatedAt,
  ];

  pub fn as_str(&self) -> &'static str {
    match self {
      SortField::Address => "address",
      SortField::City => "city",
      SortField::Postcode => "postcode",
      SortField::NoOfReports => "no_of_reports",
      SortField::CreatedAt => "created_at",
      SortField::UpdatedAt => "updated_at",
    }
  }

  pub fn label(&self) -> &'static str {
    match self {
      SortField::Address => "Address",
      SortField::City => "City",
      SortField::Postcode => "Postcode",
      SortField::NoOfReports => "Reports",
      SortField::CreatedAt => "Created",
      SortField::UpdatedAt => "Last activity",
    }
  }

  /// Next field in display order, wrapping around.
  pub fn next(&self) -> Self {
    let index = Self::ALL.iter().position(|f| f == self).unwrap_or(0);
    Self::ALL[(index + 1) % Self::ALL.len()]
  }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
  #[default]
  Asc,
  Desc,
}

impl SortOrder {
  pub fn as_str(&self) -> &'static str {
    match self {
      SortOrder::Asc => "asc",
      SortOrder::Desc => "desc",
    }
  }

  pub fn toggle(&self) -> Self {
    match self {
      SortOrder::Asc => SortOrder::Desc,
      SortOrder::Desc => SortOrder::Asc,
    }
  }
}

impl fmt::Display for SortOrder {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.as_str())
  }
}

/// Pagination, filters and sort for the property list
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ListParams {
  pub page: u32,
  pub limit: u32,
  pub city: Option<String>,
  pub postcode: Option<String>,
  /// Matched against the address
  pub search: Option<String>,
  pub is_active: Option<bool>,
  pub sort_by: Option<SortField>,
  pub sort_order: Option<SortOrder>,
}

impl Default for ListParams {
  fn default() -> Self {
    Self {
      page: DEFAULT_PAGE,
      limit: DEFAULT_LIMIT,
      city: None,
      postcode: None,
      search: None,
      is_active: None,
      sort_by: None,
      sort_order: None,
    }
  }
}

impl ListParams {
  pub fn to_query(&self) -> QueryParams {
    QueryParams::new()
      .set("page", self.page)
      .set("limit", self.limit)
      .opt("city", self.city.as_deref())
      .opt("postcode", self.postcode.as_deref())
      .opt("search", self.search.as_deref())
      .opt("is_active", self.is_active)
      .opt("sort_by", self.sort_by.map(|f| f.as_str()))
      .opt("sort_order", self.sort_order.map(|o| o.as_str()))
  }

  /// Whether a newly created property would show up on this page.
  ///
  /// Only first pages qualify. Filters compare case-insensitively; search is a
  /// substring match on the address.
  pub fn admits(&self, property: &Property) -> bool {
    if self.page != DEFAULT_PAGE {
      return false;
    }
    if self.is_active.is_some_and(|active| active != property.is_active) {
      return false;
    }
    if let Some(city) = non_empty(&self.city) {
      if !city.eq_ignore_ascii_case(property.city.trim()) {
        return false;
      }
    }
    if let Some(postcode) = non_empty(&self.postcode) {
      if compact(postcode) != compact(&property.postcode) {
        return false;
      }
    }
    if let Some(search) = non_empty(&self.search) {
      let address = property.address.to_lowercase();
      if !address.contains(&search.to_lowercase()) {
        return false;
      }
    }
    true
  }

  /// Same filters on another page.
  pub fn with_page(&self, page: u32) -> Self {
    Self {
      page: page.max(DEFAULT_PAGE),
      ..self.clone()
    }
  }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
  value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn compact(postcode: &str) -> String {
  postcode
    .chars()
    .filter(|c| !c.is_whitespace())
    .map(|c| c.to_ascii_uppercase())
    .collect()
}

/// Report filters for the detail endpoint
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ReportFilters {
  pub report_type: Vec<ReportType>,
  pub report_status: Vec<ReportStatus>,
  pub start_date: Option<NaiveDate>,
  pub end_date: Option<NaiveDate>,
}

impl ReportFilters {
  pub fn to_query(&self) -> QueryParams {
    let types: Vec<&str> = self.report_type.iter().map(ReportType::as_str).collect();
    let statuses: Vec<&str> = self.report_status.iter().map(ReportStatus::as_str).collect();
    QueryParams::new()
      .list("report_type", &types)
      .list("report_status", &statuses)
      .opt("start_date", self.start_date.map(|d| d.format("%Y-%m-%d")))
      .opt("end_date", self.end_date.map(|d| d.format("%Y-%m-%d")))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::TimeZone;

  fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
  }

  fn request() -> CreatePropertyRequest {
    CreatePropertyRequest {
      address: "1 Main St".into(),
      city: "London".into(),
      postcode: "NW3 4TX".into(),
    }
  }

  #[test]
  fn test_provisional_property() {
    let property = Property::provisional(&request(), at(0));
    assert!(property.is_provisional());
    assert!(property.id.starts_with("temp-"));
    assert!(property.is_active);
    assert_eq!(property.no_of_reports, 0);
    assert_eq!(property.name, "");
    assert_eq!(property.display_name(), "1 Main St");
  }

  #[test]
  fn test_touch_is_monotonic() {
    let mut property = Property::provisional(&request(), at(100));
    property.touch(at(50));
    assert_eq!(property.updated_at, at(100));
    property.touch(at(200));
    assert_eq!(property.updated_at, at(200));
  }

  #[test]
  fn test_list_query_defaults() {
    let query = ListParams::default().to_query();
    assert_eq!(query.canonical(), "page=1&limit=10");
  }

  #[test]
  fn test_list_query_includes_filters_and_sort() {
    let params = ListParams {
      city: Some("London".into()),
      search: Some(String::new()),
      is_active: Some(false),
      sort_by: Some(SortField::NoOfReports),
      sort_order: Some(SortOrder::Desc),
      ..Default::default()
    };
    assert_eq!(
      params.to_query().canonical(),
      "page=1&limit=10&city=London&is_active=false&sort_by=no_of_reports&sort_order=desc"
    );
  }

  #[test]
  fn test_list_params_reject_unknown_fields() {
    let err = serde_yaml::from_str::<ListParams>("page: 2\nshoe_size: 9\n");
    assert!(err.is_err());

    let params: ListParams = serde_yaml::from_str("limit: 20\nsort_by: city\n").unwrap();
    assert_eq!(params.page, 1);
    assert_eq!(params.limit, 20);
    assert_eq!(params.sort_by, Some(SortField::City));
  }

  #[test]
  fn test_admits_checks_page_and_filters() {
    let property = Property::provisional(&request(), at(0));
    assert!(ListParams::default().admits(&property));
    assert!(!ListParams::default().with_page(2).admits(&property));

    let london = ListParams {
      city: Some("london".into()),
      postcode: Some("nw34tx".into()),
      search: Some("main".into()),
      ..Default::default()
    };
    assert!(london.admits(&property));

    let archived = ListParams {
      is_active: Some(false),
      ..Default::default()
    };
    assert!(!archived.admits(&property));

    let leeds = ListParams {
      city: Some("Leeds".into()),
      ..Default::default()
    };
    assert!(!leeds.admits(&property));
  }

  #[test]
  fn test_report_filters_join_lists() {
    let filters = ReportFilters {
      report_type: vec![ReportType::Checkin, ReportType::MidTenancy],
      report_status: vec![ReportStatus::Complete],
      start_date: NaiveDate::from_ymd_opt(2024, 1, 1),
      end_date: None,
    };
    assert_eq!(
      filters.to_query().canonical(),
      "report_type=checkin,mid-tenancy&report_status=complete&start_date=2024-01-01"
    );
  }

  #[test]
  fn test_update_request_serializes_only_present_fields() {
    let update = UpdatePropertyRequest {
      id: "p-1".into(),
      city: Some("Leeds".into()),
      ..Default::default()
    };
    assert_eq!(
      serde_json::to_value(&update).unwrap(),
      serde_json::json!({"city": "Leeds"})
    );
  }

  #[test]
  fn test_detail_payload_flattens_property() {
    let json = r#"{
      "id": "p-1", "name": "Flat 1", "city": "London", "address": "1 Main St",
      "postcode": "NW3 4TX", "no_of_reports": 1, "is_active": true,
      "created_at": "2024-01-01T10:00:00Z", "updated_at": "2024-01-02T10:00:00Z",
      "reports": [{"id": "r-1", "type": "mid-tenancy", "status": "tenant_review",
        "created_at": "2024-01-01T10:00:00Z", "updated_at": "2024-01-01T10:00:00Z"}]
    }"#;
    let detail: PropertyWithReports = serde_json::from_str(json).unwrap();
    assert_eq!(detail.property.id, "p-1");
    assert_eq!(detail.reports[0].report_type, ReportType::MidTenancy);
    assert_eq!(detail.reports[0].status, ReportStatus::TenantReview);
  }

  #[test]
  fn test_sort_cycles() {
    assert_eq!(SortField::UpdatedAt.next(), SortField::Address);
    assert_eq!(SortOrder::Asc.toggle(), SortOrder::Desc);
  }
}
