//! Cache keys for the property endpoints.

use std::time::Duration;

use crate::api::Paginated;
use crate::cache::{tags_for_list, QueryKey, Tag};

use super::types::{ListParams, Property, PropertyWithReports, ReportFilters};

/// List pages stay around longer than detail views
const LIST_KEEP_UNUSED_FOR: Duration = Duration::from_secs(300);

/// `GET /properties` with one parameter set
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PropertyListKey {
  pub params: ListParams,
}

impl PropertyListKey {
  pub fn new(params: ListParams) -> Self {
    Self { params }
  }
}

impl QueryKey for PropertyListKey {
  type Value = Paginated<Property>;

  fn operation(&self) -> &'static str {
    "getPropertiesList"
  }

  fn params(&self) -> String {
    self.params.to_query().canonical()
  }

  fn provides_tags(&self, value: Option<&Paginated<Property>>) -> Vec<Tag> {
    tags_for_list(
      value.map(|page| page.data.iter().map(|p| p.id.as_str())),
      Tag::property_list(),
      Tag::property,
    )
  }

  fn keep_unused_for(&self) -> Option<Duration> {
    Some(LIST_KEEP_UNUSED_FOR)
  }
}

/// `GET /properties/{id}` with report filters
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PropertyDetailKey {
  pub id: String,
  pub filters: ReportFilters,
}

impl PropertyDetailKey {
  pub fn new(id: impl Into<String>) -> Self {
    Self {
      id: id.into(),
      filters: ReportFilters::default(),
    }
  }

  pub fn with_filters(id: impl Into<String>, filters: ReportFilters) -> Self {
    Self {
      id: id.into(),
      filters,
    }
  }
}

impl QueryKey for PropertyDetailKey {
  type Value = PropertyWithReports;

  fn operation(&self) -> &'static str {
    "getProperty"
  }

  fn params(&self) -> String {
    let filters = self.filters.to_query();
    if filters.is_empty() {
      format!("id={}", self.id)
    } else {
      format!("id={}&{}", self.id, filters.canonical())
    }
  }

  fn provides_tags(&self, _value: Option<&PropertyWithReports>) -> Vec<Tag> {
    vec![Tag::property(&self.id)]
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::api::Pagination;
  use crate::cache::TagKind;
  use chrono::Utc;

  fn property(id: &str) -> Property {
    Property {
      id: id.into(),
      name: format!("Property {}", id),
      city: "London".into(),
      address: "1 Main St".into(),
      postcode: "NW3 4TX".into(),
      no_of_reports: 0,
      is_active: true,
      created_at: Utc::now(),
      updated_at: Utc::now(),
    }
  }

  #[test]
  fn test_list_tags_cover_every_item() {
    let page = Paginated {
      data: vec![property("a"), property("b")],
      pagination: Pagination {
        page: 1,
        limit: 10,
        total: 2,
        total_pages: 1,
      },
    };
    let tags = PropertyListKey::new(ListParams::default()).provides_tags(Some(&page));
    assert_eq!(
      tags,
      vec![Tag::property_list(), Tag::property("a"), Tag::property("b")]
    );
  }

  #[test]
  fn test_failed_list_keeps_list_tag() {
    let tags = PropertyListKey::new(ListParams::default()).provides_tags(None);
    assert_eq!(tags.len(), 1);
    assert_eq!(tags[0].kind, TagKind::PropertyList);
  }

  #[test]
  fn test_detail_tag_ignores_result() {
    let key = PropertyDetailKey::new("p-9");
    assert_eq!(key.provides_tags(None), vec![Tag::property("p-9")]);
  }

  #[test]
  fn test_keys_with_same_params_share_hash() {
    let a = PropertyListKey::new(ListParams::default());
    let b = PropertyListKey::new(ListParams {
      search: Some(String::new()),
      ..Default::default()
    });
    assert_eq!(a.cache_hash(), b.cache_hash());

    let c = PropertyListKey::new(ListParams::default().with_page(2));
    assert_ne!(a.cache_hash(), c.cache_hash());
    assert_ne!(
      PropertyDetailKey::new("a").cache_hash(),
      PropertyDetailKey::new("b").cache_hash()
    );
  }
}
