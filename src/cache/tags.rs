//! Invalidation tags attached to cache entries.

use std::fmt;

/// Id shared by every cached property list.
pub const LIST_ID: &str = "LIST";

/// Kind of entity a tag refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TagKind {
  /// A single property
  Property,
  /// Any list of properties
  PropertyList,
}

impl TagKind {
  pub fn as_str(&self) -> &'static str {
    match self {
      TagKind::Property => "Property",
      TagKind::PropertyList => "PropertyList",
    }
  }
}

/// A (kind, id) pair. Invalidating a tag marks every entry carrying it as stale.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Tag {
  pub kind: TagKind,
  pub id: String,
}

impl Tag {
  pub fn new(kind: TagKind, id: impl Into<String>) -> Self {
    Self {
      kind,
      id: id.into(),
    }
  }

  /// Tag for one property's cached data.
  pub fn property(id: &str) -> Self {
    Self::new(TagKind::Property, id)
  }

  /// The single tag shared by all property lists.
  pub fn property_list() -> Self {
    Self::new(TagKind::PropertyList, LIST_ID)
  }
}

impl fmt::Display for Tag {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}:{}", self.kind.as_str(), self.id)
  }
}

/// Tags for a list result: the list tag followed by one tag per item.
///
/// A failed fetch (`items == None`) still provides the list tag so that a later
/// list invalidation retries it.
pub fn tags_for_list<'a, I>(
  items: Option<I>,
  list_tag: Tag,
  item_tag: impl Fn(&str) -> Tag,
) -> Vec<Tag>
where
  I: IntoIterator<Item = &'a str>,
{
  let mut tags = vec![list_tag];
  if let Some(items) = items {
    tags.extend(items.into_iter().map(item_tag));
  }
  tags
}
