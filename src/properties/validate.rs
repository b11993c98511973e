//! Client-side checks run before anything reaches the network.

use crate::api::ValidationError;

use super::types::{
  CreatePropertyRequest, ListParams, ReportFilters, UpdatePropertyRequest, PAGE_SIZES,
};

pub const DEFAULT_SEARCH_MAX_LENGTH: usize = 100;

const POSTCODE_MESSAGE: &str = "Please enter a valid UK postal code";

/// UK postcode check, case-insensitive:
/// one or two letters, one or two digits, an optional letter, an optional
/// space, then a digit and two letters.
pub fn is_uk_postcode(value: &str) -> bool {
  let chars: Vec<char> = value.chars().map(|c| c.to_ascii_uppercase()).collect();
  if chars.len() < 5 {
    return false;
  }

  let (outward, inward) = chars.split_at(chars.len() - 3);
  let inward_ok = inward[0].is_ascii_digit()
    && inward[1].is_ascii_uppercase()
    && inward[2].is_ascii_uppercase();
  if !inward_ok {
    return false;
  }

  let outward = match outward.split_last() {
    Some((last, rest)) if last.is_whitespace() => rest,
    _ => outward,
  };

  let letters = outward
    .iter()
    .take_while(|c| c.is_ascii_uppercase())
    .count();
  if !(1..=2).contains(&letters) {
    return false;
  }
  let rest = &outward[letters..];
  let digits = rest.iter().take_while(|c| c.is_ascii_digit()).count();
  if !(1..=2).contains(&digits) {
    return false;
  }
  match &rest[digits..] {
    [] => true,
    [letter] => letter.is_ascii_uppercase(),
    _ => false,
  }
}

fn required(
  errors: &mut ValidationError,
  field: &'static str,
  value: &str,
  message: &str,
) -> String {
  let trimmed = value.trim();
  if trimmed.is_empty() {
    errors.push(field, message);
  }
  trimmed.to_string()
}

/// Validate a create request, returning it with whitespace trimmed.
pub fn validate_create(
  request: &CreatePropertyRequest,
) -> Result<CreatePropertyRequest, ValidationError> {
  let mut errors = ValidationError::new();
  let address = required(&mut errors, "address", &request.address, "Address is required");
  let city = required(&mut errors, "city", &request.city, "City is required");
  let postcode = required(
    &mut errors,
    "postcode",
    &request.postcode,
    "Postal code is required",
  );
  if !postcode.is_empty() && !is_uk_postcode(&postcode) {
    errors.push("postcode", POSTCODE_MESSAGE);
  }

  errors.into_result(CreatePropertyRequest {
    address,
    city,
    postcode,
  })
}

/// Validate a partial update; fields that are present must not be blank.
pub fn validate_update(
  request: &UpdatePropertyRequest,
) -> Result<UpdatePropertyRequest, ValidationError> {
  let mut errors = ValidationError::new();
  if request.id.trim().is_empty() {
    errors.push("id", "Property id is required");
  }
  if request.is_empty() {
    errors.push("address", "Nothing to update");
  }

  let address = request
    .address
    .as_deref()
    .map(|v| required(&mut errors, "address", v, "Address is required"));
  let city = request
    .city
    .as_deref()
    .map(|v| required(&mut errors, "city", v, "City is required"));
  let postcode = request
    .postcode
    .as_deref()
    .map(|v| required(&mut errors, "postcode", v, "Postal code is required"));
  if let Some(postcode) = postcode.as_deref().filter(|p| !p.is_empty()) {
    if !is_uk_postcode(postcode) {
      errors.push("postcode", POSTCODE_MESSAGE);
    }
  }

  errors.into_result(UpdatePropertyRequest {
    id: request.id.trim().to_string(),
    address,
    city,
    postcode,
  })
}

/// Trimmed search text, or a length error.
pub fn validate_search(value: &str, max_length: usize) -> Result<String, ValidationError> {
  let trimmed = value.trim();
  if trimmed.chars().count() > max_length {
    return Err(ValidationError::single(
      "search",
      format!("Input must not exceed {} characters", max_length),
    ));
  }
  Ok(trimmed.to_string())
}

pub fn validate_list_params(params: &ListParams) -> Result<(), ValidationError> {
  let mut errors = ValidationError::new();
  if params.page < 1 {
    errors.push("page", "Page must be at least 1");
  }
  if !PAGE_SIZES.contains(&params.limit) {
    let sizes: Vec<String> = PAGE_SIZES.iter().map(u32::to_string).collect();
    errors.push(
      "limit",
      format!("Page size must be one of {}", sizes.join(", ")),
    );
  }
  if let Some(search) = &params.search {
    if let Err(err) = validate_search(search, DEFAULT_SEARCH_MAX_LENGTH) {
      errors.extend(err);
    }
  }
  errors.into_result(())
}

pub fn validate_report_filters(filters: &ReportFilters) -> Result<(), ValidationError> {
  match (filters.start_date, filters.end_date) {
    (Some(start), Some(end)) if start > end => Err(ValidationError::single(
      "start_date",
      "Start date must not be after end date",
    )),
    _ => Ok(()),
  }
}
