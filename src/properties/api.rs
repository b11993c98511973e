//! Property endpoints: cached queries and optimistic mutations.

use chrono::Utc;
use futures::future::BoxFuture;
use futures::FutureExt;
use reqwest::Method;
use serde::de::IgnoredAny;
use tracing::info;

use crate::api::{
  ApiClient, ApiError, ApiResponse, ListEnvelope, Paginated, QueryParams, RequestContext,
};
use crate::cache::{
  CacheConfig, CacheResult, Invalidate, MutationState, OptimisticMutation, QueryCache, Tag,
};

use super::keys::{PropertyDetailKey, PropertyListKey};
use super::types::{
  CreatePropertyRequest, ListParams, Property, PropertyWithReports, ReportFilters,
  UpdatePropertyRequest,
};
use super::validate::{
  validate_create, validate_list_params, validate_report_filters, validate_update,
};

/// Entry point for everything property related.
///
/// Holds one cache per endpoint and the request context every call uses.
#[derive(Clone)]
pub struct PropertyApi {
  client: ApiClient,
  ctx: RequestContext,
  lists: QueryCache<PropertyListKey>,
  details: QueryCache<PropertyDetailKey>,
}

/// A mutation whose optimistic patches are already visible.
///
/// Await `settle` to send the request and confirm or roll back.
#[must_use = "the request is only sent when the mutation is settled"]
pub struct PendingMutation<T> {
  mutation: OptimisticMutation,
  request: BoxFuture<'static, Result<T, ApiError>>,
  api: PropertyApi,
}

impl<T> PendingMutation<T> {
  pub fn state(&self) -> MutationState {
    self.mutation.state()
  }

  pub async fn settle(self) -> Result<T, ApiError> {
    let PendingMutation {
      mut mutation,
      request,
      api,
    } = self;
    mutation.run(request, &api.caches()).await
  }
}

async fn fetch_list(
  client: ApiClient,
  ctx: RequestContext,
  query: QueryParams,
) -> Result<Paginated<Property>, ApiError> {
  let envelope: ListEnvelope<Property> = client.get(&ctx, &["properties"], &query).await?;
  Ok(envelope.into_page())
}

async fn fetch_detail(
  client: ApiClient,
  ctx: RequestContext,
  id: String,
  query: QueryParams,
) -> Result<PropertyWithReports, ApiError> {
  let response: ApiResponse<PropertyWithReports> =
    client.get(&ctx, &["properties", id.as_str()], &query).await?;
  Ok(response.data)
}

impl PropertyApi {
  pub fn new(client: ApiClient, ctx: RequestContext, config: CacheConfig) -> Self {
    let lists = {
      let client = client.clone();
      let ctx = ctx.clone();
      QueryCache::new(
        move |key: &PropertyListKey| fetch_list(client.clone(), ctx.clone(), key.params.to_query()),
        config,
      )
    };

    let details = {
      let client = client.clone();
      let ctx = ctx.clone();
      QueryCache::new(
        move |key: &PropertyDetailKey| {
          fetch_detail(
            client.clone(),
            ctx.clone(),
            key.id.clone(),
            key.filters.to_query(),
          )
        },
        config,
      )
    };

    Self {
      client,
      ctx,
      lists,
      details,
    }
  }

  pub fn lists(&self) -> &QueryCache<PropertyListKey> {
    &self.lists
  }

  pub fn details(&self) -> &QueryCache<PropertyDetailKey> {
    &self.details
  }

  fn caches(&self) -> [&dyn Invalidate; 2] {
    [&self.lists, &self.details]
  }

  /// Fetch a page of properties.
  pub async fn list(
    &self,
    params: &ListParams,
  ) -> Result<CacheResult<Paginated<Property>>, ApiError> {
    validate_list_params(params)?;
    self.lists.fetch(&PropertyListKey::new(params.clone())).await
  }

  /// Fetch one property with its reports.
  pub async fn property(
    &self,
    id: &str,
    filters: &ReportFilters,
  ) -> Result<CacheResult<PropertyWithReports>, ApiError> {
    validate_report_filters(filters)?;
    self
      .details
      .fetch(&PropertyDetailKey::with_filters(id, filters.clone()))
      .await
  }

  /// Create a property.
  ///
  /// A provisional row is prepended to every cached first page whose filters
  /// admit it, before this returns.
  pub fn create_property(
    &self,
    request: &CreatePropertyRequest,
  ) -> Result<PendingMutation<Property>, ApiError> {
    let request = validate_create(request)?;
    let provisional = Property::provisional(&request, Utc::now());

    let row = provisional.clone();
    let patches = self.lists.update_matching(
      |key, _| key.params.admits(&provisional),
      move |page: &mut Paginated<Property>| {
        page.data.insert(0, row.clone());
        page.pagination.total += 1;
      },
    );
    info!(
      id = %provisional.id,
      pages = patches.applied_count(),
      "Optimistically created property"
    );

    let mutation = OptimisticMutation::new("createProperty")
      .with_patches(patches)
      .invalidates(vec![Tag::property_list()]);

    let client = self.client.clone();
    let ctx = self.ctx.clone();
    let request = async move {
      let response: ApiResponse<Property> = client
        .send(&ctx, Method::POST, &["properties"], &request)
        .await?;
      Ok(response.data)
    }
    .boxed();

    Ok(PendingMutation {
      mutation,
      request,
      api: self.clone(),
    })
  }

  /// Archive a property: it is shown as inactive immediately.
  pub fn archive_property(&self, id: &str) -> Result<PendingMutation<()>, ApiError> {
    let now = Utc::now();
    let mut patches = {
      let id = id.to_string();
      self.details.update_matching(
        |key, _| key.id == id,
        move |detail: &mut PropertyWithReports| {
          detail.property.is_active = false;
          detail.property.touch(now);
        },
      )
    };
    patches.extend(self.patch_list_rows(id, move |property| {
      property.is_active = false;
      property.touch(now);
    }));
    info!(id, entries = patches.applied_count(), "Optimistically archived property");

    let mutation = OptimisticMutation::new("archiveProperty")
      .with_patches(patches)
      .invalidates(vec![Tag::property(id), Tag::property_list()]);

    let client = self.client.clone();
    let ctx = self.ctx.clone();
    let id = id.to_string();
    let request = async move {
      let _: IgnoredAny = client
        .send_empty(&ctx, Method::PUT, &["properties", id.as_str(), "archive"])
        .await?;
      Ok(())
    }
    .boxed();

    Ok(PendingMutation {
      mutation,
      request,
      api: self.clone(),
    })
  }

  /// Update address fields; changes show immediately in detail and list views.
  pub fn update_property(
    &self,
    request: &UpdatePropertyRequest,
  ) -> Result<PendingMutation<Property>, ApiError> {
    let request = validate_update(request)?;
    let now = Utc::now();

    let mut patches = {
      let id = request.id.clone();
      let update = request.clone();
      self.details.update_matching(
        |key, _| key.id == id,
        move |detail: &mut PropertyWithReports| {
          update.apply_to(&mut detail.property);
          detail.property.touch(now);
        },
      )
    };
    let update = request.clone();
    patches.extend(self.patch_list_rows(&request.id, move |property| {
      update.apply_to(property);
      property.touch(now);
    }));
    info!(id = %request.id, entries = patches.applied_count(), "Optimistically updated property");

    let mutation = OptimisticMutation::new("updateProperty")
      .with_patches(patches)
      .invalidates(vec![Tag::property(&request.id), Tag::property_list()]);

    let client = self.client.clone();
    let ctx = self.ctx.clone();
    let request = async move {
      let response: ApiResponse<Property> = client
        .send(&ctx, Method::PUT, &["properties", request.id.as_str()], &request)
        .await?;
      Ok(response.data)
    }
    .boxed();

    Ok(PendingMutation {
      mutation,
      request,
      api: self.clone(),
    })
  }

  /// Patch the row for `id` in every cached list page that contains it.
  fn patch_list_rows(
    &self,
    id: &str,
    edit: impl Fn(&mut Property) + Send + Sync + 'static,
  ) -> crate::cache::PatchSet {
    let target = id.to_string();
    let id = id.to_string();
    self.lists.update_matching(
      |_, page| page.data.iter().any(|p| p.id == target),
      move |page: &mut Paginated<Property>| {
        if let Some(property) = page.data.iter_mut().find(|p| p.id == id) {
          edit(property);
        }
      },
    )
  }
}
