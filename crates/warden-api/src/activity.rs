//! Handlers for `/activity-logs` endpoints.

use axum::{
  Json,
  extract::{OriginalUri, Query, State},
};
use warden_core::{
  activity::{ActivityEntry, ActivityFacets},
  query::ListParams,
};

use crate::{AppState, Backend, auth::CurrentCaller, error::Result, page::Paginated};

/// `GET /activity-logs`. Newest first unless `sort` says otherwise.
pub async fn list<S: Backend>(
  State(state): State<AppState<S>>,
  CurrentCaller(caller): CurrentCaller,
  OriginalUri(uri): OriginalUri,
  Query(params): Query<ListParams>,
) -> Result<Json<Paginated<ActivityEntry>>> {
  let page = state.service.list_activity(&caller, &params).await?;
  Ok(Json(Paginated::new(page, &uri)))
}

/// `GET /activity-logs/facets`
pub async fn facets<S: Backend>(
  State(state): State<AppState<S>>,
  CurrentCaller(caller): CurrentCaller,
) -> Result<Json<ActivityFacets>> {
  Ok(Json(state.service.activity_facets(&caller).await?))
}
