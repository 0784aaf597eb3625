//! Handlers for `/users` endpoints.
//!
//! | Method   | Path | Notes |
//! |----------|------|-------|
//! | `GET`    | `/users` | `search`, `filters`, `sort`, `deleted`, `page`, `per_page`; rows carry `can` |
//! | `PATCH`  | `/users/{id}` | Body: [`UserUpdate`] |
//! | `DELETE` | `/users/{id}` | Soft delete |
//! | `PATCH`  | `/users/{id}/restore` | Soft-deleted users only |
//! | `DELETE` | `/users/{id}/force-delete` | Soft-deleted users only |
//! | `PATCH`  | `/users/{ids}/bulk-update` | `ids` is comma-separated; body: [`BulkUpdate`] |
//! | `DELETE` | `/users/{ids}/bulk-delete` | |
//! | `PATCH`  | `/users/{ids}/bulk-restore` | |
//! | `DELETE` | `/users/{ids}/bulk-force-delete` | |

use axum::{
  Json,
  extract::{OriginalUri, Path, Query, State},
};
use serde::Serialize;
use uuid::Uuid;
use warden_core::{
  bulk::{BulkOperation, BulkReport, BulkUpdate, IdSet},
  identity::{Caller, User, UserId, UserUpdate},
  policy::{Authorized, UserAbilities},
  query::ListParams,
};

use crate::{AppState, Backend, auth::CurrentCaller, error::Result, page::Paginated};

// ─── List ────────────────────────────────────────────────────────────────────

/// `GET /users`
pub async fn list<S: Backend>(
  State(state): State<AppState<S>>,
  CurrentCaller(caller): CurrentCaller,
  OriginalUri(uri): OriginalUri,
  Query(params): Query<ListParams>,
) -> Result<Json<Paginated<Authorized<User, UserAbilities>>>> {
  let page = state.service.list_users(&caller, &params).await?;
  let page = page.map(|user| Authorized::user(&caller, user));
  Ok(Json(Paginated::new(page, &uri)))
}

// ─── Single ──────────────────────────────────────────────────────────────────

/// `PATCH /users/{id}`
pub async fn update<S: Backend>(
  State(state): State<AppState<S>>,
  CurrentCaller(caller): CurrentCaller,
  Path(id): Path<UserId>,
  Json(body): Json<UserUpdate>,
) -> Result<Json<User>> {
  Ok(Json(state.service.update_user(&caller, id, body).await?))
}

/// `DELETE /users/{id}`
pub async fn delete<S: Backend>(
  State(state): State<AppState<S>>,
  CurrentCaller(caller): CurrentCaller,
  Path(id): Path<UserId>,
) -> Result<Json<User>> {
  Ok(Json(state.service.delete_user(&caller, id).await?))
}

/// `PATCH /users/{id}/restore`
pub async fn restore<S: Backend>(
  State(state): State<AppState<S>>,
  CurrentCaller(caller): CurrentCaller,
  Path(id): Path<UserId>,
) -> Result<Json<User>> {
  Ok(Json(state.service.restore_user(&caller, id).await?))
}

/// `DELETE /users/{id}/force-delete`
pub async fn force_delete<S: Backend>(
  State(state): State<AppState<S>>,
  CurrentCaller(caller): CurrentCaller,
  Path(id): Path<UserId>,
) -> Result<Json<User>> {
  Ok(Json(state.service.force_delete_user(&caller, id).await?))
}

// ─── Bulk ────────────────────────────────────────────────────────────────────

/// Response body of every bulk endpoint.
#[derive(Debug, Serialize)]
pub struct BulkBody {
  pub event:      &'static str,
  pub batch_uuid: Uuid,
  pub data:       Vec<User>,
}

impl From<BulkReport> for BulkBody {
  fn from(report: BulkReport) -> Self {
    Self { event: report.event, batch_uuid: report.batch, data: report.affected }
  }
}

async fn bulk<S: Backend>(
  state: &AppState<S>,
  caller: &Caller,
  ids: &str,
  operation: BulkOperation,
) -> Result<Json<BulkBody>> {
  let ids = IdSet::parse(ids)?;
  let report = state.service.bulk(caller, &ids, operation).await?;
  Ok(Json(report.into()))
}

/// `PATCH /users/{ids}/bulk-update`
pub async fn bulk_update<S: Backend>(
  State(state): State<AppState<S>>,
  CurrentCaller(caller): CurrentCaller,
  Path(ids): Path<String>,
  Json(body): Json<BulkUpdate>,
) -> Result<Json<BulkBody>> {
  bulk(&state, &caller, &ids, BulkOperation::Update(body)).await
}

/// `DELETE /users/{ids}/bulk-delete`
pub async fn bulk_delete<S: Backend>(
  State(state): State<AppState<S>>,
  CurrentCaller(caller): CurrentCaller,
  Path(ids): Path<String>,
) -> Result<Json<BulkBody>> {
  bulk(&state, &caller, &ids, BulkOperation::Delete).await
}

/// `PATCH /users/{ids}/bulk-restore`
pub async fn bulk_restore<S: Backend>(
  State(state): State<AppState<S>>,
  CurrentCaller(caller): CurrentCaller,
  Path(ids): Path<String>,
) -> Result<Json<BulkBody>> {
  bulk(&state, &caller, &ids, BulkOperation::Restore).await
}

/// `DELETE /users/{ids}/bulk-force-delete`
pub async fn bulk_force_delete<S: Backend>(
  State(state): State<AppState<S>>,
  CurrentCaller(caller): CurrentCaller,
  Path(ids): Path<String>,
) -> Result<Json<BulkBody>> {
  bulk(&state, &caller, &ids, BulkOperation::ForceDelete).await
}
