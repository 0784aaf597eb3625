//! Handlers for `/roles` endpoints.
//!
//! | Method   | Path | Notes |
//! |----------|------|-------|
//! | `GET`    | `/roles` | Paginated; `filters` on `name`, `permission`, `created_at`; rows carry `can` |
//! | `POST`   | `/roles` | Body: `{"name":"auditor","permissions":["user.read"]}`; 201 |
//! | `GET`    | `/roles/{id}` | 404 when hidden, otherwise always 403 |
//! | `PATCH`  | `/roles/{id}` | Same body as `POST` |
//! | `DELETE` | `/roles/{id}` | Returns the deleted role |

use axum::{
  Json,
  extract::{OriginalUri, Path, Query, State},
  http::StatusCode,
};
use warden_core::{
  identity::{RoleId, RoleInput, RoleView},
  policy::{Authorized, RoleAbilities},
  query::ListParams,
};

use crate::{AppState, Backend, auth::CurrentCaller, error::Result, page::Paginated};

/// `GET /roles`
pub async fn list<S: Backend>(
  State(state): State<AppState<S>>,
  CurrentCaller(caller): CurrentCaller,
  OriginalUri(uri): OriginalUri,
  Query(params): Query<ListParams>,
) -> Result<Json<Paginated<Authorized<RoleView, RoleAbilities>>>> {
  let page = state.service.list_roles(&caller, &params).await?;
  let page = page.map(|role| Authorized::role(&caller, role));
  Ok(Json(Paginated::new(page, &uri)))
}

/// `POST /roles`
pub async fn create<S: Backend>(
  State(state): State<AppState<S>>,
  CurrentCaller(caller): CurrentCaller,
  Json(body): Json<RoleInput>,
) -> Result<(StatusCode, Json<RoleView>)> {
  let role = state.service.create_role(&caller, body).await?;
  Ok((StatusCode::CREATED, Json(role)))
}

/// `GET /roles/{id}`
pub async fn show<S: Backend>(
  State(state): State<AppState<S>>,
  CurrentCaller(caller): CurrentCaller,
  Path(id): Path<RoleId>,
) -> Result<Json<RoleView>> {
  Ok(Json(state.service.show_role(&caller, id).await?))
}

/// `PATCH /roles/{id}`
pub async fn update<S: Backend>(
  State(state): State<AppState<S>>,
  CurrentCaller(caller): CurrentCaller,
  Path(id): Path<RoleId>,
  Json(body): Json<RoleInput>,
) -> Result<Json<RoleView>> {
  Ok(Json(state.service.update_role(&caller, id, body).await?))
}

/// `DELETE /roles/{id}`
pub async fn delete<S: Backend>(
  State(state): State<AppState<S>>,
  CurrentCaller(caller): CurrentCaller,
  Path(id): Path<RoleId>,
) -> Result<Json<RoleView>> {
  Ok(Json(state.service.delete_role(&caller, id).await?))
}
