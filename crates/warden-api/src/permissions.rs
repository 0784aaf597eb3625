//! Handler for `GET /permissions`.

use axum::{Json, extract::State};
use warden_core::identity::PermissionView;

use crate::{AppState, Backend, auth::CurrentCaller, error::Result};

/// The full catalog with the names of the roles holding each permission.
pub async fn list<S: Backend>(
  State(state): State<AppState<S>>,
  CurrentCaller(caller): CurrentCaller,
) -> Result<Json<Vec<PermissionView>>> {
  Ok(Json(state.service.list_permissions(&caller).await?))
}
