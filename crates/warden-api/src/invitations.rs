//! Handlers for `/invitations` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/invitations` | Authenticated; body: `{"email":..,"role":..}`; 201 |
//! | `GET`  | `/invitations/{token}` | Public; pre-fills the registration form |
//! | `POST` | `/invitations/accept` | Public; body: [`AcceptRequest`]; 201 + the new user |
//!
//! The plain token appears exactly once, in the `POST /invitations`
//! response; only its hash is stored.

use axum::{
  Json,
  extract::{Path, State},
  http::StatusCode,
};
use warden_core::{
  identity::User,
  invitation::{AcceptRequest, InvitationPreview, InviteRequest, IssuedInvitation},
};

use crate::{AppState, Backend, auth::CurrentCaller, error::Result};

/// `POST /invitations`
pub async fn create<S: Backend>(
  State(state): State<AppState<S>>,
  CurrentCaller(caller): CurrentCaller,
  Json(body): Json<InviteRequest>,
) -> Result<(StatusCode, Json<IssuedInvitation>)> {
  let issued = state.service.invite(&caller, body).await?;
  Ok((StatusCode::CREATED, Json(issued)))
}

/// `GET /invitations/{token}`
pub async fn show<S: Backend>(
  State(state): State<AppState<S>>,
  Path(token): Path<String>,
) -> Result<Json<InvitationPreview>> {
  Ok(Json(state.service.show_invitation(&token).await?))
}

/// `POST /invitations/accept`
pub async fn accept<S: Backend>(
  State(state): State<AppState<S>>,
  Json(body): Json<AcceptRequest>,
) -> Result<(StatusCode, Json<User>)> {
  let user = state.service.accept_invitation(body).await?;
  Ok((StatusCode::CREATED, Json(user)))
}
