//! JSON REST API for Warden.
//!
//! Exposes an axum [`Router`] over an [`AdminService`] whose store also acts
//! as the audit recorder. Authentication is HTTP Basic against the stored
//! argon2 hashes; TLS and transport concerns are the caller's
//! responsibility.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", warden_api::api_router(state))
//! ```

pub mod activity;
pub mod auth;
pub mod error;
pub mod invitations;
pub mod page;
pub mod permissions;
pub mod roles;
pub mod users;

use std::sync::Arc;

use axum::{
  Router,
  routing::{delete, get, patch, post},
};
use tower_http::trace::TraceLayer;
use warden_core::{AdminService, activity::AuditRecorder, store::AdminStore};

pub use auth::Argon2Hasher;
pub use error::ApiError;

/// A backend usable by the router: one value serving as both the store and
/// the audit recorder.
pub trait Backend: AdminStore + AuditRecorder + 'static {}

impl<T: AdminStore + AuditRecorder + 'static> Backend for T {}

// ─── Application state ───────────────────────────────────────────────────────

/// Shared state threaded through all axum handlers.
pub struct AppState<S> {
  pub service: Arc<AdminService<S, S>>,
}

impl<S> AppState<S> {
  pub fn new(service: AdminService<S, S>) -> Self { Self { service: Arc::new(service) } }
}

impl<S> Clone for AppState<S> {
  fn clone(&self) -> Self { Self { service: Arc::clone(&self.service) } }
}

// ─── Router ──────────────────────────────────────────────────────────────────

/// Build a fully-materialised API router.
///
/// Bulk routes share the `{id}` segment with the single-target routes; their
/// handlers read it as a comma-separated id list.
pub fn api_router<S: Backend>(state: AppState<S>) -> Router<()> {
  Router::new()
    // Users
    .route("/users", get(users::list::<S>))
    .route("/users/{id}", patch(users::update::<S>).delete(users::delete::<S>))
    .route("/users/{id}/restore", patch(users::restore::<S>))
    .route("/users/{id}/force-delete", delete(users::force_delete::<S>))
    .route("/users/{id}/bulk-update", patch(users::bulk_update::<S>))
    .route("/users/{id}/bulk-delete", delete(users::bulk_delete::<S>))
    .route("/users/{id}/bulk-restore", patch(users::bulk_restore::<S>))
    .route("/users/{id}/bulk-force-delete", delete(users::bulk_force_delete::<S>))
    // Roles and permissions
    .route("/roles", get(roles::list::<S>).post(roles::create::<S>))
    .route(
      "/roles/{id}",
      get(roles::show::<S>).patch(roles::update::<S>).delete(roles::delete::<S>),
    )
    .route("/permissions", get(permissions::list::<S>))
    // Activity
    .route("/activity-logs", get(activity::list::<S>))
    .route("/activity-logs/facets", get(activity::facets::<S>))
    // Invitations
    .route("/invitations", post(invitations::create::<S>))
    .route("/invitations/accept", post(invitations::accept::<S>))
    .route("/invitations/{token}", get(invitations::show::<S>))
    .layer(TraceLayer::new_for_http())
    .with_state(state)
}
