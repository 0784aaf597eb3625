//! The `AdminStore` trait.
//!
//! Implemented by storage backends (e.g. `warden-store-sqlite`). The service
//! layer and the API depend on this abstraction only.
//!
//! Every method that lists, counts or checks for users or roles takes a
//! [`Visibility`]; there is no unscoped variant. The single exception is
//! [`AdminStore::email_in_use`], a uniqueness check that must see every row
//! and returns nothing but a boolean.

use std::future::Future;

use chrono::{DateTime, Utc};

use crate::{
  activity::{ActivityEntry, ActivityFacets},
  bulk::{BulkMutation, BulkOutcome, IdSet},
  identity::{
    Caller, Credentials, NewUser, PermissionView, Role, RoleId, RoleView, User,
    UserChanges, UserId,
  },
  invitation::{AcceptOutcome, Invitation, NewInvitation, ReplaceOutcome},
  permission::Ability,
  query::{DeletedScope, ListQuery, Page},
  visibility::Visibility,
};

/// Abstraction over a Warden store backend.
///
/// All methods return `Send` futures so the trait can be used from axum
/// handlers on a multi-threaded runtime.
pub trait AdminStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static + Into<crate::Error>;

  // ── Users ─────────────────────────────────────────────────────────────

  fn list_users<'a>(
    &'a self,
    query: &'a ListQuery,
    visibility: Visibility,
  ) -> impl Future<Output = Result<Page<User>, Self::Error>> + Send + 'a;

  fn find_user(
    &self,
    id: UserId,
    visibility: Visibility,
    scope: DeletedScope,
  ) -> impl Future<Output = Result<Option<User>, Self::Error>> + Send + '_;

  /// Whether any user row (live, soft-deleted or hidden) other than
  /// `except` holds `email`.
  fn email_in_use<'a>(
    &'a self,
    email: &'a str,
    except: Option<UserId>,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + 'a;

  /// Credentials of a live user, for the identity provider.
  fn credentials_by_email<'a>(
    &'a self,
    email: &'a str,
  ) -> impl Future<Output = Result<Option<Credentials>, Self::Error>> + Send + 'a;

  /// Resolve a live user into a [`Caller`] with the union of its roles'
  /// permissions.
  fn load_caller(
    &self,
    id: UserId,
  ) -> impl Future<Output = Result<Option<Caller>, Self::Error>> + Send + '_;

  fn update_user(
    &self,
    id: UserId,
    changes: UserChanges,
  ) -> impl Future<Output = Result<User, Self::Error>> + Send + '_;

  /// Resolve `ids` against `mutation.scope()` under `visibility`, compare
  /// counts, call `authorize` with the resolved rows and apply the mutation,
  /// all inside one transaction. Nothing is written unless the outcome is
  /// [`BulkOutcome::Applied`].
  fn bulk_apply<'a, A>(
    &'a self,
    visibility: Visibility,
    ids: &'a IdSet,
    mutation: BulkMutation,
    authorize: A,
  ) -> impl Future<Output = Result<BulkOutcome, Self::Error>> + Send + 'a
  where
    A: FnOnce(&[User]) -> bool + Send + 'static;

  // ── Roles and permissions ─────────────────────────────────────────────

  fn list_roles<'a>(
    &'a self,
    query: &'a ListQuery,
    visibility: Visibility,
  ) -> impl Future<Output = Result<Page<RoleView>, Self::Error>> + Send + 'a;

  fn find_role(
    &self,
    id: RoleId,
    visibility: Visibility,
  ) -> impl Future<Output = Result<Option<RoleView>, Self::Error>> + Send + '_;

  fn find_role_by_name<'a>(
    &'a self,
    name: &'a str,
    visibility: Visibility,
  ) -> impl Future<Output = Result<Option<Role>, Self::Error>> + Send + 'a;

  /// Whether a visible role other than `except` is named `name`.
  fn role_exists<'a>(
    &'a self,
    name: &'a str,
    except: Option<RoleId>,
    visibility: Visibility,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + 'a;

  /// Insert a role; the returned view counts only users `visibility` admits.
  fn create_role(
    &self,
    name: String,
    abilities: Vec<Ability>,
    visibility: Visibility,
  ) -> impl Future<Output = Result<RoleView, Self::Error>> + Send + '_;

  /// Rename a role and replace its permission set.
  fn update_role(
    &self,
    id: RoleId,
    name: String,
    abilities: Vec<Ability>,
    visibility: Visibility,
  ) -> impl Future<Output = Result<RoleView, Self::Error>> + Send + '_;

  /// Delete a role, detaching it from users and permissions.
  fn delete_role(
    &self,
    id: RoleId,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// The permission catalog with the visible roles granting each entry.
  fn list_permissions(
    &self,
    visibility: Visibility,
  ) -> impl Future<Output = Result<Vec<PermissionView>, Self::Error>> + Send + '_;

  // ── Activity log ──────────────────────────────────────────────────────

  /// Causers hidden by `visibility` are reported as absent and never match
  /// a causer filter.
  fn list_activity<'a>(
    &'a self,
    query: &'a ListQuery,
    visibility: Visibility,
  ) -> impl Future<Output = Result<Page<ActivityEntry>, Self::Error>> + Send + 'a;

  fn activity_facets(
    &self,
  ) -> impl Future<Output = Result<ActivityFacets, Self::Error>> + Send + '_;

  // ── Invitations ───────────────────────────────────────────────────────

  fn find_invitation_by_token_hash<'a>(
    &'a self,
    token_hash: &'a str,
  ) -> impl Future<Output = Result<Option<Invitation>, Self::Error>> + Send + 'a;

  fn find_invitation_by_email<'a>(
    &'a self,
    email: &'a str,
  ) -> impl Future<Output = Result<Option<Invitation>, Self::Error>> + Send + 'a;

  /// In one transaction: if a live invitation exists for the email return
  /// [`ReplaceOutcome::Pending`], otherwise delete stale rows for the email
  /// and insert `invitation`.
  fn replace_invitation(
    &self,
    invitation: NewInvitation,
    now: DateTime<Utc>,
  ) -> impl Future<Output = Result<ReplaceOutcome, Self::Error>> + Send + '_;

  /// In one transaction: create `user` with the invitation's role, mark it
  /// verified and stamp `accepted_at`. Nothing is written unless the
  /// invitation is still unaccepted and unexpired at `now`.
  fn accept_invitation(
    &self,
    invitation_id: i64,
    user: NewUser,
    now: DateTime<Utc>,
  ) -> impl Future<Output = Result<AcceptOutcome, Self::Error>> + Send + '_;

  // ── Bootstrap ─────────────────────────────────────────────────────────

  /// Create `user` with the protected role unless a user with that email
  /// already exists. Returns the user and whether it was created.
  fn ensure_super_admin(
    &self,
    user: NewUser,
  ) -> impl Future<Output = Result<(User, bool), Self::Error>> + Send + '_;
}
