//! [`AdminService`]: the operations exposed by the admin surface.
//!
//! Every operation takes the authenticated [`Caller`] explicitly, derives the
//! visibility scope from it, consults the policy engine, validates input,
//! calls the store and finally records an audit entry.

use std::sync::Arc;

use chrono::{Duration, Utc};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::{
  Error, Result,
  activity::{ActivityEntry, ActivityFacets, AuditRecorder, NewActivity},
  bulk::{BulkCoordinator, BulkOperation, BulkReport, BulkUpdate, IdSet},
  error::{InvitationError, ValidationErrors},
  identity::{
    Caller, NewUser, PROTECTED_ROLE, PermissionView, Role, RoleId, RoleInput, RoleView,
    User, UserChanges, UserId, UserStatus, UserUpdate,
  },
  invitation::{
    AcceptOutcome, AcceptRequest, InvitationPreview, InvitationState, InvitationToken,
    InviteRequest, IssuedInvitation, NewInvitation, ReplaceOutcome,
  },
  mail::{MailMessage, Mailer, PasswordHasher},
  policy::{self, Action, ActivityLogAction, PermissionAction, RoleAction, UserAction},
  query::{self, DeletedScope, ListParams, ListQuery, Page},
  store::AdminStore,
  validate,
  visibility::Visibility,
};

/// Tunables supplied by the host application.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
  pub default_per_page: u64,
  pub invitation_ttl:   Duration,
  /// Prefix of the link mailed to invitees; the token is appended.
  pub accept_url_base:  String,
}

impl Default for ServiceConfig {
  fn default() -> Self {
    Self {
      default_per_page: 10,
      invitation_ttl:   Duration::hours(24),
      accept_url_base:  "http://localhost:8080/invitations/".to_owned(),
    }
  }
}

pub struct AdminService<S, R> {
  store:  S,
  audit:  R,
  mailer: Arc<dyn Mailer>,
  hasher: Arc<dyn PasswordHasher>,
  config: ServiceConfig,
}

fn allow(caller: &Caller, action: Action<'_>) -> Result<()> {
  if policy::can(caller, &action) {
    Ok(())
  } else {
    Err(Error::PermissionDenied)
  }
}

impl<S, R> AdminService<S, R>
where
  S: AdminStore,
  R: AuditRecorder,
{
  pub fn new(
    store: S,
    audit: R,
    mailer: Arc<dyn Mailer>,
    hasher: Arc<dyn PasswordHasher>,
    config: ServiceConfig,
  ) -> Self {
    Self { store, audit, mailer, hasher, config }
  }

  pub fn store(&self) -> &S { &self.store }

  pub fn hasher(&self) -> &dyn PasswordHasher { self.hasher.as_ref() }

  pub fn config(&self) -> &ServiceConfig { &self.config }

  fn bulk_coordinator(&self) -> BulkCoordinator<'_, S, R> {
    BulkCoordinator::new(&self.store, &self.audit)
  }

  async fn record(&self, entry: NewActivity) {
    let event = entry.event.clone();
    if let Err(e) = self.audit.record(entry).await {
      warn!(%event, error = %e, "failed to record activity");
    }
  }

  // ── Users ─────────────────────────────────────────────────────────────

  pub async fn list_users(&self, caller: &Caller, params: &ListParams) -> Result<Page<User>> {
    allow(caller, Action::User(UserAction::ViewList))?;
    let query = ListQuery::parse(params, &query::USERS, self.config.default_per_page);
    debug!(caller = caller.id, ?query, "listing users");
    self
      .store
      .list_users(&query, Visibility::for_caller(Some(caller)))
      .await
      .map_err(Error::from_backend)
  }

  /// Apply a full field set to one live user.
  pub async fn update_user(
    &self,
    caller: &Caller,
    id: UserId,
    input: UserUpdate,
  ) -> Result<User> {
    let visibility = Visibility::for_caller(Some(caller));
    let existing = self
      .store
      .find_user(id, visibility, DeletedScope::Live)
      .await
      .map_err(Error::from_backend)?
      .ok_or(Error::NotFound)?;

    allow(caller, Action::User(UserAction::Update(id)))?;

    let mut errors = ValidationErrors::default();
    validate::name(&mut errors, "name", &input.name);
    validate::email(&mut errors, "email", &input.email);
    if !errors.has("email")
      && self
        .store
        .email_in_use(&input.email, Some(id))
        .await
        .map_err(Error::from_backend)?
    {
      errors.add("email", "The email has already been taken.");
    }
    let role = self
      .store
      .find_role_by_name(&input.role, visibility)
      .await
      .map_err(Error::from_backend)?;
    if role.is_none() {
      errors.add("role", "The selected role is invalid.");
    }
    errors.into_result()?;
    let Some(role) = role else {
      return Err(Error::invalid("role", "The selected role is invalid."));
    };

    let changes = UserChanges {
      clear_verification: input.email != existing.email,
      name: input.name,
      email: input.email,
      status: input.status,
      role_id: role.id,
    };
    let updated = self.store.update_user(id, changes).await.map_err(Error::from_backend)?;
    info!(caller = caller.id, user = id, "user updated");

    self
      .record(
        NewActivity::new("user", "updated", "user updated")
          .subject("user", id)
          .causer(caller.id)
          .properties(json!({
            "old": {
              "name": existing.name,
              "email": existing.email,
              "status": existing.status,
              "role": existing.role,
            },
            "attributes": {
              "name": updated.name,
              "email": updated.email,
              "status": updated.status,
              "role": updated.role,
            },
          })),
      )
      .await;

    Ok(updated)
  }

  pub async fn bulk(
    &self,
    caller: &Caller,
    ids: &IdSet,
    operation: BulkOperation,
  ) -> Result<BulkReport> {
    self.bulk_coordinator().execute(caller, ids, operation).await
  }

  pub async fn update_users(
    &self,
    caller: &Caller,
    ids: &IdSet,
    update: BulkUpdate,
  ) -> Result<BulkReport> {
    self.bulk(caller, ids, BulkOperation::Update(update)).await
  }

  /// Run a one-element bulk operation; an unresolved id is a plain 404.
  async fn single(
    &self,
    caller: &Caller,
    id: UserId,
    operation: BulkOperation,
  ) -> Result<User> {
    let report = self
      .bulk(caller, &IdSet::single(id), operation)
      .await
      .map_err(|e| match e {
        Error::Unprocessable { .. } => Error::NotFound,
        e => e,
      })?;
    report.affected.into_iter().next().ok_or(Error::NotFound)
  }

  pub async fn delete_user(&self, caller: &Caller, id: UserId) -> Result<User> {
    self.single(caller, id, BulkOperation::Delete).await
  }

  pub async fn restore_user(&self, caller: &Caller, id: UserId) -> Result<User> {
    self.single(caller, id, BulkOperation::Restore).await
  }

  pub async fn force_delete_user(&self, caller: &Caller, id: UserId) -> Result<User> {
    self.single(caller, id, BulkOperation::ForceDelete).await
  }

  // ── Roles ─────────────────────────────────────────────────────────────

  pub async fn list_roles(
    &self,
    caller: &Caller,
    params: &ListParams,
  ) -> Result<Page<RoleView>> {
    allow(caller, Action::Role(RoleAction::ViewList))?;
    let query = ListQuery::parse(params, &query::ROLES, self.config.default_per_page);
    debug!(caller = caller.id, ?query, "listing roles");
    self
      .store
      .list_roles(&query, Visibility::for_caller(Some(caller)))
      .await
      .map_err(Error::from_backend)
  }

  async fn visible_role(&self, caller: &Caller, id: RoleId) -> Result<RoleView> {
    self
      .store
      .find_role(id, Visibility::for_caller(Some(caller)))
      .await
      .map_err(Error::from_backend)?
      .ok_or(Error::NotFound)
  }

  /// Role detail. Hidden roles are a 404; visible ones are refused.
  pub async fn show_role(&self, caller: &Caller, id: RoleId) -> Result<RoleView> {
    let role = self.visible_role(caller, id).await?;
    allow(caller, Action::Role(RoleAction::ViewOne(&role.to_role())))?;
    Ok(role)
  }

  async fn validate_role_input(
    &self,
    caller: &Caller,
    input: &RoleInput,
    except: Option<RoleId>,
  ) -> Result<Vec<crate::permission::Ability>> {
    let mut errors = ValidationErrors::default();
    validate::role_name(&mut errors, "name", &input.name);
    if !errors.has("name") {
      let taken = input.name == PROTECTED_ROLE
        || self
          .store
          .role_exists(&input.name, except, Visibility::for_caller(Some(caller)))
          .await
          .map_err(Error::from_backend)?;
      if taken {
        errors.add("name", "The name has already been taken.");
      }
    }
    let abilities = validate::abilities(&mut errors, &input.permissions);
    errors.into_result()?;
    Ok(abilities)
  }

  pub async fn create_role(&self, caller: &Caller, input: RoleInput) -> Result<RoleView> {
    allow(caller, Action::Role(RoleAction::Create { name: &input.name }))?;
    let abilities = self.validate_role_input(caller, &input, None).await?;

    let role = self
      .store
      .create_role(input.name, abilities, Visibility::for_caller(Some(caller)))
      .await
      .map_err(Error::from_backend)?;
    info!(caller = caller.id, role = role.id, name = %role.name, "role created");

    self
      .record(
        NewActivity::new("role", "created", "role created")
          .subject("role", role.id)
          .causer(caller.id)
          .properties(json!({
            "attributes": { "name": role.name, "permissions": role.permissions },
          })),
      )
      .await;
    Ok(role)
  }

  pub async fn update_role(
    &self,
    caller: &Caller,
    id: RoleId,
    input: RoleInput,
  ) -> Result<RoleView> {
    let existing = self.visible_role(caller, id).await?;
    allow(caller, Action::Role(RoleAction::Update(&existing.to_role())))?;
    let abilities = self.validate_role_input(caller, &input, Some(id)).await?;

    let role = self
      .store
      .update_role(id, input.name, abilities, Visibility::for_caller(Some(caller)))
      .await
      .map_err(Error::from_backend)?;
    info!(caller = caller.id, role = id, "role updated");

    self
      .record(
        NewActivity::new("role", "updated", "role updated")
          .subject("role", id)
          .causer(caller.id)
          .properties(json!({
            "old": { "name": existing.name, "permissions": existing.permissions },
            "attributes": { "name": role.name, "permissions": role.permissions },
          })),
      )
      .await;
    Ok(role)
  }

  pub async fn delete_role(&self, caller: &Caller, id: RoleId) -> Result<RoleView> {
    let existing = self.visible_role(caller, id).await?;
    allow(caller, Action::Role(RoleAction::Delete(&existing.to_role())))?;

    self.store.delete_role(id).await.map_err(Error::from_backend)?;
    info!(caller = caller.id, role = id, "role deleted");

    self
      .record(
        NewActivity::new("role", "deleted", "role deleted")
          .subject("role", id)
          .causer(caller.id)
          .properties(json!({
            "old": { "name": existing.name, "permissions": existing.permissions },
          })),
      )
      .await;
    Ok(existing)
  }

  // ── Permissions and activity ──────────────────────────────────────────

  pub async fn list_permissions(&self, caller: &Caller) -> Result<Vec<PermissionView>> {
    allow(caller, Action::Permission(PermissionAction::ViewList))?;
    self
      .store
      .list_permissions(Visibility::for_caller(Some(caller)))
      .await
      .map_err(Error::from_backend)
  }

  pub async fn list_activity(
    &self,
    caller: &Caller,
    params: &ListParams,
  ) -> Result<Page<ActivityEntry>> {
    allow(caller, Action::ActivityLog(ActivityLogAction::ViewList))?;
    let query =
      ListQuery::parse(params, &query::ACTIVITY_LOGS, self.config.default_per_page);
    debug!(caller = caller.id, ?query, "listing activity");
    self
      .store
      .list_activity(&query, Visibility::for_caller(Some(caller)))
      .await
      .map_err(Error::from_backend)
  }

  pub async fn activity_facets(&self, caller: &Caller) -> Result<ActivityFacets> {
    allow(caller, Action::ActivityLog(ActivityLogAction::ViewList))?;
    self.store.activity_facets().await.map_err(Error::from_backend)
  }

  // ── Invitations ───────────────────────────────────────────────────────

  pub async fn invite(&self, caller: &Caller, input: InviteRequest) -> Result<IssuedInvitation> {
    let visibility = Visibility::for_caller(Some(caller));

    let mut errors = ValidationErrors::default();
    validate::email(&mut errors, "email", &input.email);
    validate::role_name(&mut errors, "role", &input.role);
    let role: Option<Role> = if errors.has("role") {
      None
    } else {
      self
        .store
        .find_role_by_name(&input.role, visibility)
        .await
        .map_err(Error::from_backend)?
    };

    // The unscoped email lookup only runs once the caller may invite.
    match &role {
      Some(role) => {
        allow(caller, Action::User(UserAction::Invite { role }))?;
        if !errors.has("email")
          && self.store.email_in_use(&input.email, None).await.map_err(Error::from_backend)?
        {
          errors.add("email", "The email has already been taken.");
        }
      }
      None if !errors.has("role") => errors.add("role", "The selected role is invalid."),
      None => {}
    }
    errors.into_result()?;
    let Some(role) = role else {
      return Err(Error::invalid("role", "The selected role is invalid."));
    };

    let now = Utc::now();
    let token = InvitationToken::generate();
    let outcome = self
      .store
      .replace_invitation(
        NewInvitation {
          email:      input.email.clone(),
          role_id:    role.id,
          invited_by: Some(caller.id),
          token_hash: token.hash(),
          expires_at: now + self.config.invitation_ttl,
        },
        now,
      )
      .await
      .map_err(Error::from_backend)?;
    let invitation = match outcome {
      ReplaceOutcome::Created(invitation) => invitation,
      ReplaceOutcome::Pending => return Err(InvitationError::Pending.into()),
    };
    info!(caller = caller.id, invitation = invitation.id, role = %role.name, "invitation created");

    let accept_url = format!("{}{}", self.config.accept_url_base, token.as_str());
    let message = MailMessage {
      to:       invitation.email.clone(),
      template: "invitation",
      context:  json!({
        "invitation_id": invitation.id,
        "recipient_email": invitation.email,
        "accept_url": accept_url,
      }),
    };
    if let Err(e) = self.mailer.send(message) {
      warn!(invitation = invitation.id, error = %e, "failed to send invitation mail");
    }

    self
      .record(
        NewActivity::new("invitation", "created", "invitation created")
          .subject("invitation", invitation.id)
          .causer(caller.id)
          .properties(json!({
            "attributes": {
              "email": invitation.email,
              "role": invitation.role,
              "expires_at": invitation.expires_at,
            },
          })),
      )
      .await;

    Ok(IssuedInvitation { invitation, token, accept_url })
  }

  /// Public lookup used to pre-fill the registration form.
  pub async fn show_invitation(&self, token: &str) -> Result<InvitationPreview> {
    let hash = InvitationToken::from(token.to_owned()).hash();
    let invitation = self
      .store
      .find_invitation_by_token_hash(&hash)
      .await
      .map_err(Error::from_backend)?
      .ok_or(Error::NotFound)?;

    match invitation.state_at(Utc::now()) {
      InvitationState::Pending => Ok(InvitationPreview {
        email:      invitation.email,
        role:       invitation.role,
        expires_at: invitation.expires_at,
      }),
      InvitationState::Expired => Err(InvitationError::Expired.into()),
      InvitationState::Accepted => Err(InvitationError::AlreadyAccepted.into()),
    }
  }

  /// Register through an invitation. Public; the token is the credential.
  pub async fn accept_invitation(&self, input: AcceptRequest) -> Result<User> {
    let mut errors = ValidationErrors::default();
    if input.token.trim().is_empty() {
      errors.add("token", "The token field is required.");
    }
    validate::name(&mut errors, "name", &input.name);
    validate::email(&mut errors, "email", &input.email);
    validate::password(&mut errors, &input.password, &input.password_confirmation);
    errors.into_result()?;

    let hash = InvitationToken::from(input.token).hash();
    let invitation = self
      .store
      .find_invitation_by_token_hash(&hash)
      .await
      .map_err(Error::from_backend)?
      .ok_or(Error::NotFound)?;

    let now = Utc::now();
    invitation.check_acceptance(&input.email, now)?;

    if self.store.email_in_use(&input.email, None).await.map_err(Error::from_backend)? {
      return Err(Error::invalid("email", "The email has already been taken."));
    }

    let password_hash = self.hasher.hash(&input.password).map_err(Error::Store)?;
    let new_user = NewUser {
      name: input.name,
      email: input.email,
      password_hash,
      status: UserStatus::Approved,
      role_id: Some(invitation.role_id),
      verified: true,
    };

    let user = match self
      .store
      .accept_invitation(invitation.id, new_user, now)
      .await
      .map_err(Error::from_backend)?
    {
      AcceptOutcome::Accepted(user) => user,
      AcceptOutcome::AlreadyAccepted => {
        return Err(InvitationError::AlreadyAccepted.into());
      }
      AcceptOutcome::Expired => return Err(InvitationError::Expired.into()),
    };
    info!(user = user.id, invitation = invitation.id, "invitation accepted");

    self
      .record(
        NewActivity::new("invitation", "accepted", "invitation accepted")
          .subject("invitation", invitation.id)
          .causer(user.id)
          .properties(json!({
            "attributes": { "user_id": user.id, "email": user.email, "role": user.role },
          })),
      )
      .await;

    Ok(user)
  }
}
