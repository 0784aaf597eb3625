//! All-or-nothing mutations over a set of users.
//!
//! The coordinator validates the request, then hands the store a single
//! [`AdminStore::bulk_apply`] call. The store resolves the rows, checks the
//! count, runs the authorization callback and applies the mutation inside
//! one transaction; audit entries are written only after it commits.

use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
  Error, Result,
  activity::{AuditRecorder, NewActivity},
  identity::{Caller, RoleId, User, UserId, UserStatus},
  policy::{self, Action, UserAction},
  query::DeletedScope,
  store::AdminStore,
  visibility::Visibility,
};

// ─── Id sets ─────────────────────────────────────────────────────────────────

/// An ordered, de-duplicated, non-empty set of user ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdSet(Vec<UserId>);

impl IdSet {
  /// Parse a comma-separated list such as `"3,1,3,7"`.
  pub fn parse(csv: &str) -> Result<Self> {
    let mut ids = Vec::new();
    for part in csv.split(',') {
      let id: UserId = part
        .trim()
        .parse()
        .ok()
        .filter(|id| *id > 0)
        .ok_or_else(|| Error::invalid("ids", "The ids must be a comma-separated list of positive integers."))?;
      if !ids.contains(&id) {
        ids.push(id);
      }
    }
    Ok(Self(ids))
  }

  pub fn single(id: UserId) -> Self { Self(vec![id]) }

  pub fn as_slice(&self) -> &[UserId] { &self.0 }

  pub fn len(&self) -> usize { self.0.len() }

  pub fn is_empty(&self) -> bool { self.0.is_empty() }

  pub fn contains(&self, id: UserId) -> bool { self.0.contains(&id) }
}

// ─── Operations ──────────────────────────────────────────────────────────────

/// Fields shared by every member of a bulk update.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BulkUpdate {
  pub role:   Option<String>,
  pub status: Option<UserStatus>,
}

/// A bulk operation as requested at the boundary.
#[derive(Debug, Clone)]
pub enum BulkOperation {
  Update(BulkUpdate),
  Delete,
  Restore,
  ForceDelete,
}

/// A bulk operation with its role reference resolved; what the store applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BulkMutation {
  Update {
    role_id: Option<RoleId>,
    status:  Option<UserStatus>,
  },
  Delete,
  Restore,
  ForceDelete,
}

impl BulkMutation {
  /// Which rows the id set must resolve against.
  pub fn scope(self) -> DeletedScope {
    match self {
      Self::Update { .. } | Self::Delete => DeletedScope::Live,
      Self::Restore | Self::ForceDelete => DeletedScope::Only,
    }
  }

  /// Audit event name.
  pub fn event(self) -> &'static str {
    match self {
      Self::Update { .. } => "updated",
      Self::Delete => "deleted",
      Self::Restore => "restored",
      Self::ForceDelete => "force_deleted",
    }
  }

  /// The policy action covering `ids`: the single form for one id, the
  /// `*_many` form otherwise.
  pub fn action(self, ids: &[UserId]) -> Action<'_> {
    let single = match ids {
      [id] => Some(*id),
      _ => None,
    };
    let action = match (self, single) {
      (Self::Update { .. }, Some(id)) => UserAction::Update(id),
      (Self::Update { .. }, None) => UserAction::UpdateMany(ids),
      (Self::Delete, Some(id)) => UserAction::Delete(id),
      (Self::Delete, None) => UserAction::DeleteMany(ids),
      (Self::Restore, Some(id)) => UserAction::Restore(id),
      (Self::Restore, None) => UserAction::RestoreMany(ids),
      (Self::ForceDelete, Some(id)) => UserAction::ForceDelete(id),
      (Self::ForceDelete, None) => UserAction::ForceDeleteMany(ids),
    };
    Action::User(action)
  }
}

/// What happened inside the store transaction.
#[derive(Debug, Clone, PartialEq)]
pub enum BulkOutcome {
  /// Committed. Carries each row as it was before the mutation.
  Applied(Vec<User>),
  /// Rolled back: the id set did not resolve to exactly that many rows.
  CountMismatch { requested: usize, resolved: usize },
  /// Rolled back: the authorization callback refused the resolved set.
  Denied,
}

/// A committed bulk operation.
#[derive(Debug, Clone)]
pub struct BulkReport {
  pub event:    &'static str,
  pub batch:    Uuid,
  /// Rows as they were before the mutation, in id order.
  pub affected: Vec<User>,
}

// ─── Coordinator ─────────────────────────────────────────────────────────────

pub struct BulkCoordinator<'a, S, R> {
  store: &'a S,
  audit: &'a R,
}

impl<'a, S, R> BulkCoordinator<'a, S, R>
where
  S: AdminStore,
  R: AuditRecorder,
{
  pub fn new(store: &'a S, audit: &'a R) -> Self { Self { store, audit } }

  pub async fn execute(
    &self,
    caller: &Caller,
    ids: &IdSet,
    operation: BulkOperation,
  ) -> Result<BulkReport> {
    if ids.is_empty() {
      return Err(Error::invalid("ids", "The ids field is required."));
    }
    if matches!(operation, BulkOperation::Delete | BulkOperation::ForceDelete)
      && ids.contains(caller.id)
    {
      return Err(Error::PermissionDenied);
    }

    let visibility = Visibility::for_caller(Some(caller));
    let mutation = self.resolve(operation, visibility).await?;

    let authorizer = caller.clone();
    let authorize = move |rows: &[User]| {
      let ids: Vec<UserId> = rows.iter().map(|u| u.id).collect();
      policy::can(&authorizer, &mutation.action(&ids))
    };

    let outcome = self
      .store
      .bulk_apply(visibility, ids, mutation, authorize)
      .await
      .map_err(Error::from_backend)?;

    let affected = match outcome {
      BulkOutcome::Applied(rows) => rows,
      BulkOutcome::CountMismatch { requested, resolved } => {
        return Err(Error::Unprocessable { requested, resolved });
      }
      BulkOutcome::Denied => return Err(Error::PermissionDenied),
    };

    let batch = Uuid::new_v4();
    let event = mutation.event();
    info!(
      caller = caller.id,
      %batch,
      event,
      count = affected.len(),
      "bulk user mutation committed"
    );

    for user in &affected {
      let entry = NewActivity::new("user", event, format!("user {event}"))
        .subject("user", user.id)
        .causer(caller.id)
        .batch(batch)
        .properties(audit_properties(user, mutation));
      if let Err(e) = self.audit.record(entry).await {
        warn!(user = user.id, %batch, error = %e, "failed to record activity");
      }
    }

    Ok(BulkReport { event, batch, affected })
  }

  async fn resolve(
    &self,
    operation: BulkOperation,
    visibility: Visibility,
  ) -> Result<BulkMutation> {
    Ok(match operation {
      BulkOperation::Update(update) => {
        if update.role.is_none() && update.status.is_none() {
          return Err(Error::invalid("update", "Provide a role or a status to apply."));
        }
        let role_id = match update.role.as_deref() {
          Some(name) => {
            let role = self
              .store
              .find_role_by_name(name, visibility)
              .await
              .map_err(Error::from_backend)?
              .ok_or_else(|| Error::invalid("role", "The selected role is invalid."))?;
            Some(role.id)
          }
          None => None,
        };
        BulkMutation::Update { role_id, status: update.status }
      }
      BulkOperation::Delete => BulkMutation::Delete,
      BulkOperation::Restore => BulkMutation::Restore,
      BulkOperation::ForceDelete => BulkMutation::ForceDelete,
    })
  }
}

fn audit_properties(before: &User, mutation: BulkMutation) -> serde_json::Value {
  let old = json!({
    "name": before.name,
    "email": before.email,
    "status": before.status,
    "role": before.role,
  });
  match mutation {
    BulkMutation::Update { role_id, status } => json!({
      "old": old,
      "attributes": {
        "status": status.unwrap_or(before.status),
        "role_id": role_id,
      },
    }),
    _ => json!({ "old": old }),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parse_orders_and_dedups() {
    let ids = IdSet::parse("3, 1,3,7").unwrap();
    assert_eq!(ids.as_slice(), &[3, 1, 7]);
    assert_eq!(ids.len(), 3);
  }

  #[test]
  fn parse_rejects_garbage() {
    for raw in ["", "1,,2", "a,b", "1,-2", "0"] {
      match IdSet::parse(raw) {
        Err(Error::ValidationFailed(errors)) => assert!(errors.has("ids"), "{raw}"),
        other => panic!("{raw}: expected validation failure, got {other:?}"),
      }
    }
  }

  #[test]
  fn scopes_per_mutation() {
    assert_eq!(BulkMutation::Delete.scope(), DeletedScope::Live);
    assert_eq!(
      BulkMutation::Update { role_id: None, status: None }.scope(),
      DeletedScope::Live
    );
    assert_eq!(BulkMutation::Restore.scope(), DeletedScope::Only);
    assert_eq!(BulkMutation::ForceDelete.scope(), DeletedScope::Only);
  }

  #[test]
  fn single_id_uses_single_action() {
    assert!(matches!(
      BulkMutation::Delete.action(&[4]),
      Action::User(UserAction::Delete(4))
    ));
    assert!(matches!(
      BulkMutation::Restore.action(&[4, 5]),
      Action::User(UserAction::RestoreMany(&[4, 5]))
    ));
  }
}
