//! Permission resolution.
//!
//! [`can`] is a pure decision function over a closed set of actions. It is
//! evaluated in three tiers:
//!
//! 1. absolute rules that nobody can bypass (self-deletion, mutating the
//!    protected role, role actions that do not exist);
//! 2. the protected-role override, which allows anything that survived (1);
//! 3. the action-specific permission rule, defaulting to deny.
//!
//! Callers map `false` to a 403 at the transport boundary. List endpoints
//! also attach the per-row answers ([`UserAbilities`], [`RoleAbilities`]) so
//! clients can tell which row actions to offer.

use serde::Serialize;

use crate::{
  identity::{Caller, PROTECTED_ROLE, Role, RoleView, User, UserId},
  permission::Ability,
};

#[derive(Debug, Clone, Copy)]
pub enum Action<'a> {
  User(UserAction<'a>),
  Role(RoleAction<'a>),
  Permission(PermissionAction),
  ActivityLog(ActivityLogAction),
}

/// Actions on users. Targets are user ids; the visibility scope has already
/// removed anything the caller may not see.
#[derive(Debug, Clone, Copy)]
pub enum UserAction<'a> {
  ViewList,
  View(UserId),
  Update(UserId),
  UpdateMany(&'a [UserId]),
  Delete(UserId),
  DeleteMany(&'a [UserId]),
  Restore(UserId),
  RestoreMany(&'a [UserId]),
  ForceDelete(UserId),
  ForceDeleteMany(&'a [UserId]),
  /// Invite a new user who will be given `role`.
  Invite { role: &'a Role },
}

#[derive(Debug, Clone, Copy)]
pub enum RoleAction<'a> {
  ViewList,
  ViewOne(&'a Role),
  Create { name: &'a str },
  Update(&'a Role),
  Delete(&'a Role),
  Restore(&'a Role),
  ForceDelete(&'a Role),
}

#[derive(Debug, Clone, Copy)]
pub enum PermissionAction {
  ViewList,
}

#[derive(Debug, Clone, Copy)]
pub enum ActivityLogAction {
  ViewList,
}

/// Decide whether `caller` may perform `action`.
pub fn can(caller: &Caller, action: &Action<'_>) -> bool {
  if forbidden_outright(caller, action) {
    return false;
  }
  if caller.is_protected() {
    return true;
  }
  granted(caller, action)
}

/// Rules evaluated before the protected-role override.
fn forbidden_outright(caller: &Caller, action: &Action<'_>) -> bool {
  match action {
    Action::User(UserAction::Delete(target)) => *target == caller.id,
    Action::User(UserAction::DeleteMany(targets)) => targets.contains(&caller.id),
    Action::Role(RoleAction::Create { name }) => *name == PROTECTED_ROLE,
    Action::Role(RoleAction::Update(role) | RoleAction::Delete(role)) => {
      role.is_protected()
    }
    Action::Role(
      RoleAction::ViewOne(_) | RoleAction::Restore(_) | RoleAction::ForceDelete(_),
    ) => true,
    _ => false,
  }
}

fn granted(caller: &Caller, action: &Action<'_>) -> bool {
  match action {
    Action::User(user) => match user {
      UserAction::ViewList => caller.has(Ability::UserRead),
      UserAction::View(_) => false,
      UserAction::Update(_) => caller.has(Ability::UserUpdate),
      UserAction::UpdateMany(targets) => {
        every(targets, |_| caller.has(Ability::UserUpdate))
      }
      UserAction::Delete(target) => {
        *target != caller.id && caller.has(Ability::UserDelete)
      }
      UserAction::DeleteMany(targets) => every(targets, |target| {
        target != caller.id && caller.has(Ability::UserDelete)
      }),
      UserAction::Restore(_) => caller.has(Ability::UserRestore),
      UserAction::RestoreMany(targets) => {
        every(targets, |_| caller.has(Ability::UserRestore))
      }
      UserAction::ForceDelete(_) => caller.has(Ability::UserForceDelete),
      UserAction::ForceDeleteMany(targets) => {
        every(targets, |_| caller.has(Ability::UserForceDelete))
      }
      UserAction::Invite { role } => {
        !role.is_protected() && caller.has(Ability::UserInvite)
      }
    },
    Action::Role(role) => match role {
      RoleAction::ViewList => caller.has(Ability::RoleRead),
      RoleAction::Create { .. } => caller.has(Ability::RoleCreate),
      RoleAction::Update(_) => caller.has(Ability::RoleUpdate),
      RoleAction::Delete(_) => caller.has(Ability::RoleDelete),
      RoleAction::ViewOne(_) | RoleAction::Restore(_) | RoleAction::ForceDelete(_) => {
        false
      }
    },
    Action::Permission(PermissionAction::ViewList) => {
      caller.has(Ability::PermissionRead)
    }
    Action::ActivityLog(ActivityLogAction::ViewList) => {
      caller.has(Ability::ActivityLogRead)
    }
  }
}

/// Per-member AND over a batch. An empty batch authorizes nothing.
fn every(targets: &[UserId], allowed: impl Fn(UserId) -> bool) -> bool {
  !targets.is_empty() && targets.iter().all(|t| allowed(*t))
}

// ─── Row abilities ───────────────────────────────────────────────────────────

/// The caller's abilities on one listed user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UserAbilities {
  pub read:         bool,
  pub update:       bool,
  pub delete:       bool,
  pub restore:      bool,
  pub force_delete: bool,
}

impl UserAbilities {
  pub fn of(caller: &Caller, target: UserId) -> Self {
    let user = |action: UserAction<'static>| can(caller, &Action::User(action));
    Self {
      read:         user(UserAction::View(target)),
      update:       user(UserAction::Update(target)),
      delete:       user(UserAction::Delete(target)),
      restore:      user(UserAction::Restore(target)),
      force_delete: user(UserAction::ForceDelete(target)),
    }
  }
}

/// The caller's abilities on one listed role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RoleAbilities {
  pub read:   bool,
  pub update: bool,
  pub delete: bool,
}

impl RoleAbilities {
  pub fn of(caller: &Caller, role: &Role) -> Self {
    Self {
      read:   can(caller, &Action::Role(RoleAction::ViewOne(role))),
      update: can(caller, &Action::Role(RoleAction::Update(role))),
      delete: can(caller, &Action::Role(RoleAction::Delete(role))),
    }
  }
}

/// A listed row serialised with a `can` object beside its own fields.
#[derive(Debug, Clone, Serialize)]
pub struct Authorized<T, A> {
  #[serde(flatten)]
  pub row: T,
  pub can: A,
}

impl Authorized<User, UserAbilities> {
  pub fn user(caller: &Caller, user: User) -> Self {
    Self { can: UserAbilities::of(caller, user.id), row: user }
  }
}

impl Authorized<RoleView, RoleAbilities> {
  pub fn role(caller: &Caller, role: RoleView) -> Self {
    Self { can: RoleAbilities::of(caller, &role.to_role()), row: role }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::permission::DefaultRole;

  fn editor(id: UserId) -> Caller {
    Caller::new(id, &["editor"], &DefaultRole::Editor.abilities())
  }

  fn admin(id: UserId) -> Caller {
    Caller::new(id, &["admin"], &DefaultRole::Admin.abilities())
  }

  fn root(id: UserId) -> Caller { Caller::new(id, &[PROTECTED_ROLE], &[]) }

  fn role(id: i64, name: &str) -> Role { Role { id, name: name.into() } }

  #[test]
  fn role_with_update_only_can_update_but_not_delete() {
    let u = Caller::new(7, &["reviewer"], &[Ability::UserUpdate]);
    assert!(can(&u, &Action::User(UserAction::Update(3))));
    assert!(!can(&u, &Action::User(UserAction::Delete(3))));
    assert!(!can(&u, &Action::User(UserAction::ViewList)));
  }

  #[test]
  fn nobody_deletes_themselves() {
    for caller in [editor(1), admin(1), root(1)] {
      assert!(!can(&caller, &Action::User(UserAction::Delete(1))));
      assert!(!can(&caller, &Action::User(UserAction::DeleteMany(&[2, 1, 3]))));
      assert!(can(&caller, &Action::User(UserAction::Delete(2))));
    }
  }

  #[test]
  fn bulk_requires_every_member() {
    let e = editor(1);
    assert!(can(&e, &Action::User(UserAction::UpdateMany(&[2, 3]))));
    assert!(can(&e, &Action::User(UserAction::DeleteMany(&[2, 3]))));
    assert!(!can(&e, &Action::User(UserAction::RestoreMany(&[2, 3]))));
    assert!(!can(&e, &Action::User(UserAction::UpdateMany(&[]))));
  }

  #[test]
  fn restore_and_force_delete_need_their_own_permissions() {
    let a = admin(1);
    assert!(can(&a, &Action::User(UserAction::Restore(2))));
    assert!(can(&a, &Action::User(UserAction::ForceDeleteMany(&[2, 3]))));
    let e = editor(1);
    assert!(!can(&e, &Action::User(UserAction::ForceDelete(2))));
  }

  #[test]
  fn protected_override_rescues_missing_permissions() {
    let r = root(1);
    assert!(can(&r, &Action::User(UserAction::ViewList)));
    assert!(can(&r, &Action::User(UserAction::ForceDeleteMany(&[2, 3]))));
    assert!(can(&r, &Action::Role(RoleAction::Create { name: "auditor" })));
    assert!(can(&r, &Action::ActivityLog(ActivityLogAction::ViewList)));
  }

  #[test]
  fn protected_role_is_never_a_mutation_target() {
    let protected = role(1, PROTECTED_ROLE);
    for caller in [admin(5), root(6)] {
      assert!(!can(&caller, &Action::Role(RoleAction::Update(&protected))));
      assert!(!can(&caller, &Action::Role(RoleAction::Delete(&protected))));
      assert!(!can(
        &caller,
        &Action::Role(RoleAction::Create { name: PROTECTED_ROLE })
      ));
    }
    let other = role(2, "editor");
    assert!(can(&admin(5), &Action::Role(RoleAction::Update(&other))));
  }

  #[test]
  fn role_detail_restore_and_force_delete_are_always_denied() {
    let r = role(2, "editor");
    for caller in [admin(5), root(6)] {
      assert!(!can(&caller, &Action::Role(RoleAction::ViewOne(&r))));
      assert!(!can(&caller, &Action::Role(RoleAction::Restore(&r))));
      assert!(!can(&caller, &Action::Role(RoleAction::ForceDelete(&r))));
    }
  }

  #[test]
  fn inviting_into_the_protected_role_needs_the_override() {
    let protected = role(1, PROTECTED_ROLE);
    let plain = role(4, "user");
    assert!(can(&admin(1), &Action::User(UserAction::Invite { role: &plain })));
    assert!(!can(&admin(1), &Action::User(UserAction::Invite { role: &protected })));
    assert!(can(&root(2), &Action::User(UserAction::Invite { role: &protected })));
    assert!(!can(&editor(3), &Action::User(UserAction::Invite { role: &plain })));
  }

  #[test]
  fn row_abilities_follow_the_policy() {
    let a = admin(1);
    let own = UserAbilities::of(&a, 1);
    assert!(own.update);
    assert!(!own.delete);
    assert!(!own.read);
    let other = UserAbilities::of(&a, 2);
    assert_eq!(other, UserAbilities {
      read:         false,
      update:       true,
      delete:       true,
      restore:      true,
      force_delete: true,
    });
    assert!(UserAbilities::of(&root(1), 2).read);
    assert!(!UserAbilities::of(&root(1), 1).delete);

    let e = editor(3);
    let row = UserAbilities::of(&e, 4);
    assert!(row.delete && !row.restore && !row.force_delete);

    assert_eq!(RoleAbilities::of(&a, &role(2, "editor")), RoleAbilities {
      read:   false,
      update: true,
      delete: true,
    });
    let protected = RoleAbilities::of(&root(1), &role(1, PROTECTED_ROLE));
    assert!(!protected.read && !protected.update && !protected.delete);
  }

  #[test]
  fn catalog_and_activity_listing() {
    assert!(can(&admin(1), &Action::Permission(PermissionAction::ViewList)));
    assert!(!can(&editor(1), &Action::Permission(PermissionAction::ViewList)));
    assert!(!can(&editor(1), &Action::ActivityLog(ActivityLogAction::ViewList)));
  }
}
