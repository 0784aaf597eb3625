//! Users, roles, permissions and the authenticated caller.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{EnumString, IntoStaticStr};

use crate::permission::Ability;

pub type UserId = i64;
pub type RoleId = i64;

/// Name of the system-protected role. Its row and its members are hidden
/// from everyone who does not hold it.
pub const PROTECTED_ROLE: &str = "super admin";

// ─── Users ───────────────────────────────────────────────────────────────────

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
  EnumString,
  IntoStaticStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum UserStatus {
  Approved,
  Denied,
  Pending,
}

impl UserStatus {
  pub fn as_str(self) -> &'static str { self.into() }
}

/// A user row as seen by the admin surface. The password hash never leaves
/// the store through this type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
  pub id:                UserId,
  pub name:              String,
  pub email:             String,
  pub status:            UserStatus,
  /// Name of the user's (first) role, if any.
  pub role:              Option<String>,
  pub email_verified_at: Option<DateTime<Utc>>,
  pub created_at:        DateTime<Utc>,
  pub updated_at:        DateTime<Utc>,
  pub deleted_at:        Option<DateTime<Utc>>,
}

impl User {
  pub fn is_trashed(&self) -> bool { self.deleted_at.is_some() }
}

/// Input for creating a user; used by invitation acceptance and bootstrap.
#[derive(Debug, Clone)]
pub struct NewUser {
  pub name:          String,
  pub email:         String,
  pub password_hash: String,
  pub status:        UserStatus,
  pub role_id:       Option<RoleId>,
  pub verified:      bool,
}

/// A full field set applied to one user by an administrator.
#[derive(Debug, Clone, Deserialize)]
pub struct UserUpdate {
  pub name:   String,
  pub email:  String,
  pub role:   String,
  pub status: UserStatus,
}

/// The resolved change handed to the store after validation.
#[derive(Debug, Clone)]
pub struct UserChanges {
  pub name:               String,
  pub email:              String,
  pub status:             UserStatus,
  pub role_id:            RoleId,
  /// Set when the email changed; the store clears `email_verified_at`.
  pub clear_verification: bool,
}

/// What the identity provider needs to authenticate a user.
#[derive(Debug, Clone)]
pub struct Credentials {
  pub user_id:       UserId,
  pub password_hash: String,
  pub status:        UserStatus,
}

// ─── Roles and permissions ───────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
  pub id:   RoleId,
  pub name: String,
}

impl Role {
  pub fn is_protected(&self) -> bool { self.name == PROTECTED_ROLE }
}

/// A role as listed by the admin surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleView {
  pub id:                RoleId,
  pub name:              String,
  pub permissions:       Vec<String>,
  pub users_count:       u64,
  pub permissions_count: u64,
  /// One of the seeded roles.
  pub is_system:         bool,
  pub created_at:        DateTime<Utc>,
  pub updated_at:        DateTime<Utc>,
}

impl RoleView {
  pub fn to_role(&self) -> Role { Role { id: self.id, name: self.name.clone() } }
}

/// Body accepted by role create and update.
#[derive(Debug, Clone, Deserialize)]
pub struct RoleInput {
  pub name:        String,
  #[serde(default)]
  pub permissions: Vec<String>,
}

/// A catalog permission with the roles granting it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PermissionView {
  pub id:          i64,
  pub name:        String,
  pub roles:       Vec<String>,
  pub roles_count: u64,
}

// ─── Caller ──────────────────────────────────────────────────────────────────

/// The authenticated principal of a request, with its permissions resolved
/// from every role it holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
  pub id:        UserId,
  pub name:      String,
  pub email:     String,
  pub roles:     Vec<String>,
  pub abilities: BTreeSet<Ability>,
}

impl Caller {
  pub fn new(id: UserId, roles: &[&str], abilities: &[Ability]) -> Self {
    Self {
      id,
      name: String::new(),
      email: String::new(),
      roles: roles.iter().map(|r| (*r).to_owned()).collect(),
      abilities: abilities.iter().copied().collect(),
    }
  }

  pub fn is_protected(&self) -> bool {
    self.roles.iter().any(|r| r == PROTECTED_ROLE)
  }

  pub fn has(&self, ability: Ability) -> bool { self.abilities.contains(&ability) }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn status_strings() {
    assert_eq!(UserStatus::Approved.as_str(), "approved");
    assert_eq!("pending".parse::<UserStatus>().unwrap(), UserStatus::Pending);
    assert!("Approved".parse::<UserStatus>().is_err());
  }

  #[test]
  fn protected_caller_detection() {
    let admin = Caller::new(1, &["admin"], &[Ability::UserRead]);
    let root = Caller::new(2, &[PROTECTED_ROLE], &[]);
    assert!(!admin.is_protected());
    assert!(root.is_protected());
    assert!(admin.has(Ability::UserRead));
    assert!(!root.has(Ability::UserRead));
  }
}
