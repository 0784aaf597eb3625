//! The static permission catalog and the default role table.
//!
//! Permission names follow `<resource>.<action>`. The catalog is seeded once
//! by the store; nothing on the admin surface creates new permissions.

use serde::{Deserialize, Serialize};
use strum::{EnumIter, EnumString, IntoStaticStr, IntoEnumIterator as _};

use crate::identity::PROTECTED_ROLE;

/// A single grantable permission.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  PartialOrd,
  Ord,
  Hash,
  Serialize,
  Deserialize,
  EnumString,
  EnumIter,
  IntoStaticStr,
)]
pub enum Ability {
  #[serde(rename = "user.read")]
  #[strum(serialize = "user.read")]
  UserRead,
  #[serde(rename = "user.update")]
  #[strum(serialize = "user.update")]
  UserUpdate,
  #[serde(rename = "user.delete")]
  #[strum(serialize = "user.delete")]
  UserDelete,
  #[serde(rename = "user.force_delete")]
  #[strum(serialize = "user.force_delete")]
  UserForceDelete,
  #[serde(rename = "user.restore")]
  #[strum(serialize = "user.restore")]
  UserRestore,
  #[serde(rename = "user.invite")]
  #[strum(serialize = "user.invite")]
  UserInvite,
  #[serde(rename = "role.create")]
  #[strum(serialize = "role.create")]
  RoleCreate,
  #[serde(rename = "role.read")]
  #[strum(serialize = "role.read")]
  RoleRead,
  #[serde(rename = "role.update")]
  #[strum(serialize = "role.update")]
  RoleUpdate,
  #[serde(rename = "role.delete")]
  #[strum(serialize = "role.delete")]
  RoleDelete,
  #[serde(rename = "permission.read")]
  #[strum(serialize = "permission.read")]
  PermissionRead,
  #[serde(rename = "activity_log.read")]
  #[strum(serialize = "activity_log.read")]
  ActivityLogRead,
}

impl Ability {
  pub fn as_str(self) -> &'static str { self.into() }

  /// Every permission in catalog order.
  pub fn all() -> impl Iterator<Item = Self> { Self::iter() }

  /// Parse a stored permission name; unknown names yield `None`.
  pub fn parse(name: &str) -> Option<Self> { name.parse().ok() }
}

impl std::fmt::Display for Ability {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Roles seeded into a fresh store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter)]
pub enum DefaultRole {
  SuperAdmin,
  Admin,
  Editor,
  User,
}

impl DefaultRole {
  pub fn name(self) -> &'static str {
    match self {
      Self::SuperAdmin => PROTECTED_ROLE,
      Self::Admin => "admin",
      Self::Editor => "editor",
      Self::User => "user",
    }
  }

  /// Permissions attached when the role row is first created. The protected
  /// role carries none: it is resolved by the override tier instead.
  pub fn abilities(self) -> Vec<Ability> {
    match self {
      Self::SuperAdmin | Self::User => Vec::new(),
      Self::Admin => Ability::all().collect(),
      Self::Editor => {
        vec![Ability::UserRead, Ability::UserUpdate, Ability::UserDelete]
      }
    }
  }

  pub fn all() -> impl Iterator<Item = Self> { Self::iter() }

  /// Whether `name` is one of the seeded roles.
  pub fn is_default(name: &str) -> bool { Self::all().any(|r| r.name() == name) }
}
