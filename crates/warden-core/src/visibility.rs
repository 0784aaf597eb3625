//! The visibility scope that hides the protected role and its members.
//!
//! A [`Visibility`] is computed from the caller once per request and passed
//! explicitly into every listing, count and existence check on users and
//! roles. Store methods that touch those tables take it as a required
//! argument; there is no unscoped variant.

use serde::Serialize;

use crate::identity::{Caller, PROTECTED_ROLE};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
  /// Exclude the protected role row and every user assigned to it.
  HideProtected,
  /// No exclusion.
  ShowAll,
}

impl Visibility {
  /// Scope for a request. Holders of the protected role see everything;
  /// so does a system context with no caller at all.
  pub fn for_caller(caller: Option<&Caller>) -> Self {
    match caller {
      Some(c) if !c.is_protected() => Self::HideProtected,
      _ => Self::ShowAll,
    }
  }

  /// Unscoped access for internal callers such as the server bootstrap.
  /// Request handlers derive their scope from [`Visibility::for_caller`].
  pub fn system() -> Self { Self::ShowAll }

  pub fn hides_protected(self) -> bool { matches!(self, Self::HideProtected) }

  /// Whether a role with this name is visible.
  pub fn admits_role(self, name: &str) -> bool {
    !self.hides_protected() || name != PROTECTED_ROLE
  }

  /// Whether a user holding these roles is visible.
  pub fn admits_user<'a>(self, roles: impl IntoIterator<Item = &'a str>) -> bool {
    !self.hides_protected() || roles.into_iter().all(|r| r != PROTECTED_ROLE)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn ordinary_caller_is_scoped() {
    let admin = Caller::new(1, &["admin"], &[]);
    let v = Visibility::for_caller(Some(&admin));
    assert_eq!(v, Visibility::HideProtected);
    assert!(!v.admits_role(PROTECTED_ROLE));
    assert!(v.admits_role("admin"));
    assert!(!v.admits_user(["editor", PROTECTED_ROLE]));
    assert!(v.admits_user(["editor"]));
    assert!(v.admits_user(std::iter::empty::<&str>()));
  }

  #[test]
  fn protected_caller_sees_everything() {
    let root = Caller::new(1, &[PROTECTED_ROLE], &[]);
    let v = Visibility::for_caller(Some(&root));
    assert_eq!(v, Visibility::ShowAll);
    assert!(v.admits_role(PROTECTED_ROLE));
    assert!(v.admits_user([PROTECTED_ROLE]));
  }

  #[test]
  fn system_context_is_unscoped() {
    assert_eq!(Visibility::for_caller(None), Visibility::ShowAll);
    assert_eq!(Visibility::system(), Visibility::ShowAll);
  }
}
