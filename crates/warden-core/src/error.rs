//! Error types for `warden-core`.
//!
//! The query interpreter and the policy engine never produce these for
//! expected outcomes; they return empty pages and `false`. Everything here
//! is raised by the bulk coordinator, the invitation lifecycle and the
//! service layer for conditions the caller can correct.

use std::collections::BTreeMap;

use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("this action is unauthorized")]
  PermissionDenied,

  #[error("not found")]
  NotFound,

  #[error("the given data was invalid")]
  ValidationFailed(ValidationErrors),

  #[error("{0}")]
  Conflict(#[from] InvitationError),

  /// The id set of a bulk operation did not resolve to exactly that many
  /// rows in the relevant scope.
  #[error("expected {requested} records, found {resolved}")]
  Unprocessable { requested: usize, resolved: usize },

  #[error("integrity violation: {0}")]
  IntegrityViolation(String),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
  pub fn store(e: impl std::error::Error + Send + Sync + 'static) -> Self {
    Self::Store(Box::new(e))
  }

  /// Lift a store backend's error, as in `.map_err(Error::from_backend)?`.
  pub fn from_backend(e: impl Into<Self>) -> Self { e.into() }

  /// Shorthand for a validation failure on a single field.
  pub fn invalid(field: &str, message: impl Into<String>) -> Self {
    let mut errors = ValidationErrors::default();
    errors.add(field, message);
    Self::ValidationFailed(errors)
  }
}

/// Invitation lifecycle failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum InvitationError {
  #[error("invalid or expired invitation")]
  Expired,

  #[error("invitation has already been used")]
  AlreadyAccepted,

  #[error("the email does not match the invitation")]
  EmailMismatch,

  #[error("an invitation is already pending for this email")]
  Pending,
}

/// Field-level validation messages, keyed by field name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidationErrors(BTreeMap<String, Vec<String>>);

impl ValidationErrors {
  pub fn add(&mut self, field: &str, message: impl Into<String>) {
    self.0.entry(field.to_owned()).or_default().push(message.into());
  }

  pub fn is_empty(&self) -> bool { self.0.is_empty() }

  pub fn has(&self, field: &str) -> bool { self.0.contains_key(field) }

  pub fn get(&self, field: &str) -> Option<&[String]> {
    self.0.get(field).map(Vec::as_slice)
  }

  /// `Ok(())` when nothing was recorded, otherwise the collected errors.
  pub fn into_result(self) -> Result<()> {
    if self.is_empty() {
      Ok(())
    } else {
      Err(Error::ValidationFailed(self))
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
