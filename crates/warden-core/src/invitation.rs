//! Token-bound invitations and their expiry/acceptance state machine.
//!
//! The plain token is returned once to the inviter and mailed to the
//! invitee; only its SHA-256 digest is stored.

use chrono::{DateTime, Utc};
use rand_core::{OsRng, RngCore as _};
use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};

use crate::{
  error::InvitationError,
  identity::{RoleId, User, UserId},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvitationState {
  Pending,
  Expired,
  Accepted,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invitation {
  pub id:          i64,
  pub email:       String,
  pub role_id:     RoleId,
  pub role:        String,
  pub invited_by:  Option<UserId>,
  pub expires_at:  DateTime<Utc>,
  pub accepted_at: Option<DateTime<Utc>>,
  pub created_at:  DateTime<Utc>,
  pub updated_at:  DateTime<Utc>,
}

impl Invitation {
  pub fn is_expired(&self, now: DateTime<Utc>) -> bool { now > self.expires_at }

  pub fn is_accepted(&self) -> bool { self.accepted_at.is_some() }

  /// Acceptance is terminal and wins over expiry.
  pub fn state_at(&self, now: DateTime<Utc>) -> InvitationState {
    if self.is_accepted() {
      InvitationState::Accepted
    } else if self.is_expired(now) {
      InvitationState::Expired
    } else {
      InvitationState::Pending
    }
  }

  /// Whether this row blocks a new invitation for the same email.
  pub fn is_live(&self, now: DateTime<Utc>) -> bool {
    self.state_at(now) == InvitationState::Pending
  }

  /// Checks run before an acceptance, in order: expiry, prior acceptance,
  /// then the submitted email.
  pub fn check_acceptance(
    &self,
    submitted_email: &str,
    now: DateTime<Utc>,
  ) -> Result<(), InvitationError> {
    if self.is_expired(now) {
      return Err(InvitationError::Expired);
    }
    if self.is_accepted() {
      return Err(InvitationError::AlreadyAccepted);
    }
    if self.email != submitted_email {
      return Err(InvitationError::EmailMismatch);
    }
    Ok(())
  }
}

/// An opaque invitation token in its plain (mailable) form.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InvitationToken(String);

impl InvitationToken {
  const BYTES: usize = 32;

  pub fn generate() -> Self {
    let mut bytes = [0u8; Self::BYTES];
    OsRng.fill_bytes(&mut bytes);
    Self(hex::encode(bytes))
  }

  pub fn as_str(&self) -> &str { &self.0 }

  /// Hex SHA-256 digest, the only form that is persisted.
  pub fn hash(&self) -> String { hex::encode(Sha256::digest(self.0.as_bytes())) }
}

impl From<String> for InvitationToken {
  fn from(value: String) -> Self { Self(value) }
}

impl std::fmt::Debug for InvitationToken {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str("InvitationToken(..)")
  }
}

/// A row to insert.
#[derive(Debug, Clone)]
pub struct NewInvitation {
  pub email:      String,
  pub role_id:    RoleId,
  pub invited_by: Option<UserId>,
  pub token_hash: String,
  pub expires_at: DateTime<Utc>,
}

/// Result of [`AdminStore::replace_invitation`](crate::store::AdminStore::replace_invitation).
#[derive(Debug, Clone, PartialEq)]
pub enum ReplaceOutcome {
  /// Stale rows for the email were removed and the new one inserted.
  Created(Invitation),
  /// A live invitation already exists; nothing changed.
  Pending,
}

/// Result of [`AdminStore::accept_invitation`](crate::store::AdminStore::accept_invitation).
#[derive(Debug, Clone, PartialEq)]
pub enum AcceptOutcome {
  Accepted(User),
  /// The invitation was accepted by a concurrent request; nothing changed.
  AlreadyAccepted,
  /// The invitation expired before the transaction ran; nothing changed.
  Expired,
}

// ─── Request and response bodies ─────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct InviteRequest {
  #[serde(default)]
  pub email: String,
  #[serde(default)]
  pub role:  String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AcceptRequest {
  #[serde(default)]
  pub token:                 String,
  #[serde(default)]
  pub name:                  String,
  #[serde(default)]
  pub email:                 String,
  #[serde(default)]
  pub password:              String,
  #[serde(default)]
  pub password_confirmation: String,
}

/// What an invitee sees before registering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvitationPreview {
  pub email:      String,
  pub role:       String,
  pub expires_at: DateTime<Utc>,
}

/// A freshly created invitation together with its plain token.
#[derive(Debug, Clone, Serialize)]
pub struct IssuedInvitation {
  pub invitation: Invitation,
  pub token:      InvitationToken,
  pub accept_url: String,
}
