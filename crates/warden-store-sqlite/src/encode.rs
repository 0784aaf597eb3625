//! Encoding and decoding helpers between domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are fixed-width RFC 3339 strings (`2024-01-02T03:04:05.000006Z`).
//! Row structs (`Raw*`) mirror the SELECT lists in `query.rs` and are decoded
//! into domain types outside the connection thread where possible.

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::Row;
use uuid::Uuid;
use warden_core::{
  activity::ActivityEntry,
  identity::{PermissionView, RoleView, User, UserStatus},
  invitation::Invitation,
  permission::DefaultRole,
};

use crate::{Error, Result};

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

pub fn decode_opt_dt(s: Option<&str>) -> Result<Option<DateTime<Utc>>> {
  s.map(decode_dt).transpose()
}

// ─── UserStatus ──────────────────────────────────────────────────────────────

pub fn encode_status(status: UserStatus) -> &'static str { status.as_str() }

pub fn decode_status(s: &str) -> Result<UserStatus> {
  s.parse()
    .map_err(|_| Error::Decode(format!("unknown user status: {s:?}")))
}

/// Split a `group_concat` column into sorted names.
fn decode_names(s: Option<String>) -> Vec<String> {
  let mut names: Vec<String> = s
    .map(|s| s.split(',').map(str::to_owned).collect())
    .unwrap_or_default();
  names.sort();
  names
}

// ─── Users ───────────────────────────────────────────────────────────────────

pub struct RawUser {
  pub id:                i64,
  pub name:              String,
  pub email:             String,
  pub status:            String,
  pub role:              Option<String>,
  pub email_verified_at: Option<String>,
  pub created_at:        String,
  pub updated_at:        String,
  pub deleted_at:        Option<String>,
}

impl RawUser {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:                row.get(0)?,
      name:              row.get(1)?,
      email:             row.get(2)?,
      status:            row.get(3)?,
      role:              row.get(4)?,
      email_verified_at: row.get(5)?,
      created_at:        row.get(6)?,
      updated_at:        row.get(7)?,
      deleted_at:        row.get(8)?,
    })
  }

  pub fn into_user(self) -> Result<User> {
    Ok(User {
      id:                self.id,
      name:              self.name,
      email:             self.email,
      status:            decode_status(&self.status)?,
      role:              self.role,
      email_verified_at: decode_opt_dt(self.email_verified_at.as_deref())?,
      created_at:        decode_dt(&self.created_at)?,
      updated_at:        decode_dt(&self.updated_at)?,
      deleted_at:        decode_opt_dt(self.deleted_at.as_deref())?,
    })
  }
}

// ─── Roles and permissions ───────────────────────────────────────────────────

pub struct RawRoleView {
  pub id:                i64,
  pub name:              String,
  pub permissions:       Option<String>,
  pub users_count:       i64,
  pub permissions_count: i64,
  pub created_at:        String,
  pub updated_at:        String,
}

impl RawRoleView {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:                row.get(0)?,
      name:              row.get(1)?,
      permissions:       row.get(2)?,
      users_count:       row.get(3)?,
      permissions_count: row.get(4)?,
      created_at:        row.get(5)?,
      updated_at:        row.get(6)?,
    })
  }

  pub fn into_view(self) -> Result<RoleView> {
    Ok(RoleView {
      is_system:         DefaultRole::is_default(&self.name),
      id:                self.id,
      name:              self.name,
      permissions:       decode_names(self.permissions),
      users_count:       self.users_count.max(0) as u64,
      permissions_count: self.permissions_count.max(0) as u64,
      created_at:        decode_dt(&self.created_at)?,
      updated_at:        decode_dt(&self.updated_at)?,
    })
  }
}

pub struct RawPermission {
  pub id:    i64,
  pub name:  String,
  pub roles: Option<String>,
}

impl RawPermission {
  pub fn into_view(self) -> PermissionView {
    let roles = decode_names(self.roles);
    PermissionView {
      id: self.id,
      name: self.name,
      roles_count: roles.len() as u64,
      roles,
    }
  }
}

// ─── Activity ────────────────────────────────────────────────────────────────

pub struct RawActivity {
  pub id:           i64,
  pub log_name:     String,
  pub description:  String,
  pub event:        Option<String>,
  pub subject_type: Option<String>,
  pub subject_id:   Option<i64>,
  pub causer_id:    Option<i64>,
  pub causer_name:  Option<String>,
  pub causer_email: Option<String>,
  pub properties:   String,
  pub batch_uuid:   Option<String>,
  pub created_at:   String,
  pub updated_at:   String,
}

impl RawActivity {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:           row.get(0)?,
      log_name:     row.get(1)?,
      description:  row.get(2)?,
      event:        row.get(3)?,
      subject_type: row.get(4)?,
      subject_id:   row.get(5)?,
      causer_id:    row.get(6)?,
      causer_name:  row.get(7)?,
      causer_email: row.get(8)?,
      properties:   row.get(9)?,
      batch_uuid:   row.get(10)?,
      created_at:   row.get(11)?,
      updated_at:   row.get(12)?,
    })
  }

  pub fn into_entry(self) -> Result<ActivityEntry> {
    Ok(ActivityEntry {
      id:           self.id,
      log_name:     self.log_name,
      description:  self.description,
      event:        self.event,
      subject_type: self.subject_type,
      subject_id:   self.subject_id,
      causer_id:    self.causer_id,
      causer_name:  self.causer_name,
      causer_email: self.causer_email,
      properties:   serde_json::from_str(&self.properties)?,
      batch_uuid:   self.batch_uuid.as_deref().map(Uuid::parse_str).transpose()?,
      created_at:   decode_dt(&self.created_at)?,
      updated_at:   decode_dt(&self.updated_at)?,
    })
  }
}

// ─── Invitations ─────────────────────────────────────────────────────────────

pub struct RawInvitation {
  pub id:          i64,
  pub email:       String,
  pub role_id:     i64,
  pub role:        String,
  pub invited_by:  Option<i64>,
  pub expires_at:  String,
  pub accepted_at: Option<String>,
  pub created_at:  String,
  pub updated_at:  String,
}

impl RawInvitation {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:          row.get(0)?,
      email:       row.get(1)?,
      role_id:     row.get(2)?,
      role:        row.get(3)?,
      invited_by:  row.get(4)?,
      expires_at:  row.get(5)?,
      accepted_at: row.get(6)?,
      created_at:  row.get(7)?,
      updated_at:  row.get(8)?,
    })
  }

  pub fn into_invitation(self) -> Result<Invitation> {
    Ok(Invitation {
      id:          self.id,
      email:       self.email,
      role_id:     self.role_id,
      role:        self.role,
      invited_by:  self.invited_by,
      expires_at:  decode_dt(&self.expires_at)?,
      accepted_at: decode_opt_dt(self.accepted_at.as_deref())?,
      created_at:  decode_dt(&self.created_at)?,
      updated_at:  decode_dt(&self.updated_at)?,
    })
  }
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone as _;

  use super::*;

  #[test]
  fn timestamps_are_fixed_width_and_sortable() {
    let a = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
    let b = a + chrono::Duration::microseconds(6);
    assert_eq!(encode_dt(a), "2024-01-02T03:04:05.000000Z");
    assert_eq!(encode_dt(b), "2024-01-02T03:04:05.000006Z");
    assert!(encode_dt(a) < encode_dt(b));
    assert_eq!(decode_dt(&encode_dt(b)).unwrap(), b);
  }

  #[test]
  fn unknown_status_is_a_decode_error() {
    assert!(matches!(decode_status("banned"), Err(Error::Decode(_))));
    assert_eq!(decode_status("denied").unwrap(), UserStatus::Denied);
  }
}
