//! The audit trail: entries written after committed mutations and the read
//! model listed by the activity-log endpoints.

use std::future::Future;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::identity::UserId;

/// A stored activity entry joined with its causer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityEntry {
  pub id:           i64,
  pub log_name:     String,
  pub description:  String,
  pub event:        Option<String>,
  pub subject_type: Option<String>,
  pub subject_id:   Option<i64>,
  pub causer_id:    Option<UserId>,
  /// `None` when there was no causer or it has since been hard-deleted.
  pub causer_name:  Option<String>,
  pub causer_email: Option<String>,
  pub properties:   Value,
  /// Shared by every entry written by one bulk operation.
  pub batch_uuid:   Option<Uuid>,
  pub created_at:   DateTime<Utc>,
  pub updated_at:   DateTime<Utc>,
}

/// An entry to be recorded.
#[derive(Debug, Clone, PartialEq)]
pub struct NewActivity {
  pub log_name:     String,
  pub event:        String,
  pub description:  String,
  pub subject_type: Option<String>,
  pub subject_id:   Option<i64>,
  pub causer_id:    Option<UserId>,
  pub properties:   Value,
  pub batch_uuid:   Option<Uuid>,
}

impl NewActivity {
  pub fn new(
    log_name: impl Into<String>,
    event: impl Into<String>,
    description: impl Into<String>,
  ) -> Self {
    Self {
      log_name:     log_name.into(),
      event:        event.into(),
      description:  description.into(),
      subject_type: None,
      subject_id:   None,
      causer_id:    None,
      properties:   Value::Object(Default::default()),
      batch_uuid:   None,
    }
  }

  pub fn subject(mut self, kind: impl Into<String>, id: i64) -> Self {
    self.subject_type = Some(kind.into());
    self.subject_id = Some(id);
    self
  }

  pub fn causer(mut self, id: UserId) -> Self {
    self.causer_id = Some(id);
    self
  }

  pub fn properties(mut self, properties: Value) -> Self {
    self.properties = properties;
    self
  }

  pub fn batch(mut self, batch: Uuid) -> Self {
    self.batch_uuid = Some(batch);
    self
  }
}

/// Distinct values offered as filter options on the activity log.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityFacets {
  pub events:    Vec<String>,
  pub log_names: Vec<String>,
}

/// Writes audit entries. Called explicitly by the service layer after a
/// mutation commits; a failure here never undoes the mutation.
pub trait AuditRecorder: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  fn record(
    &self,
    entry: NewActivity,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn builder_fills_references() {
    let batch = Uuid::new_v4();
    let entry = NewActivity::new("user", "deleted", "user deleted")
      .subject("user", 4)
      .causer(1)
      .batch(batch);
    assert_eq!(entry.subject_type.as_deref(), Some("user"));
    assert_eq!(entry.subject_id, Some(4));
    assert_eq!(entry.causer_id, Some(1));
    assert_eq!(entry.batch_uuid, Some(batch));
    assert!(entry.properties.as_object().is_some_and(|o| o.is_empty()));
  }
}
