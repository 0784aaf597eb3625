//! Error type for `warden-store-sqlite`.

use rusqlite::ErrorCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("database error: {0}")]
  Database(tokio_rusqlite::Error),

  /// A UNIQUE or foreign-key constraint rejected a write.
  #[error("constraint violation: {0}")]
  Integrity(String),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  /// A column held a value outside its domain (e.g. an unknown status).
  #[error("invalid stored value: {0}")]
  Decode(String),

  /// A row written inside this call could not be read back.
  #[error("row vanished: {0}")]
  Missing(&'static str),
}

impl From<tokio_rusqlite::Error> for Error {
  fn from(e: tokio_rusqlite::Error) -> Self {
    match e {
      tokio_rusqlite::Error::Rusqlite(rusqlite::Error::SqliteFailure(failure, message))
        if failure.code == ErrorCode::ConstraintViolation =>
      {
        Self::Integrity(message.unwrap_or_else(|| failure.to_string()))
      }
      e => Self::Database(e),
    }
  }
}

impl From<rusqlite::Error> for Error {
  fn from(e: rusqlite::Error) -> Self { tokio_rusqlite::Error::Rusqlite(e).into() }
}

impl From<Error> for warden_core::Error {
  fn from(e: Error) -> Self {
    match e {
      Error::Integrity(message) => Self::IntegrityViolation(message),
      e => Self::store(e),
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn unique_failures_become_integrity_violations() {
    let conn = rusqlite::Connection::open_in_memory().unwrap();
    conn
      .execute_batch("CREATE TABLE t (v TEXT UNIQUE); INSERT INTO t VALUES ('a');")
      .unwrap();
    let err = conn.execute("INSERT INTO t VALUES ('a')", []).unwrap_err();
    let err = Error::from(err);
    assert!(matches!(err, Error::Integrity(_)), "{err:?}");
    assert!(matches!(
      warden_core::Error::from(err),
      warden_core::Error::IntegrityViolation(_)
    ));
  }
}
