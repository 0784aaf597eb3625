//! Narrow interfaces to collaborators outside the core: outbound mail and
//! password hashing.

use serde_json::Value;

pub type CollaboratorError = Box<dyn std::error::Error + Send + Sync>;

/// A templated message handed to the mailer.
#[derive(Debug, Clone, PartialEq)]
pub struct MailMessage {
  pub to:       String,
  pub template: &'static str,
  pub context:  Value,
}

pub trait Mailer: Send + Sync {
  fn send(&self, message: MailMessage) -> Result<(), CollaboratorError>;
}

pub trait PasswordHasher: Send + Sync {
  /// Produce a PHC string for storage.
  fn hash(&self, password: &str) -> Result<String, CollaboratorError>;

  /// Compare a plain password against a stored PHC string.
  fn verify(&self, password: &str, hash: &str) -> bool;
}
