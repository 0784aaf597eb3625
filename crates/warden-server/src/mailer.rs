//! A [`Mailer`] that writes messages to the log instead of delivering them.

use tracing::info;
use warden_core::mail::{CollaboratorError, MailMessage, Mailer};

pub struct LogMailer;

impl Mailer for LogMailer {
  fn send(&self, message: MailMessage) -> Result<(), CollaboratorError> {
    info!(
      to = %message.to,
      template = message.template,
      context = %message.context,
      "mail queued"
    );
    Ok(())
  }
}
