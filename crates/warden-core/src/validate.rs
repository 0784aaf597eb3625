//! Field rules shared by the user, role and invitation operations.
//!
//! Each rule appends messages to a [`ValidationErrors`] so a request reports
//! every failing field at once.

use crate::{error::ValidationErrors, permission::Ability};

pub const MAX_LEN: usize = 255;
pub const MIN_PASSWORD_LEN: usize = 8;

fn required(errors: &mut ValidationErrors, field: &str, value: &str) -> bool {
  if value.trim().is_empty() {
    errors.add(field, format!("The {field} field is required."));
    return false;
  }
  true
}

fn max_len(errors: &mut ValidationErrors, field: &str, value: &str) {
  if value.chars().count() > MAX_LEN {
    errors.add(field, format!("The {field} may not be greater than {MAX_LEN} characters."));
  }
}

fn lowercase(errors: &mut ValidationErrors, field: &str, value: &str) {
  if value.to_lowercase() != value {
    errors.add(field, format!("The {field} must be lowercase."));
  }
}

pub fn name(errors: &mut ValidationErrors, field: &str, value: &str) {
  if required(errors, field, value) {
    max_len(errors, field, value);
  }
}

/// Required, lowercase, at most 255 characters and shaped like
/// `local@domain.tld`.
pub fn email(errors: &mut ValidationErrors, field: &str, value: &str) {
  if !required(errors, field, value) {
    return;
  }
  lowercase(errors, field, value);
  max_len(errors, field, value);
  if !is_well_formed_email(value) {
    errors.add(field, format!("The {field} must be a valid email address."));
  }
}

fn is_well_formed_email(value: &str) -> bool {
  if value.chars().any(char::is_whitespace) {
    return false;
  }
  let Some((local, domain)) = value.split_once('@') else {
    return false;
  };
  !local.is_empty()
    && !domain.contains('@')
    && domain.split('.').count() >= 2
    && domain.split('.').all(|label| {
      !label.is_empty() && !label.starts_with('-') && !label.ends_with('-')
    })
}

/// Required, lowercase, at most 255 characters.
pub fn role_name(errors: &mut ValidationErrors, field: &str, value: &str) {
  if required(errors, field, value) {
    lowercase(errors, field, value);
    max_len(errors, field, value);
  }
}

/// Parse catalog permission names, recording every unknown one.
pub fn abilities(errors: &mut ValidationErrors, names: &[String]) -> Vec<Ability> {
  let mut out = Vec::with_capacity(names.len());
  for name in names {
    match Ability::parse(name) {
      Some(ability) if !out.contains(&ability) => out.push(ability),
      Some(_) => {}
      None => errors.add("permissions", format!("The permission {name} is invalid.")),
    }
  }
  out
}

pub fn password(errors: &mut ValidationErrors, value: &str, confirmation: &str) {
  if value.is_empty() {
    errors.add("password", "The password field is required.");
    return;
  }
  if value.chars().count() < MIN_PASSWORD_LEN {
    errors.add(
      "password",
      format!("The password must be at least {MIN_PASSWORD_LEN} characters."),
    );
  }
  if value != confirmation {
    errors.add("password", "The password confirmation does not match.");
  }
}
