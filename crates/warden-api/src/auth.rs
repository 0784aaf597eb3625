//! HTTP Basic identity provider and the argon2 [`PasswordHasher`].
//!
//! The username half of the credentials is the account email. Only live,
//! approved users authenticate; everything else is a 401.

use argon2::{
  Argon2, PasswordHash, PasswordHasher as _, PasswordVerifier, password_hash::SaltString,
};
use axum::{
  extract::FromRequestParts,
  http::{HeaderMap, header, request::Parts},
};
use base64::{Engine as _, engine::general_purpose::STANDARD as B64};
use rand_core::OsRng;
use tracing::debug;
use warden_core::{
  AdminService, Error as CoreError,
  activity::AuditRecorder,
  identity::{Caller, UserStatus},
  mail::{CollaboratorError, PasswordHasher},
  store::AdminStore,
};

use crate::{AppState, Backend, error::ApiError};

// ─── Hashing ─────────────────────────────────────────────────────────────────

/// argon2id with default parameters, producing PHC strings.
#[derive(Debug, Clone, Copy, Default)]
pub struct Argon2Hasher;

impl PasswordHasher for Argon2Hasher {
  fn hash(&self, password: &str) -> Result<String, CollaboratorError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
      .hash_password(password.as_bytes(), &salt)
      .map(|hash| hash.to_string())
      .map_err(|e| format!("argon2 error: {e}").into())
  }

  fn verify(&self, password: &str, hash: &str) -> bool {
    PasswordHash::new(hash).is_ok_and(|parsed| {
      Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
    })
  }
}

// ─── Basic auth ──────────────────────────────────────────────────────────────

/// Decode `Authorization: Basic base64(email:password)`.
pub fn basic_credentials(headers: &HeaderMap) -> Option<(String, String)> {
  let encoded = headers
    .get(header::AUTHORIZATION)?
    .to_str()
    .ok()?
    .strip_prefix("Basic ")?;
  let decoded = B64.decode(encoded.trim()).ok()?;
  let creds = String::from_utf8(decoded).ok()?;
  let (email, password) = creds.split_once(':')?;
  Some((email.to_owned(), password.to_owned()))
}

/// Resolve `email`/`password` to a fully loaded [`Caller`].
pub async fn authenticate<S, R>(
  service: &AdminService<S, R>,
  email: &str,
  password: &str,
) -> Result<Caller, ApiError>
where
  S: AdminStore,
  R: AuditRecorder,
{
  let credentials = service
    .store()
    .credentials_by_email(email)
    .await
    .map_err(CoreError::from_backend)?
    .filter(|c| c.status == UserStatus::Approved)
    .ok_or(ApiError::Unauthorized)?;

  if !service.hasher().verify(password, &credentials.password_hash) {
    debug!(user = credentials.user_id, "password mismatch");
    return Err(ApiError::Unauthorized);
  }

  service
    .store()
    .load_caller(credentials.user_id)
    .await
    .map_err(CoreError::from_backend)?
    .ok_or(ApiError::Unauthorized)
}

/// The authenticated caller. Present in a handler means the request carried
/// valid credentials.
pub struct CurrentCaller(pub Caller);

impl<S: Backend> FromRequestParts<AppState<S>> for CurrentCaller {
  type Rejection = ApiError;

  async fn from_request_parts(
    parts: &mut Parts,
    state: &AppState<S>,
  ) -> Result<Self, Self::Rejection> {
    let (email, password) =
      basic_credentials(&parts.headers).ok_or(ApiError::Unauthorized)?;
    authenticate(&state.service, &email, &password)
      .await
      .map(CurrentCaller)
  }
}

#[cfg(test)]
mod tests {
  use axum::http::HeaderValue;

  use super::*;

  fn headers(value: &str) -> HeaderMap {
    let mut map = HeaderMap::new();
    map.insert(header::AUTHORIZATION, HeaderValue::from_str(value).unwrap());
    map
  }

  #[test]
  fn hashes_verify() {
    let hash = Argon2Hasher.hash("secret-password").unwrap();
    assert!(hash.starts_with("$argon2"));
    assert!(Argon2Hasher.verify("secret-password", &hash));
    assert!(!Argon2Hasher.verify("wrong", &hash));
    assert!(!Argon2Hasher.verify("secret-password", "not a phc string"));
  }

  #[test]
  fn decodes_basic_header() {
    let value = format!("Basic {}", B64.encode("ada@example.com:pa:ss"));
    assert_eq!(
      basic_credentials(&headers(&value)),
      Some(("ada@example.com".into(), "pa:ss".into()))
    );
  }

  #[test]
  fn rejects_malformed_headers() {
    assert_eq!(basic_credentials(&HeaderMap::new()), None);
    assert_eq!(basic_credentials(&headers("Bearer abc")), None);
    assert_eq!(basic_credentials(&headers("Basic !!!not-base64!!!")), None);
    let no_colon = format!("Basic {}", B64.encode("just-a-user"));
    assert_eq!(basic_credentials(&headers(&no_colon)), None);
  }
}
