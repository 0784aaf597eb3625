//! API error type and [`axum::response::IntoResponse`] implementation.

use axum::{
  Json,
  http::{HeaderValue, StatusCode, header},
  response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use tracing::error;
use warden_core::Error as CoreError;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error("unauthenticated")]
  Unauthorized,

  #[error(transparent)]
  Core(#[from] CoreError),
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let core = match self {
      ApiError::Unauthorized => {
        let mut res =
          (StatusCode::UNAUTHORIZED, Json(json!({ "message": "Unauthenticated." })))
            .into_response();
        res.headers_mut().insert(
          header::WWW_AUTHENTICATE,
          HeaderValue::from_static("Basic realm=\"warden\""),
        );
        return res;
      }
      ApiError::Core(e) => e,
    };

    let (status, body) = match &core {
      CoreError::PermissionDenied => {
        (StatusCode::FORBIDDEN, json!({ "message": "This action is unauthorized." }))
      }
      CoreError::NotFound => (StatusCode::NOT_FOUND, json!({ "message": "Not found." })),
      CoreError::ValidationFailed(errors) => (
        StatusCode::UNPROCESSABLE_ENTITY,
        json!({ "message": core.to_string(), "errors": errors }),
      ),
      CoreError::Unprocessable { .. } => {
        (StatusCode::UNPROCESSABLE_ENTITY, json!({ "message": core.to_string() }))
      }
      CoreError::Conflict(_) => (StatusCode::CONFLICT, json!({ "message": core.to_string() })),
      CoreError::IntegrityViolation(detail) => {
        error!(%detail, "integrity violation");
        (
          StatusCode::CONFLICT,
          json!({ "message": "The request conflicts with existing data." }),
        )
      }
      CoreError::Store(e) => {
        error!(error = %e, "store failure");
        (StatusCode::INTERNAL_SERVER_ERROR, json!({ "message": "Server Error" }))
      }
    };
    (status, Json(body)).into_response()
  }
}

pub type Result<T, E = ApiError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
  use super::*;

  fn status_of(e: CoreError) -> StatusCode { ApiError::from(e).into_response().status() }

  #[test]
  fn maps_core_errors_to_statuses() {
    assert_eq!(status_of(CoreError::PermissionDenied), StatusCode::FORBIDDEN);
    assert_eq!(status_of(CoreError::NotFound), StatusCode::NOT_FOUND);
    assert_eq!(status_of(CoreError::invalid("ids", "bad")), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(
      status_of(CoreError::Unprocessable { requested: 3, resolved: 2 }),
      StatusCode::UNPROCESSABLE_ENTITY
    );
    assert_eq!(
      status_of(CoreError::Conflict(warden_core::InvitationError::Expired)),
      StatusCode::CONFLICT
    );
    assert_eq!(status_of(CoreError::IntegrityViolation("x".into())), StatusCode::CONFLICT);
    assert_eq!(
      status_of(CoreError::store(std::io::Error::other("disk"))),
      StatusCode::INTERNAL_SERVER_ERROR
    );
  }

  #[test]
  fn unauthorized_carries_challenge() {
    let res = ApiError::Unauthorized.into_response();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    assert!(res.headers().contains_key(header::WWW_AUTHENTICATE));
  }
}
