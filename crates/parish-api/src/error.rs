//! API error type and [`axum::response::IntoResponse`] implementation.

use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use parish_core::error::BoxError;
use serde_json::json;
use thiserror::Error;

/// Shown for every backend failure; details go to the log only.
const GENERIC_FAILURE: &str = "Something went wrong. Please try again.";

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error("bad request: {0}")]
  BadRequest(String),

  #[error("unauthorized: {0}")]
  Unauthorized(String),

  #[error("forbidden: {0}")]
  Forbidden(String),

  #[error("not found: {0}")]
  NotFound(String),

  #[error("conflict: {0}")]
  Conflict(String),

  #[error("backend error: {0}")]
  Backend(#[source] BoxError),
}

impl ApiError {
  pub fn backend<E>(err: E) -> Self
  where
    E: std::error::Error + Send + Sync + 'static,
  {
    Self::Backend(Box::new(err))
  }
}

impl From<parish_core::Error> for ApiError {
  fn from(err: parish_core::Error) -> Self {
    use parish_core::Error as E;
    match err {
      e if e.is_validation() => Self::BadRequest(e.to_string()),
      e @ (E::NotAuthenticated | E::InvalidCredentials) => {
        Self::Unauthorized(e.to_string())
      }
      e @ E::NotPrivileged => Self::Forbidden(e.to_string()),
      e @ E::EmailTaken(_) => Self::Conflict(e.to_string()),
      E::Backend(inner) => Self::Backend(inner),
      e => Self::backend(e),
    }
  }
}

impl From<parish_media::Error> for ApiError {
  fn from(err: parish_media::Error) -> Self {
    if err.is_validation() {
      Self::BadRequest(err.to_string())
    } else {
      Self::backend(err)
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let (status, message) = match self {
      ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m),
      ApiError::Unauthorized(m) => (StatusCode::UNAUTHORIZED, m),
      ApiError::Forbidden(m) => (StatusCode::FORBIDDEN, m),
      ApiError::NotFound(m) => (StatusCode::NOT_FOUND, m),
      ApiError::Conflict(m) => (StatusCode::CONFLICT, m),
      ApiError::Backend(e) => {
        tracing::error!(error = %e, "backend call failed");
        (StatusCode::INTERNAL_SERVER_ERROR, GENERIC_FAILURE.to_owned())
      }
    };
    (status, Json(json!({ "error": message }))).into_response()
  }
}

pub type Result<T, E = ApiError> = std::result::Result<T, E>;
