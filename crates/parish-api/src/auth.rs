//! Bearer-token extractors.
//!
//! [`Authenticated`] resolves the caller's session gate. [`Privileged`] adds
//! the gate's synchronous privilege check, which is enough for reads.
//! Mutating handlers must still call [`Gate::authorize_mutation`] before
//! touching the backend.

use std::sync::Arc;

use axum::{
  extract::FromRequestParts,
  http::{HeaderMap, header, request::Parts},
};
use parish_core::store::{BackendClient, Principal, SessionToken};

use crate::{AppState, error::ApiError, sessions::Gate};

/// Pull the token out of `Authorization: Bearer <token>`.
pub fn bearer_token(headers: &HeaderMap) -> Option<SessionToken> {
  let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
  let (scheme, token) = value.split_once(' ')?;
  let token = token.trim();
  (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty())
    .then(|| SessionToken(token.to_owned()))
}

/// A signed-in caller.
pub struct Authenticated<B: BackendClient>(pub Arc<Gate<B>>);

impl<B: BackendClient> FromRequestParts<AppState<B>> for Authenticated<B> {
  type Rejection = ApiError;

  async fn from_request_parts(
    parts: &mut Parts,
    state: &AppState<B>,
  ) -> Result<Self, Self::Rejection> {
    let token = bearer_token(&parts.headers).ok_or_else(|| {
      ApiError::Unauthorized("a bearer session token is required".into())
    })?;
    let gate = state.sessions.resolve(token).await?;
    Ok(Self(gate))
  }
}

/// A signed-in caller whose session currently holds admin privilege.
pub struct Privileged<B: BackendClient> {
  pub gate:      Arc<Gate<B>>,
  pub principal: Principal,
}

impl<B: BackendClient> FromRequestParts<AppState<B>> for Privileged<B> {
  type Rejection = ApiError;

  async fn from_request_parts(
    parts: &mut Parts,
    state: &AppState<B>,
  ) -> Result<Self, Self::Rejection> {
    let Authenticated(gate) =
      Authenticated::from_request_parts(parts, state).await?;
    let principal = gate.require_privileged()?;
    Ok(Self { gate, principal })
  }
}

#[cfg(test)]
mod tests {
  use axum::http::HeaderValue;

  use super::*;

  fn headers(value: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(header::AUTHORIZATION, HeaderValue::from_str(value).unwrap());
    headers
  }

  #[test]
  fn bearer_tokens_are_extracted() {
    assert_eq!(
      bearer_token(&headers("Bearer abc123")),
      Some(SessionToken("abc123".into()))
    );
    assert_eq!(
      bearer_token(&headers("bearer  abc123 ")),
      Some(SessionToken("abc123".into()))
    );
  }

  #[test]
  fn other_schemes_are_ignored() {
    assert_eq!(bearer_token(&headers("Basic dXNlcjpwYXNz")), None);
    assert_eq!(bearer_token(&headers("Bearer ")), None);
    assert_eq!(bearer_token(&HeaderMap::new()), None);
  }
}
