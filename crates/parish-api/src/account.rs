//! Account handlers: sign-up, sign-in, sign-out and the current session.
//!
//! Only email/password credentials are accepted over HTTP. Federated
//! sign-in ([`Credentials::Federated`]) trusts the caller's provider and
//! subject, so it has no route until an identity-assertion verifier sits in
//! front of it; embedders call [`SessionRegistry::sign_in`] directly.
//!
//! [`SessionRegistry::sign_in`]: crate::sessions::SessionRegistry::sign_in

use axum::{
  Json,
  extract::State,
  http::StatusCode,
  response::IntoResponse,
};
use parish_core::{
  session::SessionState,
  store::{BackendClient, Credentials, SessionToken},
};
use serde::{Deserialize, Serialize};

use crate::{
  AppState,
  auth::Authenticated,
  error::{ApiError, Result},
  sessions::Gate,
};

#[derive(Debug, Deserialize)]
pub struct AccountForm {
  pub email:    String,
  pub password: String,
}

/// Returned by sign-up and sign-in. Clients send `token` back as
/// `Authorization: Bearer <token>`.
#[derive(Debug, Serialize)]
pub struct SessionGrant {
  pub token: SessionToken,
  pub state: SessionState,
}

fn grant<B: BackendClient>(gate: &Gate<B>) -> Result<SessionGrant> {
  let token = gate
    .token()
    .ok_or_else(|| ApiError::Unauthorized("session was not established".into()))?;
  Ok(SessionGrant {
    token,
    state: gate.state(),
  })
}

/// `POST /api/auth/sign-up`
pub async fn sign_up<B: BackendClient>(
  State(state): State<AppState<B>>,
  Json(form): Json<AccountForm>,
) -> Result<impl IntoResponse> {
  let gate = state.sessions.sign_up(&form.email, &form.password).await?;
  Ok((StatusCode::CREATED, Json(grant(&gate)?)))
}

/// `POST /api/auth/sign-in`
pub async fn sign_in<B: BackendClient>(
  State(state): State<AppState<B>>,
  Json(form): Json<AccountForm>,
) -> Result<Json<SessionGrant>> {
  let gate = state
    .sessions
    .sign_in(Credentials::EmailPassword {
      email:    form.email,
      password: form.password,
    })
    .await?;
  Ok(Json(grant(&gate)?))
}

/// `POST /api/auth/sign-out`
pub async fn sign_out<B: BackendClient>(
  State(state): State<AppState<B>>,
  Authenticated(gate): Authenticated<B>,
) -> Result<StatusCode> {
  state.sessions.sign_out(&gate).await?;
  Ok(StatusCode::NO_CONTENT)
}

/// `GET /api/auth/session`
pub async fn session<B: BackendClient>(
  Authenticated(gate): Authenticated<B>,
) -> Json<SessionState> {
  Json(gate.state())
}
