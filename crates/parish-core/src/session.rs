//! The identity/role gate.
//!
//! A [`SessionGate`] tracks one session through
//! `Unknown → Resolving → {Anonymous, Authenticated}` and, once
//! authenticated, resolves privilege from the identity's role record in
//! `users/{uid}`. The gate is the only writer of its [`SessionState`]; any
//! number of readers may take snapshots or watch for changes.
//!
//! The privilege flag held here is a convenience for callers. Mutations go
//! through [`SessionGate::authorize_mutation`], which re-reads the role
//! record every time.

use std::sync::{Arc, Mutex};

use chrono::Utc;
use serde::Serialize;
use tokio::{
  sync::{broadcast, watch},
  task::JoinHandle,
};

use crate::{
  Error, Result,
  record::{Record, UserRole, timestamp},
  store::{
    Credentials, DocumentStore, IdentityChange, IdentityProvider, Principal,
    SessionToken,
  },
};

// ─── State ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum Phase {
  Unknown,
  Resolving,
  Anonymous,
  Authenticated { principal: Principal },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Privilege {
  #[default]
  Unprivileged,
  Privileged,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionState {
  #[serde(flatten)]
  pub phase:     Phase,
  pub privilege: Privilege,
}

impl SessionState {
  fn with_phase(phase: Phase) -> Self {
    Self {
      phase,
      privilege: Privilege::Unprivileged,
    }
  }

  pub fn principal(&self) -> Option<&Principal> {
    match &self.phase {
      Phase::Authenticated { principal } => Some(principal),
      _ => None,
    }
  }

  pub fn is_privileged(&self) -> bool {
    self.privilege == Privilege::Privileged
  }
}

// ─── Account validation ─────────────────────────────────────────────────────

pub const MIN_PASSWORD_LEN: usize = 6;

/// Shape check for a new password account: `local@domain.tld` and a
/// password of at least [`MIN_PASSWORD_LEN`] characters.
pub fn validate_new_account(email: &str, password: &str) -> Result<()> {
  let email = email.trim();
  let well_formed = email
    .split_once('@')
    .is_some_and(|(local, domain)| {
      !local.is_empty()
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && domain.contains('.')
    })
    && !email.chars().any(char::is_whitespace);
  if !well_formed {
    return Err(Error::InvalidEmail(email.to_owned()));
  }
  if password.chars().count() < MIN_PASSWORD_LEN {
    return Err(Error::WeakPassword(MIN_PASSWORD_LEN));
  }
  Ok(())
}

// ─── Role lookup ─────────────────────────────────────────────────────────────

/// Read the role record for `uid`. No record means unprivileged.
pub async fn read_privilege<D: DocumentStore>(
  docs: &D,
  uid: &str,
) -> Result<Privilege> {
  let role = docs
    .get(UserRole::COLLECTION, uid)
    .await
    .map_err(Error::backend)?
    .map(UserRole::from_document)
    .transpose()?;
  Ok(match role {
    Some(role) if role.is_admin => Privilege::Privileged,
    _ => Privilege::Unprivileged,
  })
}

/// Like [`read_privilege`], but a failed read resolves to unprivileged.
pub async fn resolve_privilege<D: DocumentStore>(
  docs: &D,
  uid: &str,
) -> Privilege {
  match read_privilege(docs, uid).await {
    Ok(privilege) => privilege,
    Err(err) => {
      tracing::warn!(%uid, error = %err, "failed to read role record");
      Privilege::Unprivileged
    }
  }
}

/// Create a password account and mark it as an admin.
///
/// Roles are only ever granted out of band; nothing reachable over HTTP
/// writes `isAdmin`.
pub async fn provision_admin<I, D>(
  identity: &I,
  docs: &D,
  email: &str,
  password: &str,
) -> Result<Principal>
where
  I: IdentityProvider,
  D: DocumentStore,
{
  validate_new_account(email, password)?;
  let session = identity
    .sign_up(email.trim(), password)
    .await
    .map_err(Error::backend)?
    .ok_or_else(|| Error::EmailTaken(email.trim().to_owned()))?;
  let uid = session.principal.uid.clone();

  let role = UserRole {
    id:         uid.clone(),
    email:      Some(email.trim().to_owned()),
    is_admin:   true,
    created_at: Some(timestamp::format(Utc::now())),
  };
  docs
    .set(UserRole::COLLECTION, &uid, role.to_data()?)
    .await
    .map_err(Error::backend)?;

  identity
    .sign_out(&session.token)
    .await
    .map_err(Error::backend)?;

  tracing::info!(%uid, %email, "provisioned admin account");
  Ok(session.principal)
}

// ─── Gate ────────────────────────────────────────────────────────────────────

struct GateInner<I, D> {
  identity: Arc<I>,
  docs:     Arc<D>,
  state:    watch::Sender<SessionState>,
  token:    Mutex<Option<SessionToken>>,
}

impl<I, D> GateInner<I, D>
where
  I: IdentityProvider,
  D: DocumentStore,
{
  fn token(&self) -> Option<SessionToken> {
    self.token.lock().map(|t| t.clone()).unwrap_or_default()
  }

  fn set_token(&self, token: Option<SessionToken>) {
    if let Ok(mut slot) = self.token.lock() {
      *slot = token;
    }
  }

  fn publish(&self, state: SessionState) { self.state.send_replace(state); }

  /// Forget the token and publish `Anonymous` under the token lock, so no
  /// in-flight authentication can publish over it.
  fn clear(&self) -> SessionState {
    let mut slot = self.token.lock().ok();
    if let Some(slot) = slot.as_mut() {
      **slot = None;
    }
    self.anonymous()
  }

  /// Resolve privilege for `principal` and publish the result, but only if
  /// `token` is still this gate's session once the role read completes.
  /// Otherwise the current state is returned unchanged.
  async fn authenticate(
    &self,
    token: &SessionToken,
    principal: Principal,
  ) -> SessionState {
    let privilege = resolve_privilege(self.docs.as_ref(), &principal.uid).await;
    let state = SessionState {
      phase: Phase::Authenticated { principal },
      privilege,
    };
    let current = match self.token.lock() {
      Ok(slot) if slot.as_ref() == Some(token) => {
        self.state.send_replace(state.clone());
        true
      }
      _ => false,
    };
    if current {
      state
    } else {
      tracing::debug!("session changed during role lookup; result dropped");
      self.state.borrow().clone()
    }
  }

  fn anonymous(&self) -> SessionState {
    let state = SessionState::with_phase(Phase::Anonymous);
    self.publish(state.clone());
    state
  }

  /// Re-resolve the session from the identity provider.
  async fn refresh(&self) -> Result<SessionState> {
    let Some(token) = self.token() else {
      return Ok(self.anonymous());
    };
    self.publish(SessionState::with_phase(Phase::Resolving));
    match self.identity.current(&token).await {
      Ok(Some(principal)) => Ok(self.authenticate(&token, principal).await),
      Ok(None) => Ok(self.clear()),
      Err(err) => {
        self.anonymous();
        Err(Error::backend(err))
      }
    }
  }

  async fn on_change(&self, change: IdentityChange) {
    let mine = self.token();
    match change {
      IdentityChange::SignedOut { token } if Some(&token) == mine.as_ref() => {
        self.clear();
      }
      IdentityChange::SignedIn { token, principal }
        if Some(&token) == mine.as_ref() =>
      {
        self.authenticate(&token, principal).await;
      }
      _ => {}
    }
  }
}

/// Session state holder for one client session.
pub struct SessionGate<I, D> {
  inner:    Arc<GateInner<I, D>>,
  listener: Mutex<Option<JoinHandle<()>>>,
}

impl<I, D> SessionGate<I, D>
where
  I: IdentityProvider + 'static,
  D: DocumentStore + 'static,
{
  pub fn new(identity: Arc<I>, docs: Arc<D>) -> Self {
    let (state, _) =
      watch::channel(SessionState::with_phase(Phase::Unknown));
    Self {
      inner:    Arc::new(GateInner {
        identity,
        docs,
        state,
        token: Mutex::new(None),
      }),
      listener: Mutex::new(None),
    }
  }

  /// Subscribe to identity changes and resolve the initial state.
  ///
  /// Calling `start` on a running gate only re-resolves the state.
  pub async fn start(&self) -> Result<SessionState> {
    self.listen();
    self.inner.refresh().await
  }

  /// Subscribe to identity changes without re-resolving. A no-op while the
  /// listener is running.
  pub fn listen(&self) {
    let Ok(mut slot) = self.listener.lock() else {
      return;
    };
    if slot.as_ref().is_some_and(|handle| !handle.is_finished()) {
      return;
    }
    let mut changes = self.inner.identity.subscribe();
    let inner = Arc::clone(&self.inner);
    *slot = Some(tokio::spawn(async move {
      loop {
        match changes.recv().await {
          Ok(change) => inner.on_change(change).await,
          Err(broadcast::error::RecvError::Lagged(skipped)) => {
            tracing::warn!(skipped, "identity listener lagged; re-resolving");
            if let Err(err) = inner.refresh().await {
              tracing::warn!(error = %err, "failed to re-resolve session");
            }
          }
          Err(broadcast::error::RecvError::Closed) => break,
        }
      }
    }));
  }

  /// Stop listening for identity changes. The last state stays readable.
  pub fn shutdown(&self) {
    if let Ok(mut slot) = self.listener.lock()
      && let Some(handle) = slot.take()
    {
      handle.abort();
    }
  }

  /// Adopt an existing session token and resolve it.
  pub async fn resume(&self, token: SessionToken) -> Result<SessionState> {
    self.inner.set_token(Some(token));
    self.inner.refresh().await
  }

  pub async fn sign_in(&self, credentials: Credentials) -> Result<SessionState> {
    self
      .inner
      .publish(SessionState::with_phase(Phase::Resolving));
    match self.inner.identity.sign_in(credentials).await {
      Ok(Some(session)) => {
        self.inner.set_token(Some(session.token.clone()));
        Ok(
          self
            .inner
            .authenticate(&session.token, session.principal)
            .await,
        )
      }
      Ok(None) => {
        self.inner.clear();
        Err(Error::InvalidCredentials)
      }
      Err(err) => {
        self.inner.clear();
        Err(Error::backend(err))
      }
    }
  }

  pub async fn sign_up(
    &self,
    email: &str,
    password: &str,
  ) -> Result<SessionState> {
    validate_new_account(email, password)?;
    self
      .inner
      .publish(SessionState::with_phase(Phase::Resolving));
    match self.inner.identity.sign_up(email.trim(), password).await {
      Ok(Some(session)) => {
        self.inner.set_token(Some(session.token.clone()));
        Ok(
          self
            .inner
            .authenticate(&session.token, session.principal)
            .await,
        )
      }
      Ok(None) => {
        self.inner.clear();
        Err(Error::EmailTaken(email.trim().to_owned()))
      }
      Err(err) => {
        self.inner.clear();
        Err(Error::backend(err))
      }
    }
  }

  /// Drop to `Anonymous`/`Unprivileged` first, then end the session with
  /// the provider. The local downgrade holds even if the provider call
  /// fails.
  pub async fn sign_out(&self) -> Result<()> {
    let token = self.inner.token();
    self.inner.clear();
    if let Some(token) = token {
      self
        .inner
        .identity
        .sign_out(&token)
        .await
        .map_err(Error::backend)?;
    }
    Ok(())
  }

  pub fn state(&self) -> SessionState { self.inner.state.borrow().clone() }

  /// A receiver that observes every state the gate publishes.
  pub fn watch(&self) -> watch::Receiver<SessionState> {
    self.inner.state.subscribe()
  }

  pub fn token(&self) -> Option<SessionToken> { self.inner.token() }

  /// Synchronous check against the current state.
  pub fn require_privileged(&self) -> Result<Principal> {
    let state = self.inner.state.borrow();
    let principal = state.principal().ok_or(Error::NotAuthenticated)?;
    if !state.is_privileged() {
      return Err(Error::NotPrivileged);
    }
    Ok(principal.clone())
  }

  /// Check privilege before a mutation, re-reading the role record.
  ///
  /// A revoked role downgrades the session immediately.
  pub async fn authorize_mutation(&self) -> Result<Principal> {
    let principal = self.require_privileged()?;
    match read_privilege(self.inner.docs.as_ref(), &principal.uid).await? {
      // The session may have ended while the role was being read.
      Privilege::Privileged => self.require_privileged(),
      Privilege::Unprivileged => {
        self.inner.state.send_modify(|state| {
          state.privilege = Privilege::Unprivileged;
        });
        Err(Error::NotPrivileged)
      }
    }
  }
}

impl<I, D> Drop for SessionGate<I, D> {
  fn drop(&mut self) {
    if let Ok(mut slot) = self.listener.lock()
      && let Some(handle) = slot.take()
    {
      handle.abort();
    }
  }
}
