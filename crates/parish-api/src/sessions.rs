//! Server-side registry of live session gates, keyed by bearer token.
//!
//! Each signed-in client gets its own [`SessionGate`], which keeps listening
//! for identity changes so a sign-out from anywhere takes effect on the next
//! request.

use std::{
  collections::HashMap,
  sync::{Arc, Mutex},
  time::{Duration, Instant},
};

use parish_core::{
  Error, Result,
  session::SessionGate,
  store::{BackendClient, Credentials, SessionToken},
};

pub type Gate<B> = SessionGate<B, B>;

/// How long a gate may sit unused before it is dropped from memory.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(30 * 60);

struct Entry<B: BackendClient> {
  gate:      Arc<Gate<B>>,
  last_used: Instant,
}

/// Live gates, evicted once idle. An evicted session is still valid in the
/// backend and is resumed on its next request.
pub struct SessionRegistry<B: BackendClient> {
  backend: Arc<B>,
  idle:    Duration,
  gates:   Mutex<HashMap<SessionToken, Entry<B>>>,
}

impl<B: BackendClient> SessionRegistry<B> {
  pub fn new(backend: Arc<B>) -> Self {
    Self::with_idle_timeout(backend, DEFAULT_IDLE_TIMEOUT)
  }

  pub fn with_idle_timeout(backend: Arc<B>, idle: Duration) -> Self {
    Self {
      backend,
      idle,
      gates: Mutex::new(HashMap::new()),
    }
  }

  fn new_gate(&self) -> Gate<B> {
    SessionGate::new(Arc::clone(&self.backend), Arc::clone(&self.backend))
  }

  /// Drop gates that are idle or have gone anonymous.
  fn prune(&self, gates: &mut HashMap<SessionToken, Entry<B>>, now: Instant) {
    let before = gates.len();
    gates.retain(|_, entry| {
      let keep = now.duration_since(entry.last_used) < self.idle
        && entry.gate.state().principal().is_some();
      if !keep {
        entry.gate.shutdown();
      }
      keep
    });
    let evicted = before - gates.len();
    if evicted > 0 {
      tracing::debug!(evicted, "session gates evicted");
    }
  }

  fn cached(&self, token: &SessionToken) -> Option<Arc<Gate<B>>> {
    let mut gates = self.gates.lock().ok()?;
    let now = Instant::now();
    self.prune(&mut gates, now);
    let entry = gates.get_mut(token)?;
    entry.last_used = now;
    Some(Arc::clone(&entry.gate))
  }

  fn remember(&self, gate: Gate<B>) -> Arc<Gate<B>> {
    let gate = Arc::new(gate);
    gate.listen();
    if let Some(token) = gate.token()
      && let Ok(mut gates) = self.gates.lock()
    {
      let now = Instant::now();
      self.prune(&mut gates, now);
      gates.insert(token, Entry {
        gate:      Arc::clone(&gate),
        last_used: now,
      });
    }
    gate
  }

  /// The gate for a bearer token, resuming the session if this process has
  /// not seen it yet.
  pub async fn resolve(&self, token: SessionToken) -> Result<Arc<Gate<B>>> {
    if let Some(gate) = self.cached(&token) {
      return Ok(gate);
    }
    let gate = self.new_gate();
    let state = gate.resume(token).await?;
    if state.principal().is_none() {
      return Err(Error::NotAuthenticated);
    }
    Ok(self.remember(gate))
  }

  pub async fn sign_in(&self, credentials: Credentials) -> Result<Arc<Gate<B>>> {
    let gate = self.new_gate();
    gate.sign_in(credentials).await?;
    Ok(self.remember(gate))
  }

  pub async fn sign_up(&self, email: &str, password: &str) -> Result<Arc<Gate<B>>> {
    let gate = self.new_gate();
    gate.sign_up(email, password).await?;
    Ok(self.remember(gate))
  }

  pub async fn sign_out(&self, gate: &Gate<B>) -> Result<()> {
    if let Some(token) = gate.token()
      && let Ok(mut gates) = self.gates.lock()
    {
      gates.remove(&token);
    }
    let outcome = gate.sign_out().await;
    gate.shutdown();
    outcome
  }

  pub fn len(&self) -> usize { self.gates.lock().map(|g| g.len()).unwrap_or(0) }

  pub fn is_empty(&self) -> bool { self.len() == 0 }
}
