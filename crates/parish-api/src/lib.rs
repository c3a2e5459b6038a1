//! JSON HTTP API for the parish site.
//!
//! Exposes an axum [`Router`] backed by any [`BackendClient`]: public
//! listings, account sessions, the admin dashboard and uploaded media.

pub mod account;
pub mod announcements;
pub mod auth;
pub mod content;
pub mod dashboard;
pub mod error;
pub mod events;
pub mod media;
pub mod public;
pub mod sermons;
pub mod sessions;

use std::{path::PathBuf, sync::Arc, time::Duration};

use axum::{
  Router,
  routing::{get, post, put},
};
use parish_core::{query::DEFAULT_PAGE_SIZE, store::BackendClient};
use parish_media::{MediaConfig, MediaPipeline};
use serde::Deserialize;
use tower_http::trace::TraceLayer;

pub use error::ApiError;
use sessions::SessionRegistry;

// ─── Configuration ───────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `config.toml` and
/// `PARISH_*` environment variables.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
  #[serde(default = "default_host")]
  pub host:       String,
  #[serde(default = "default_port")]
  pub port:       u16,
  /// Public origin used in blob download URLs.
  pub base_url:   String,
  pub store_path: PathBuf,
  /// Default page size for listings.
  #[serde(default = "default_page_size")]
  pub page_size:  usize,
  #[serde(default)]
  pub media:      MediaConfig,
  /// Minutes an unused session gate stays in memory.
  #[serde(default = "default_session_idle_minutes")]
  pub session_idle_minutes: u64,
  /// Days a session token stays valid after sign-in.
  #[serde(default = "default_session_days")]
  pub session_days: i64,
}

fn default_host() -> String { "127.0.0.1".to_owned() }

fn default_port() -> u16 { 8080 }

fn default_page_size() -> usize { DEFAULT_PAGE_SIZE }

fn default_session_idle_minutes() -> u64 { 30 }

fn default_session_days() -> i64 { 30 }

// ─── Application state ───────────────────────────────────────────────────────

/// Shared state threaded through all axum handlers.
pub struct AppState<B: BackendClient> {
  pub backend:  Arc<B>,
  pub sessions: Arc<SessionRegistry<B>>,
  pub media:    Arc<MediaPipeline>,
  pub config:   Arc<ServerConfig>,
}

impl<B: BackendClient> AppState<B> {
  pub fn new(backend: B, config: ServerConfig) -> Self {
    let backend = Arc::new(backend);
    Self {
      sessions: Arc::new(SessionRegistry::with_idle_timeout(
        Arc::clone(&backend),
        Duration::from_secs(config.session_idle_minutes.saturating_mul(60)),
      )),
      media: Arc::new(MediaPipeline::new(config.media.clone())),
      config: Arc::new(config),
      backend,
    }
  }
}

impl<B: BackendClient> Clone for AppState<B> {
  fn clone(&self) -> Self {
    Self {
      backend:  Arc::clone(&self.backend),
      sessions: Arc::clone(&self.sessions),
      media:    Arc::clone(&self.media),
      config:   Arc::clone(&self.config),
    }
  }
}

// ─── Router ──────────────────────────────────────────────────────────────────

/// Build the full application router.
pub fn router<B: BackendClient>(state: AppState<B>) -> Router {
  Router::new()
    // Public
    .route("/api/home", get(public::home::<B>))
    .route("/api/sermons", get(public::sermons::<B>))
    .route("/api/sermons/{id}", get(public::sermon::<B>))
    .route("/api/events", get(public::events::<B>))
    .route("/api/events/{id}", get(public::event::<B>))
    .route("/api/announcements", get(public::announcements::<B>))
    .route("/media/{*path}", get(media::serve::<B>))
    // Accounts
    .route("/api/auth/sign-up", post(account::sign_up::<B>))
    .route("/api/auth/sign-in", post(account::sign_in::<B>))
    .route("/api/auth/sign-out", post(account::sign_out::<B>))
    .route("/api/auth/session", get(account::session::<B>))
    // Dashboard
    .route("/api/dashboard", get(dashboard::stats::<B>))
    .route(
      "/api/dashboard/sermons",
      get(sermons::list::<B>).post(sermons::create::<B>),
    )
    .route(
      "/api/dashboard/sermons/{id}",
      put(sermons::update::<B>).delete(sermons::remove::<B>),
    )
    .route(
      "/api/dashboard/sermons/batch-delete",
      post(sermons::batch_delete::<B>),
    )
    .route(
      "/api/dashboard/events",
      get(events::list::<B>).post(events::create::<B>),
    )
    .route(
      "/api/dashboard/events/{id}",
      put(events::update::<B>).delete(events::remove::<B>),
    )
    .route(
      "/api/dashboard/events/batch-delete",
      post(events::batch_delete::<B>),
    )
    .route(
      "/api/dashboard/announcements",
      get(announcements::list::<B>).post(announcements::create::<B>),
    )
    .route(
      "/api/dashboard/announcements/{id}",
      put(announcements::update::<B>).delete(announcements::remove::<B>),
    )
    .route(
      "/api/dashboard/announcements/batch-delete",
      post(announcements::batch_delete::<B>),
    )
    .layer(TraceLayer::new_for_http())
    .with_state(state)
}

#[cfg(test)]
mod tests;
