//! Error types for `parish-core`.

use thiserror::Error;

/// Boxed error raised by a backend capability (document, blob or identity).
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum Error {
  // ── Validation: rejected before any backend call ─────────────────────────
  #[error("{0} is required")]
  MissingField(&'static str),

  #[error("{field} must be a calendar date (YYYY-MM-DD), got {value:?}")]
  InvalidDate { field: &'static str, value: String },

  #[error("could not find a YouTube video id in {0:?}")]
  InvalidVideoReference(String),

  #[error(
    "YouTube clip links cannot be embedded; share the full video instead \
     (got {0:?})"
  )]
  UnsupportedClipLink(String),

  #[error("invalid field path: {0:?}")]
  InvalidFieldPath(String),

  #[error("invalid query: {0}")]
  InvalidQuery(String),

  #[error("invalid pagination cursor")]
  InvalidCursor,

  #[error("{0:?} is not a valid email address")]
  InvalidEmail(String),

  #[error("password must be at least {0} characters")]
  WeakPassword(usize),

  // ── Identity / role gate ─────────────────────────────────────────────────
  #[error("you must be signed in to perform this action")]
  NotAuthenticated,

  #[error("you must be an admin to perform this action")]
  NotPrivileged,

  #[error("invalid email or password")]
  InvalidCredentials,

  #[error("an account already exists for {0}")]
  EmailTaken(String),

  // ── Backend and decoding ─────────────────────────────────────────────────
  #[error("document {collection}/{id} could not be decoded: {source}")]
  Decode {
    collection: &'static str,
    id:         String,
    #[source]
    source:     serde_json::Error,
  },

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),

  #[error("backend error: {0}")]
  Backend(#[source] BoxError),
}

impl Error {
  /// Wrap a capability error raised by the backend.
  pub fn backend<E>(err: E) -> Self
  where
    E: std::error::Error + Send + Sync + 'static,
  {
    Self::Backend(Box::new(err))
  }

  /// `true` for errors raised before any backend call was attempted.
  pub fn is_validation(&self) -> bool {
    matches!(
      self,
      Self::MissingField(_)
        | Self::InvalidDate { .. }
        | Self::InvalidVideoReference(_)
        | Self::UnsupportedClipLink(_)
        | Self::InvalidFieldPath(_)
        | Self::InvalidQuery(_)
        | Self::InvalidCursor
        | Self::InvalidEmail(_)
        | Self::WeakPassword(_)
    )
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
