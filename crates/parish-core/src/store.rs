//! Capability traits for the backend and the types they exchange.
//!
//! The site depends on three capabilities: a document store (queries and
//! CRUD over named collections), a blob store (uploaded images) and an
//! identity provider (accounts and sessions). Concrete backends such as
//! `parish-store-sqlite` implement all three; higher layers (`parish-api`,
//! `parish-media`) depend only on these traits.

use std::{fmt, future::Future};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;

use crate::{query::ListQuery, record::Collection};

/// Route under which download URLs serve blobs: `{base}/media/{path}`.
pub const MEDIA_ROUTE: &str = "/media/";

// ─── Documents ───────────────────────────────────────────────────────────────

/// A stored document: an id plus a JSON object body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
  pub id:   String,
  pub data: Value,
}

impl Document {
  /// Top-level field of the document body.
  pub fn field(&self, name: &str) -> Option<&Value> { self.data.get(name) }
}

// ─── Blobs ───────────────────────────────────────────────────────────────────

/// Custom metadata recorded alongside every upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadMetadata {
  pub uploaded_by:   String,
  pub uploaded_at:   DateTime<Utc>,
  pub original_name: String,
}

/// Descriptor of a stored blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredBlob {
  pub path:           String,
  pub content_type:   String,
  pub size:           u64,
  /// SHA-256 hex digest of the stored bytes.
  pub content_hash:   String,
  /// Secret embedded in the download URL.
  pub download_token: String,
  pub metadata:       UploadMetadata,
  pub created_at:     DateTime<Utc>,
}

/// A stored blob together with its bytes.
#[derive(Debug, Clone)]
pub struct BlobObject {
  pub blob:  StoredBlob,
  pub bytes: Vec<u8>,
}

// ─── Identity ────────────────────────────────────────────────────────────────

/// Bearer token identifying one signed-in session.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionToken(pub String);

impl SessionToken {
  pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Debug for SessionToken {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str("SessionToken(..)")
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignInMethod {
  Password,
  Federated,
}

/// An authenticated identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Principal {
  pub uid:    String,
  pub email:  Option<String>,
  pub method: SignInMethod,
}

/// What a caller presents to sign in.
#[derive(Clone)]
pub enum Credentials {
  EmailPassword { email: String, password: String },
  /// An assertion already verified by a federated single-sign-on provider.
  /// The first sign-in with a given `(provider, subject)` creates the
  /// account.
  Federated {
    provider: String,
    subject:  String,
    email:    Option<String>,
  },
}

impl fmt::Debug for Credentials {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::EmailPassword { email, .. } => f
        .debug_struct("EmailPassword")
        .field("email", email)
        .finish_non_exhaustive(),
      Self::Federated {
        provider, subject, ..
      } => f
        .debug_struct("Federated")
        .field("provider", provider)
        .field("subject", subject)
        .finish_non_exhaustive(),
    }
  }
}

/// A live session returned by sign-in and sign-up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthSession {
  pub token:     SessionToken,
  pub principal: Principal,
}

/// Identity state change, delivered to every subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityChange {
  SignedIn {
    token:     SessionToken,
    principal: Principal,
  },
  SignedOut {
    token: SessionToken,
  },
}

// ─── Traits ──────────────────────────────────────────────────────────────────

/// Shared supertrait: one error type per backend.
pub trait Backend: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;
}

/// The query capability: CRUD and ordered queries over named collections.
///
/// Writes are unconditional; the last writer wins.
pub trait DocumentStore: Backend {
  fn get(
    &self,
    collection: Collection,
    id: &str,
  ) -> impl Future<Output = Result<Option<Document>, Self::Error>> + Send;

  /// Run a validated query.
  ///
  /// Applies the filters, orders by every key in `query.order` followed by
  /// the document id ascending, starts strictly after `query.cursor` if
  /// present, and returns at most `limit` documents. Documents lacking any
  /// order field are excluded.
  fn query(
    &self,
    query: &ListQuery,
    limit: Option<usize>,
  ) -> impl Future<Output = Result<Vec<Document>, Self::Error>> + Send;

  /// Insert a document under a store-assigned id.
  fn create(
    &self,
    collection: Collection,
    data: Value,
  ) -> impl Future<Output = Result<Document, Self::Error>> + Send;

  /// Insert or overwrite the document at `id`.
  fn set(
    &self,
    collection: Collection,
    id: &str,
    data: Value,
  ) -> impl Future<Output = Result<Document, Self::Error>> + Send;

  /// Merge the top-level fields of `data` into an existing document.
  /// Returns `None` if there is no such document.
  fn update(
    &self,
    collection: Collection,
    id: &str,
    data: Value,
  ) -> impl Future<Output = Result<Option<Document>, Self::Error>> + Send;

  /// Remove a document. Returns whether it existed; a missing document is
  /// not an error.
  fn delete(
    &self,
    collection: Collection,
    id: &str,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send;

  fn count(
    &self,
    collection: Collection,
  ) -> impl Future<Output = Result<u64, Self::Error>> + Send;
}

/// The blob capability: uploaded files addressed by path.
pub trait BlobStore: Backend {
  fn put(
    &self,
    path: &str,
    content_type: &str,
    bytes: Vec<u8>,
    metadata: UploadMetadata,
  ) -> impl Future<Output = Result<StoredBlob, Self::Error>> + Send;

  /// Durable public URL for a stored blob, `None` if the path is unknown.
  fn download_url(
    &self,
    path: &str,
  ) -> impl Future<Output = Result<Option<String>, Self::Error>> + Send;

  fn get(
    &self,
    path: &str,
  ) -> impl Future<Output = Result<Option<BlobObject>, Self::Error>> + Send;

  /// Remove a blob. Removing a missing blob is an error.
  fn delete(
    &self,
    path: &str,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send;

  /// Map a stored reference (download URL or bare path) to its storage path.
  fn resolve_reference(&self, reference: &str) -> Option<String> {
    storage_path_from_reference(reference)
  }
}

/// The identity capability: accounts, sessions and change notifications.
pub trait IdentityProvider: Backend {
  /// Create a password account and sign it in. Returns `None` when the
  /// email is already registered.
  fn sign_up(
    &self,
    email: &str,
    password: &str,
  ) -> impl Future<Output = Result<Option<AuthSession>, Self::Error>> + Send;

  /// Returns `None` when the credentials are rejected.
  fn sign_in(
    &self,
    credentials: Credentials,
  ) -> impl Future<Output = Result<Option<AuthSession>, Self::Error>> + Send;

  /// End a session. Ending an unknown session is not an error.
  fn sign_out(
    &self,
    token: &SessionToken,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send;

  /// The principal behind a live session.
  fn current(
    &self,
    token: &SessionToken,
  ) -> impl Future<Output = Result<Option<Principal>, Self::Error>> + Send;

  /// Subscribe to identity changes. Dropping the receiver unsubscribes.
  fn subscribe(&self) -> broadcast::Receiver<IdentityChange>;
}

/// Everything the site needs from one backend.
pub trait BackendClient:
  DocumentStore + BlobStore + IdentityProvider + Clone + 'static
{
}

impl<T> BackendClient for T where
  T: DocumentStore + BlobStore + IdentityProvider + Clone + 'static
{
}

/// Extract the storage path from a download URL
/// (`https://host/media/events/a.jpg?token=...`) or accept a bare path.
pub fn storage_path_from_reference(reference: &str) -> Option<String> {
  let reference = reference.trim();
  let path = match reference.split_once(MEDIA_ROUTE) {
    Some((_, tail)) if reference.contains("://") => tail,
    _ if reference.contains("://") => return None,
    _ => reference.trim_start_matches('/'),
  };
  let path = path.split(['?', '#']).next().unwrap_or_default();
  (!path.is_empty()).then(|| path.to_owned())
}
