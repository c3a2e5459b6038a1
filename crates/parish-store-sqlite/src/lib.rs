//! SQLite backend for the parish site.
//!
//! One [`SqliteStore`] implements all three capabilities: documents, blobs
//! and identity. It wraps [`tokio_rusqlite`] so database access runs on a
//! dedicated thread without blocking the async runtime.

mod blobs;
mod encode;
mod identity;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::{DEFAULT_BASE_URL, DEFAULT_SESSION_TTL, SqliteStore};
