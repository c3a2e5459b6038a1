//! [`SqliteStore`] and its [`DocumentStore`] implementation.

use std::{path::Path, sync::Arc};

use chrono::TimeDelta;
use parish_core::{
  query::ListQuery,
  record::Collection,
  store::{Backend, Document, DocumentStore, IdentityChange},
};
use rusqlite::OptionalExtension as _;
use serde_json::{Map, Value};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::{
  Error, Result,
  encode::{Statement, select_documents},
  schema::SCHEMA,
};

/// Public base URL used when none is configured.
pub const DEFAULT_BASE_URL: &str = "http://localhost:8080";

const CHANGE_CAPACITY: usize = 64;

/// How long a session token stays valid when no lifetime is configured.
pub const DEFAULT_SESSION_TTL: TimeDelta = TimeDelta::days(30);

// ─── Store ───────────────────────────────────────────────────────────────────

/// The parish backend in a single SQLite file.
///
/// Cloning is cheap; the connection and the identity change channel are
/// shared between clones.
#[derive(Clone)]
pub struct SqliteStore {
  pub(crate) conn:     tokio_rusqlite::Connection,
  pub(crate) base_url: Arc<str>,
  pub(crate) changes:  broadcast::Sender<IdentityChange>,
  pub(crate) session_ttl: TimeDelta,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  /// Download URLs are minted under `base_url`.
  pub async fn open(path: impl AsRef<Path>, base_url: &str) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    Self::init(conn, base_url).await
  }

  /// Open an in-memory store; useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    Self::init(conn, DEFAULT_BASE_URL).await
  }

  async fn init(conn: tokio_rusqlite::Connection, base_url: &str) -> Result<Self> {
    let (changes, _) = broadcast::channel(CHANGE_CAPACITY);
    let store = Self {
      conn,
      base_url: Arc::from(base_url.trim_end_matches('/')),
      changes,
      session_ttl: DEFAULT_SESSION_TTL,
    };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  pub fn base_url(&self) -> &str { &self.base_url }

  /// Sessions older than `ttl` are no longer current.
  pub fn with_session_ttl(mut self, ttl: TimeDelta) -> Self {
    self.session_ttl = ttl;
    self
  }
}

fn new_id() -> String { Uuid::new_v4().simple().to_string() }

fn object_body(collection: Collection, data: Value) -> Result<Map<String, Value>> {
  match data {
    Value::Object(mut map) => {
      map.remove("id");
      Ok(map)
    }
    _ => Err(Error::NotAnObject {
      collection: collection.as_str(),
    }),
  }
}

fn decode_document(id: String, data: &str) -> Result<Document> {
  Ok(Document {
    id,
    data: serde_json::from_str(data)?,
  })
}

// ─── DocumentStore impl ──────────────────────────────────────────────────────

impl Backend for SqliteStore {
  type Error = Error;
}

impl DocumentStore for SqliteStore {
  async fn get(&self, collection: Collection, id: &str) -> Result<Option<Document>> {
    let id = id.to_owned();
    let coll = collection.as_str();

    let raw: Option<(String, String)> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT id, data FROM documents WHERE collection = ?1 AND id = ?2",
              rusqlite::params![coll, id],
              |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(|(id, data)| decode_document(id, &data)).transpose()
  }

  async fn query(
    &self,
    query: &ListQuery,
    limit: Option<usize>,
  ) -> Result<Vec<Document>> {
    query.validate()?;
    let Statement { sql, params } = select_documents(query, limit);

    let raws: Vec<(String, String)> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(rusqlite::params_from_iter(params), |row| {
            Ok((row.get(0)?, row.get(1)?))
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws
      .into_iter()
      .map(|(id, data)| decode_document(id, &data))
      .collect()
  }

  async fn create(&self, collection: Collection, data: Value) -> Result<Document> {
    let id = new_id();
    self.set(collection, &id, data).await
  }

  async fn set(
    &self,
    collection: Collection,
    id: &str,
    data: Value,
  ) -> Result<Document> {
    let body = Value::Object(object_body(collection, data)?);
    let body_str = body.to_string();
    let id_owned = id.to_owned();
    let coll = collection.as_str();

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO documents (collection, id, data) VALUES (?1, ?2, ?3)
           ON CONFLICT (collection, id) DO UPDATE SET data = excluded.data",
          rusqlite::params![coll, id_owned, body_str],
        )?;
        Ok(())
      })
      .await?;

    tracing::debug!(collection = coll, %id, "document written");
    Ok(Document {
      id:   id.to_owned(),
      data: body,
    })
  }

  async fn update(
    &self,
    collection: Collection,
    id: &str,
    data: Value,
  ) -> Result<Option<Document>> {
    let patch = object_body(collection, data)?;
    let id_owned = id.to_owned();
    let coll = collection.as_str();

    // Read-merge-write inside one transaction so concurrent merges of
    // disjoint fields are not lost.
    let merged: Option<String> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let current: Option<String> = tx
          .query_row(
            "SELECT data FROM documents WHERE collection = ?1 AND id = ?2",
            rusqlite::params![coll, id_owned],
            |row| row.get(0),
          )
          .optional()?;
        let Some(current) = current else {
          return Ok(None);
        };

        let mut body: Map<String, Value> = serde_json::from_str(&current)
          .map_err(|e| tokio_rusqlite::Error::Other(Box::new(e)))?;
        body.extend(patch);
        let merged = Value::Object(body).to_string();

        tx.execute(
          "UPDATE documents SET data = ?3 WHERE collection = ?1 AND id = ?2",
          rusqlite::params![coll, id_owned, merged],
        )?;
        tx.commit()?;
        Ok(Some(merged))
      })
      .await?;

    merged
      .map(|data| decode_document(id.to_owned(), &data))
      .transpose()
  }

  async fn delete(&self, collection: Collection, id: &str) -> Result<bool> {
    let id_owned = id.to_owned();
    let coll = collection.as_str();

    let removed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "DELETE FROM documents WHERE collection = ?1 AND id = ?2",
          rusqlite::params![coll, id_owned],
        )?)
      })
      .await?;

    Ok(removed > 0)
  }

  async fn count(&self, collection: Collection) -> Result<u64> {
    let coll = collection.as_str();
    let n: i64 = self
      .conn
      .call(move |conn| {
        Ok(conn.query_row(
          "SELECT COUNT(*) FROM documents WHERE collection = ?1",
          rusqlite::params![coll],
          |row| row.get(0),
        )?)
      })
      .await?;
    Ok(u64::try_from(n).unwrap_or_default())
  }
}
