//! Record persistence shared by the three CRUD surfaces.
//!
//! Every function here is generic over the document store, runs after the
//! caller's validation, and leaves authorization to the handler.

use chrono::Utc;
use futures::future::try_join_all;
use parish_core::{
  listing::fetch_page,
  query::{Cursor, ListQuery, Page},
  record::{Collection, Record, timestamp},
  store::DocumentStore,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{ApiError, Result};

// ─── Request shapes ──────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct PageParams {
  pub cursor: Option<String>,
  pub limit:  Option<usize>,
}

impl PageParams {
  pub fn cursor(&self) -> Result<Option<Cursor>> {
    Ok(self.cursor.as_deref().map(Cursor::decode).transpose()?)
  }

  pub fn page_size(&self, default: usize) -> usize { self.limit.unwrap_or(default) }
}

#[derive(Debug, Default, Deserialize)]
pub struct DeleteParams {
  #[serde(default)]
  pub confirm: bool,
}

#[derive(Debug, Deserialize)]
pub struct BatchDelete {
  pub ids:     Vec<String>,
  #[serde(default)]
  pub confirm: bool,
}

/// Deletion is destructive and must be confirmed explicitly.
pub fn require_confirmation(confirm: bool) -> Result<()> {
  if !confirm {
    return Err(ApiError::BadRequest(
      "deletion must be confirmed with confirm=true".into(),
    ));
  }
  Ok(())
}

// ─── Response shapes ─────────────────────────────────────────────────────────

/// A saved record plus the refetched first page of its listing.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Saved<T> {
  pub record: T,
  pub page:   Page<T>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Deleted {
  pub deleted: usize,
}

// ─── Persistence ─────────────────────────────────────────────────────────────

fn body_of(draft: &impl Serialize) -> Result<Map<String, Value>> {
  match serde_json::to_value(draft).map_err(parish_core::Error::from)? {
    Value::Object(map) => Ok(map),
    _ => Err(ApiError::BadRequest("expected a JSON object".into())),
  }
}

fn now() -> Value { Value::String(timestamp::format(Utc::now())) }

/// Insert a validated draft as a new record, stamping both timestamps.
pub async fn create_record<T, D>(docs: &D, draft: &impl Serialize) -> Result<T>
where
  T: Record,
  D: DocumentStore,
{
  let mut body = body_of(draft)?;
  let stamp = now();
  body.insert("createdAt".into(), stamp.clone());
  body.insert("updatedAt".into(), stamp);

  let doc = docs
    .create(T::COLLECTION, Value::Object(body))
    .await
    .map_err(ApiError::backend)?;
  tracing::info!(collection = %T::COLLECTION, id = %doc.id, "record created");
  Ok(T::from_document(doc)?)
}

/// Merge a validated draft into an existing record. `createdAt` is kept.
pub async fn update_record<T, D>(
  docs: &D,
  id: &str,
  draft: &impl Serialize,
) -> Result<T>
where
  T: Record,
  D: DocumentStore,
{
  let mut body = body_of(draft)?;
  body.remove("createdAt");
  body.insert("updatedAt".into(), now());

  let doc = docs
    .update(T::COLLECTION, id, Value::Object(body))
    .await
    .map_err(ApiError::backend)?
    .ok_or_else(|| not_found(T::COLLECTION, id))?;
  tracing::info!(collection = %T::COLLECTION, %id, "record updated");
  Ok(T::from_document(doc)?)
}

/// Remove one document; a missing one is a 404.
pub async fn delete_record<D: DocumentStore>(
  docs: &D,
  collection: Collection,
  id: &str,
) -> Result<()> {
  let existed = docs
    .delete(collection, id)
    .await
    .map_err(ApiError::backend)?;
  if !existed {
    return Err(not_found(collection, id));
  }
  tracing::info!(%collection, %id, "record deleted");
  Ok(())
}

/// Delete many documents in parallel. The join is all-or-nothing, but
/// deletions that already completed are not undone. Unknown ids are skipped.
pub async fn delete_many<D: DocumentStore>(
  docs: &D,
  collection: Collection,
  ids: &[String],
) -> Result<Deleted> {
  let removed = try_join_all(ids.iter().map(|id| docs.delete(collection, id)))
    .await
    .map_err(ApiError::backend)?;
  let deleted = removed.into_iter().filter(|existed| *existed).count();
  tracing::info!(%collection, deleted, requested = ids.len(), "batch deleted");
  Ok(Deleted { deleted })
}

pub async fn first_page<T, D>(docs: &D, query: &ListQuery) -> Result<Page<T>>
where
  T: Record,
  D: DocumentStore,
{
  Ok(fetch_page(docs, &query.clone().after(None)).await?)
}

pub fn not_found(collection: Collection, id: &str) -> ApiError {
  ApiError::NotFound(format!("{collection}/{id} not found"))
}
