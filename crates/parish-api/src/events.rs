//! Admin handlers for events, including their image attachments.
//!
//! Images arrive base64-encoded in the JSON body and go through the media
//! pipeline before the event document is written. Deleting an event releases
//! its blobs one by one; a blob that cannot be released is reported back as
//! orphaned instead of failing the deletion.

use axum::{
  Json,
  extract::{Path, Query, State},
  http::StatusCode,
  response::IntoResponse,
};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use futures::future::{join_all, try_join_all};
use parish_core::{
  Result as CoreResult,
  listing::{fetch_one, fetch_page},
  query::{Direction, ListQuery, Page},
  record::{Collection, Event, required},
  store::{BackendClient, BlobStore, DocumentStore},
};
use parish_media::{RawImage, crop::CropRegion};
use serde::{Deserialize, Serialize};

use crate::{
  AppState,
  auth::Privileged,
  content::{
    BatchDelete, DeleteParams, PageParams, Saved, create_record, first_page,
    not_found, require_confirmation, update_record,
  },
  error::{ApiError, Result},
};

// ─── Request shapes ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageUpload {
  pub file_name:    String,
  #[serde(default)]
  pub content_type: String,
  /// Standard base64 of the file bytes.
  pub data:         String,
  #[serde(default)]
  pub crop:         Option<CropRegion>,
}

impl ImageUpload {
  fn decode(self) -> Result<RawImage> {
    let bytes = STANDARD.decode(self.data.trim()).map_err(|e| {
      ApiError::BadRequest(format!("{} is not valid base64: {e}", self.file_name))
    })?;
    Ok(RawImage {
      file_name: self.file_name,
      content_type: self.content_type,
      bytes,
      crop: self.crop,
    })
  }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventDraft {
  #[serde(default)]
  pub title:       String,
  #[serde(default)]
  pub description: String,
  /// Free text, e.g. `"22-27 SEPT 2025"`.
  #[serde(default)]
  pub date:        String,
  #[serde(default)]
  pub images:      Vec<ImageUpload>,
}

/// The persisted part of an event draft.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventFields {
  pub title:       String,
  pub description: String,
  pub date:        String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub image_urls:  Option<Vec<String>>,
}

impl EventDraft {
  /// Check the text fields and decode the attached images.
  pub fn validate(self) -> Result<(EventFields, Vec<RawImage>)> {
    let fields = self.fields()?;
    let images = self
      .images
      .into_iter()
      .map(ImageUpload::decode)
      .collect::<Result<Vec<_>>>()?;
    Ok((fields, images))
  }

  fn fields(&self) -> CoreResult<EventFields> {
    Ok(EventFields {
      title:       required("title", &self.title)?,
      description: required("description", &self.description)?,
      date:        required("date", &self.date)?,
      image_urls:  None,
    })
  }
}

/// Dashboard listing, most recent event label first.
pub fn admin_query(page_size: usize) -> ListQuery {
  ListQuery::new(Collection::Events)
    .order_by("date", Direction::Desc)
    .page_size(page_size)
}

// ─── Blob release ────────────────────────────────────────────────────────────

/// Outcome of deleting one event.
#[derive(Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventDeletion {
  pub deleted:         usize,
  /// Image references whose blobs could not be removed.
  pub orphaned_images: Vec<String>,
}

/// Release every blob behind `references`, independently. Returns the
/// references that could not be released.
pub async fn release_images<B: BlobStore>(
  blobs: &B,
  references: &[String],
) -> Vec<String> {
  let releases = references.iter().map(|reference| async move {
    let Some(path) = blobs.resolve_reference(reference) else {
      tracing::debug!(%reference, "not a stored blob; skipping");
      return None;
    };
    match blobs.delete(&path).await {
      Ok(()) => None,
      Err(err) => {
        tracing::warn!(%path, error = %err, "failed to release image");
        Some(reference.clone())
      }
    }
  });
  join_all(releases).await.into_iter().flatten().collect()
}

/// Await a document write that references freshly uploaded `urls`. When the
/// write fails the uploads are released before the error is returned.
pub async fn write_or_release<B, T>(
  blobs: &B,
  urls: &[String],
  write: impl Future<Output = Result<T>>,
) -> Result<T>
where
  B: BlobStore,
{
  let err = match write.await {
    Ok(value) => return Ok(value),
    Err(err) => err,
  };
  let orphaned = release_images(blobs, urls).await;
  if !orphaned.is_empty() {
    tracing::warn!(count = orphaned.len(), "uploads for a failed write left behind");
  }
  Err(err)
}

/// Delete an event and release its images. The document goes first; blob
/// failures after that are reported, not raised. `None` if there was no
/// such event.
pub async fn delete_event<D, B>(
  docs: &D,
  blobs: &B,
  id: &str,
) -> Result<Option<EventDeletion>>
where
  D: DocumentStore,
  B: BlobStore,
{
  let Some(event) = fetch_one::<Event, _>(docs, id).await? else {
    return Ok(None);
  };
  let existed = docs
    .delete(Collection::Events, id)
    .await
    .map_err(ApiError::backend)?;
  if !existed {
    return Ok(None);
  }
  let orphaned_images = release_images(blobs, &event.image_urls).await;
  tracing::info!(
    %id,
    images = event.image_urls.len(),
    orphaned = orphaned_images.len(),
    "event deleted"
  );
  Ok(Some(EventDeletion {
    deleted: 1,
    orphaned_images,
  }))
}

// ─── Handlers ────────────────────────────────────────────────────────────────

/// `GET /api/dashboard/events`
pub async fn list<B: BackendClient>(
  State(state): State<AppState<B>>,
  _admin: Privileged<B>,
  Query(params): Query<PageParams>,
) -> Result<Json<Page<Event>>> {
  let query = admin_query(params.page_size(state.config.page_size))
    .after(params.cursor()?);
  Ok(Json(fetch_page(state.backend.as_ref(), &query).await?))
}

/// `POST /api/dashboard/events`
pub async fn create<B: BackendClient>(
  State(state): State<AppState<B>>,
  admin: Privileged<B>,
  Json(draft): Json<EventDraft>,
) -> Result<impl IntoResponse> {
  let (mut fields, images) = draft.validate()?;
  state.media.check_batch(images.len())?;
  let principal = admin.gate.authorize_mutation().await?;

  let backend = state.backend.as_ref();
  let urls = state.media.ingest(backend, &principal.uid, images).await?;
  fields.image_urls = Some(urls.clone());

  let record =
    write_or_release(backend, &urls, create_record::<Event, _>(backend, &fields))
      .await?;
  let page = first_page(backend, &admin_query(state.config.page_size)).await?;
  Ok((StatusCode::CREATED, Json(Saved { record, page })))
}

/// `PUT /api/dashboard/events/{id}`
///
/// New images replace the stored ones, whose blobs are released once the
/// document is written. Without new images the stored ones are kept.
pub async fn update<B: BackendClient>(
  State(state): State<AppState<B>>,
  admin: Privileged<B>,
  Path(id): Path<String>,
  Json(draft): Json<EventDraft>,
) -> Result<Json<Saved<Event>>> {
  let (mut fields, images) = draft.validate()?;
  state.media.check_batch(images.len())?;
  let principal = admin.gate.authorize_mutation().await?;

  let backend = state.backend.as_ref();
  let previous = fetch_one::<Event, _>(backend, &id)
    .await?
    .ok_or_else(|| not_found(Collection::Events, &id))?;

  let replacing = !images.is_empty();
  let mut uploaded = Vec::new();
  if replacing {
    uploaded = state.media.ingest(backend, &principal.uid, images).await?;
    fields.image_urls = Some(uploaded.clone());
  }

  let record = write_or_release(
    backend,
    &uploaded,
    update_record::<Event, _>(backend, &id, &fields),
  )
  .await?;
  if replacing {
    let orphaned = release_images(backend, &previous.image_urls).await;
    if !orphaned.is_empty() {
      tracing::warn!(%id, count = orphaned.len(), "replaced images left behind");
    }
  }
  let page = first_page(backend, &admin_query(state.config.page_size)).await?;
  Ok(Json(Saved { record, page }))
}

/// `DELETE /api/dashboard/events/{id}?confirm=true`
pub async fn remove<B: BackendClient>(
  State(state): State<AppState<B>>,
  admin: Privileged<B>,
  Path(id): Path<String>,
  Query(params): Query<DeleteParams>,
) -> Result<Json<EventDeletion>> {
  require_confirmation(params.confirm)?;
  admin.gate.authorize_mutation().await?;
  let backend = state.backend.as_ref();
  delete_event(backend, backend, &id)
    .await?
    .map(Json)
    .ok_or_else(|| not_found(Collection::Events, &id))
}

/// `POST /api/dashboard/events/batch-delete`
pub async fn batch_delete<B: BackendClient>(
  State(state): State<AppState<B>>,
  admin: Privileged<B>,
  Json(body): Json<BatchDelete>,
) -> Result<Json<EventDeletion>> {
  require_confirmation(body.confirm)?;
  admin.gate.authorize_mutation().await?;
  let backend = state.backend.as_ref();
  let outcomes =
    try_join_all(body.ids.iter().map(|id| delete_event(backend, backend, id)))
      .await?;

  let summary = outcomes.into_iter().flatten().fold(
    EventDeletion::default(),
    |mut acc, one| {
      acc.deleted += one.deleted;
      acc.orphaned_images.extend(one.orphaned_images);
      acc
    },
  );
  Ok(Json(summary))
}
