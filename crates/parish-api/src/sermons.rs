//! Admin handlers for sermons.
//!
//! | Method   | Path | Notes |
//! |----------|------|-------|
//! | `GET`    | `/api/dashboard/sermons` | First page, newest first |
//! | `POST`   | `/api/dashboard/sermons` | Body: [`SermonDraft`] |
//! | `PUT`    | `/api/dashboard/sermons/{id}` | Body: [`SermonDraft`] |
//! | `DELETE` | `/api/dashboard/sermons/{id}?confirm=true` | |
//! | `POST`   | `/api/dashboard/sermons/batch-delete` | `{ids, confirm}` |

use axum::{
  Json,
  extract::{Path, Query, State},
  http::StatusCode,
  response::IntoResponse,
};
use parish_core::{
  Result as CoreResult,
  listing::fetch_page,
  query::{Direction, ListQuery, Page},
  record::{Collection, Sermon, parse_calendar_date, required},
  store::BackendClient,
  video::normalize_youtube,
};
use serde::{Deserialize, Serialize};

use crate::{
  AppState,
  auth::Privileged,
  content::{
    BatchDelete, DeleteParams, Deleted, PageParams, Saved, create_record,
    delete_many, delete_record, first_page, require_confirmation,
    update_record,
  },
  error::Result,
};

/// Sermon form input. Everything is required; tags may be empty.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SermonDraft {
  #[serde(default)]
  pub title:       String,
  #[serde(default)]
  pub description: String,
  #[serde(default, rename = "youtubeUrl")]
  pub video_url:   String,
  #[serde(default)]
  pub preacher:    String,
  #[serde(default)]
  pub date:        String,
  #[serde(default)]
  pub tags:        Vec<String>,
}

impl SermonDraft {
  /// Trim, check required fields and the date, and canonicalise the video
  /// reference. Runs before any backend call.
  pub fn validate(self) -> CoreResult<Self> {
    let title = required("title", &self.title)?;
    let description = required("description", &self.description)?;
    let video_url = normalize_youtube(&self.video_url)?;
    let preacher = required("preacher", &self.preacher)?;
    let date = required("date", &self.date)?;
    parse_calendar_date("date", &date)?;
    let tags = self
      .tags
      .iter()
      .map(|tag| tag.trim())
      .filter(|tag| !tag.is_empty())
      .map(str::to_owned)
      .collect();
    Ok(Self {
      title,
      description,
      video_url,
      preacher,
      date,
      tags,
    })
  }
}

/// Dashboard listing: newest first.
pub fn admin_query(page_size: usize) -> ListQuery {
  ListQuery::new(Collection::Sermons)
    .order_by("date", Direction::Desc)
    .page_size(page_size)
}

// ─── Handlers ────────────────────────────────────────────────────────────────

/// `GET /api/dashboard/sermons`
pub async fn list<B: BackendClient>(
  State(state): State<AppState<B>>,
  _admin: Privileged<B>,
  Query(params): Query<PageParams>,
) -> Result<Json<Page<Sermon>>> {
  let query = admin_query(params.page_size(state.config.page_size))
    .after(params.cursor()?);
  Ok(Json(fetch_page(state.backend.as_ref(), &query).await?))
}

/// `POST /api/dashboard/sermons`
pub async fn create<B: BackendClient>(
  State(state): State<AppState<B>>,
  admin: Privileged<B>,
  Json(draft): Json<SermonDraft>,
) -> Result<impl IntoResponse> {
  let draft = draft.validate()?;
  admin.gate.authorize_mutation().await?;

  let docs = state.backend.as_ref();
  let record = create_record::<Sermon, _>(docs, &draft).await?;
  let page = first_page(docs, &admin_query(state.config.page_size)).await?;
  Ok((StatusCode::CREATED, Json(Saved { record, page })))
}

/// `PUT /api/dashboard/sermons/{id}`
pub async fn update<B: BackendClient>(
  State(state): State<AppState<B>>,
  admin: Privileged<B>,
  Path(id): Path<String>,
  Json(draft): Json<SermonDraft>,
) -> Result<Json<Saved<Sermon>>> {
  let draft = draft.validate()?;
  admin.gate.authorize_mutation().await?;

  let docs = state.backend.as_ref();
  let record = update_record::<Sermon, _>(docs, &id, &draft).await?;
  let page = first_page(docs, &admin_query(state.config.page_size)).await?;
  Ok(Json(Saved { record, page }))
}

/// `DELETE /api/dashboard/sermons/{id}?confirm=true`
pub async fn remove<B: BackendClient>(
  State(state): State<AppState<B>>,
  admin: Privileged<B>,
  Path(id): Path<String>,
  Query(params): Query<DeleteParams>,
) -> Result<StatusCode> {
  require_confirmation(params.confirm)?;
  admin.gate.authorize_mutation().await?;
  delete_record(state.backend.as_ref(), Collection::Sermons, &id).await?;
  Ok(StatusCode::NO_CONTENT)
}

/// `POST /api/dashboard/sermons/batch-delete`
pub async fn batch_delete<B: BackendClient>(
  State(state): State<AppState<B>>,
  admin: Privileged<B>,
  Json(body): Json<BatchDelete>,
) -> Result<Json<Deleted>> {
  require_confirmation(body.confirm)?;
  admin.gate.authorize_mutation().await?;
  let deleted =
    delete_many(state.backend.as_ref(), Collection::Sermons, &body.ids).await?;
  Ok(Json(deleted))
}
