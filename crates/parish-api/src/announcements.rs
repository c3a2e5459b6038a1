//! Admin handlers for announcements. The dashboard sees inactive ones too.

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
  record::{Announcement, Collection, parse_calendar_date, required},
  store::BackendClient,
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

fn active_by_default() -> bool { true }

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnouncementDraft {
  #[serde(default)]
  pub title:      String,
  #[serde(default)]
  pub content:    String,
  #[serde(default = "active_by_default")]
  pub is_active:  bool,
  #[serde(default)]
  pub start_date: String,
  /// Cleared when blank.
  #[serde(default)]
  pub end_date:   Option<String>,
}

impl AnnouncementDraft {
  /// Both dates must be calendar dates; their order is not checked.
  pub fn validate(self) -> CoreResult<Self> {
    let title = required("title", &self.title)?;
    let content = required("content", &self.content)?;
    let start_date = required("startDate", &self.start_date)?;
    parse_calendar_date("startDate", &start_date)?;
    let end_date = match self.end_date.as_deref().map(str::trim) {
      Some(end) if !end.is_empty() => {
        parse_calendar_date("endDate", end)?;
        Some(end.to_owned())
      }
      _ => None,
    };
    Ok(Self {
      title,
      content,
      is_active: self.is_active,
      start_date,
      end_date,
    })
  }
}

pub fn admin_query(page_size: usize) -> ListQuery {
  ListQuery::new(Collection::Announcements)
    .order_by("startDate", Direction::Desc)
    .page_size(page_size)
}

/// `GET /api/dashboard/announcements`
pub async fn list<B: BackendClient>(
  State(state): State<AppState<B>>,
  _admin: Privileged<B>,
  Query(params): Query<PageParams>,
) -> Result<Json<Page<Announcement>>> {
  let query = admin_query(params.page_size(state.config.page_size))
    .after(params.cursor()?);
  Ok(Json(fetch_page(state.backend.as_ref(), &query).await?))
}

/// `POST /api/dashboard/announcements`
pub async fn create<B: BackendClient>(
  State(state): State<AppState<B>>,
  admin: Privileged<B>,
  Json(draft): Json<AnnouncementDraft>,
) -> Result<impl IntoResponse> {
  let draft = draft.validate()?;
  admin.gate.authorize_mutation().await?;

  let docs = state.backend.as_ref();
  let record = create_record::<Announcement, _>(docs, &draft).await?;
  let page = first_page(docs, &admin_query(state.config.page_size)).await?;
  Ok((StatusCode::CREATED, Json(Saved { record, page })))
}

/// `PUT /api/dashboard/announcements/{id}`
pub async fn update<B: BackendClient>(
  State(state): State<AppState<B>>,
  admin: Privileged<B>,
  Path(id): Path<String>,
  Json(draft): Json<AnnouncementDraft>,
) -> Result<Json<Saved<Announcement>>> {
  let draft = draft.validate()?;
  admin.gate.authorize_mutation().await?;

  let docs = state.backend.as_ref();
  let record = update_record::<Announcement, _>(docs, &id, &draft).await?;
  let page = first_page(docs, &admin_query(state.config.page_size)).await?;
  Ok(Json(Saved { record, page }))
}

/// `DELETE /api/dashboard/announcements/{id}?confirm=true`
pub async fn remove<B: BackendClient>(
  State(state): State<AppState<B>>,
  admin: Privileged<B>,
  Path(id): Path<String>,
  Query(params): Query<DeleteParams>,
) -> Result<StatusCode> {
  require_confirmation(params.confirm)?;
  admin.gate.authorize_mutation().await?;
  delete_record(state.backend.as_ref(), Collection::Announcements, &id).await?;
  Ok(StatusCode::NO_CONTENT)
}

/// `POST /api/dashboard/announcements/batch-delete`
pub async fn batch_delete<B: BackendClient>(
  State(state): State<AppState<B>>,
  admin: Privileged<B>,
  Json(body): Json<BatchDelete>,
) -> Result<Json<Deleted>> {
  require_confirmation(body.confirm)?;
  admin.gate.authorize_mutation().await?;
  let deleted =
    delete_many(state.backend.as_ref(), Collection::Announcements, &body.ids)
      .await?;
  Ok(Json(deleted))
}

#[cfg(test)]
mod tests {
  use parish_core::Error;
  use serde_json::json;

  use super::*;

  #[test]
  fn drafts_default_to_active() {
    let draft: AnnouncementDraft = serde_json::from_value(json!({
      "title": "Bake sale",
      "content": "After the service",
      "startDate": "2024-06-01",
    }))
    .unwrap();
    assert!(draft.is_active);
    assert_eq!(draft.validate().unwrap().end_date, None);
  }

  #[test]
  fn end_dates_are_optional_but_checked() {
    let draft = AnnouncementDraft {
      title:      "Bake sale".into(),
      content:    "After the service".into(),
      is_active:  false,
      start_date: "2024-06-01".into(),
      end_date:   Some("  ".into()),
    };
    assert_eq!(draft.clone().validate().unwrap().end_date, None);

    // An end before the start is accepted.
    let early = AnnouncementDraft {
      end_date: Some("2024-05-01".into()),
      ..draft.clone()
    };
    assert!(early.validate().is_ok());

    let bad = AnnouncementDraft {
      end_date: Some("June".into()),
      ..draft
    };
    assert!(matches!(
      bad.validate(),
      Err(Error::InvalidDate { field: "endDate", .. })
    ));
  }
}
