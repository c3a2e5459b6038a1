//! Dashboard overview: collection counts plus the latest sermon and the
//! earliest-labelled event.

use axum::{Json, extract::State};
use parish_core::{
  listing::fetch_page,
  query::{Direction, ListQuery},
  record::{Collection, Event, Sermon},
  store::{BackendClient, DocumentStore},
};
use serde::Serialize;

use crate::{
  AppState,
  auth::Privileged,
  error::{ApiError, Result},
};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Highlight {
  pub title: String,
  pub date:  String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
  pub sermons:        u64,
  pub events:         u64,
  pub announcements:  u64,
  pub recent_sermon:  Option<Highlight>,
  pub upcoming_event: Option<Highlight>,
}

async fn count<D: DocumentStore>(docs: &D, collection: Collection) -> Result<u64> {
  docs.count(collection).await.map_err(ApiError::backend)
}

/// `GET /api/dashboard`
pub async fn stats<B: BackendClient>(
  State(state): State<AppState<B>>,
  _admin: Privileged<B>,
) -> Result<Json<Stats>> {
  let docs = state.backend.as_ref();
  let recent = ListQuery::new(Collection::Sermons)
    .order_by("date", Direction::Desc)
    .page_size(1);
  let upcoming = ListQuery::new(Collection::Events)
    .order_by("date", Direction::Asc)
    .page_size(1);

  let (sermons, events, announcements) = tokio::try_join!(
    count(docs, Collection::Sermons),
    count(docs, Collection::Events),
    count(docs, Collection::Announcements),
  )?;
  let (recent, upcoming) = tokio::try_join!(
    fetch_page::<Sermon, _>(docs, &recent),
    fetch_page::<Event, _>(docs, &upcoming),
  )?;

  Ok(Json(Stats {
    sermons,
    events,
    announcements,
    recent_sermon: recent.items.into_iter().next().map(|s| Highlight {
      title: s.title,
      date:  s.date,
    }),
    upcoming_event: upcoming.items.into_iter().next().map(|e| Highlight {
      title: e.title,
      date:  e.date,
    }),
  }))
}
