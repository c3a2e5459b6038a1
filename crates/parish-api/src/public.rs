//! Read-only handlers for the public site.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/api/home` | Latest sermons, newest events, active announcements |
//! | `GET`  | `/api/sermons` | Archive: `sort`, `startDate`, `endDate`, `q`, `cursor`, `limit` |
//! | `GET`  | `/api/sermons/{id}` | |
//! | `GET`  | `/api/events` | Newest first, paged |
//! | `GET`  | `/api/events/{id}` | |
//! | `GET`  | `/api/announcements` | Active only, unpaged |

use axum::{
  Json,
  extract::{Path, Query, State},
};
use parish_core::{
  listing::{fetch_all, fetch_one, fetch_page, local_search},
  query::{Direction, FilterOp, ListQuery, Page},
  record::{Announcement, Collection, Event, Record, Sermon, parse_calendar_date},
  store::BackendClient,
};
use serde::{Deserialize, Serialize};

use crate::{
  AppState,
  content::{PageParams, not_found},
  error::Result,
};

pub const HOME_SERMONS: usize = 6;
pub const HOME_EVENTS: usize = 3;

// ─── Queries ─────────────────────────────────────────────────────────────────

pub fn latest_sermons(limit: usize) -> ListQuery {
  ListQuery::new(Collection::Sermons)
    .order_by("date", Direction::Desc)
    .page_size(limit)
}

pub fn newest_events(limit: usize) -> ListQuery {
  ListQuery::new(Collection::Events)
    .order_by("createdAt", Direction::Desc)
    .page_size(limit)
}

pub fn active_announcements() -> ListQuery {
  ListQuery::new(Collection::Announcements)
    .filter("isActive", FilterOp::Eq, true)
    .order_by("startDate", Direction::Desc)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveSort {
  #[default]
  Newest,
  Oldest,
  Preacher,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveParams {
  #[serde(default)]
  pub sort:       ArchiveSort,
  pub start_date: Option<String>,
  pub end_date:   Option<String>,
  /// Matched against the returned page only.
  pub q:          Option<String>,
  pub cursor:     Option<String>,
  pub limit:      Option<usize>,
}

impl ArchiveParams {
  /// Build the archive query. Sorting by preacher cannot be combined with a
  /// date range; the query fails validation in that case.
  pub fn query(&self, default_page_size: usize) -> Result<ListQuery> {
    let page = PageParams {
      cursor: self.cursor.clone(),
      limit:  self.limit,
    };
    let mut query = ListQuery::new(Collection::Sermons);
    query = match self.sort {
      ArchiveSort::Newest => query.order_by("date", Direction::Desc),
      ArchiveSort::Oldest => query.order_by("date", Direction::Asc),
      ArchiveSort::Preacher => query
        .order_by("preacher", Direction::Asc)
        .order_by("date", Direction::Desc),
    };
    if let Some(start) = non_blank(&self.start_date) {
      parse_calendar_date("startDate", start)?;
      query = query.filter("date", FilterOp::Ge, start);
    }
    if let Some(end) = non_blank(&self.end_date) {
      parse_calendar_date("endDate", end)?;
      query = query.filter("date", FilterOp::Le, end);
    }
    Ok(
      query
        .page_size(page.page_size(default_page_size))
        .after(page.cursor()?),
    )
  }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
  value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

// ─── Handlers ────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Home {
  pub sermons:       Vec<Sermon>,
  pub events:        Vec<Event>,
  pub announcements: Vec<Announcement>,
}

/// `GET /api/home`
pub async fn home<B: BackendClient>(
  State(state): State<AppState<B>>,
) -> Result<Json<Home>> {
  let docs = state.backend.as_ref();
  let sermons_query = latest_sermons(HOME_SERMONS);
  let events_query = newest_events(HOME_EVENTS);
  let announcements_query = active_announcements();
  let (sermons, events, announcements) = tokio::try_join!(
    fetch_page::<Sermon, _>(docs, &sermons_query),
    fetch_page::<Event, _>(docs, &events_query),
    fetch_all::<Announcement, _>(docs, &announcements_query),
  )?;
  Ok(Json(Home {
    sermons: sermons.items,
    events: events.items,
    announcements,
  }))
}

/// `GET /api/sermons`
///
/// `q` narrows the fetched page; `nextCursor` still continues the
/// unfiltered listing.
pub async fn sermons<B: BackendClient>(
  State(state): State<AppState<B>>,
  Query(params): Query<ArchiveParams>,
) -> Result<Json<Page<Sermon>>> {
  let query = params.query(state.config.page_size)?;
  let Page { items, next_cursor } =
    fetch_page(state.backend.as_ref(), &query).await?;
  let items = match params.q.as_deref() {
    Some(term) => local_search(items, term),
    None => items,
  };
  Ok(Json(Page { items, next_cursor }))
}

/// `GET /api/sermons/{id}`
pub async fn sermon<B: BackendClient>(
  State(state): State<AppState<B>>,
  Path(id): Path<String>,
) -> Result<Json<Sermon>> {
  one(&state, &id).await.map(Json)
}

/// `GET /api/events`
pub async fn events<B: BackendClient>(
  State(state): State<AppState<B>>,
  Query(params): Query<PageParams>,
) -> Result<Json<Page<Event>>> {
  let query = newest_events(params.page_size(state.config.page_size))
    .after(params.cursor()?);
  Ok(Json(fetch_page(state.backend.as_ref(), &query).await?))
}

/// `GET /api/events/{id}`
pub async fn event<B: BackendClient>(
  State(state): State<AppState<B>>,
  Path(id): Path<String>,
) -> Result<Json<Event>> {
  one(&state, &id).await.map(Json)
}

/// `GET /api/announcements`
pub async fn announcements<B: BackendClient>(
  State(state): State<AppState<B>>,
) -> Result<Json<Vec<Announcement>>> {
  Ok(Json(
    fetch_all(state.backend.as_ref(), &active_announcements()).await?,
  ))
}

async fn one<T: Record, B: BackendClient>(
  state: &AppState<B>,
  id: &str,
) -> Result<T> {
  fetch_one::<T, _>(state.backend.as_ref(), id)
    .await?
    .ok_or_else(|| not_found(T::COLLECTION, id))
}

#[cfg(test)]
mod tests {
  use parish_core::Error;

  use super::*;

  #[test]
  fn date_ranges_filter_the_date_order_key() {
    let params = ArchiveParams {
      start_date: Some("2024-01-01".into()),
      end_date: Some("2024-12-31".into()),
      ..Default::default()
    };
    let query = params.query(9).unwrap();
    assert_eq!(query.filters.len(), 2);
    assert!(query.validate().is_ok());
  }

  #[test]
  fn preacher_sort_with_a_date_range_is_rejected() {
    let params = ArchiveParams {
      sort: ArchiveSort::Preacher,
      start_date: Some("2024-01-01".into()),
      ..Default::default()
    };
    let query = params.query(9).unwrap();
    assert!(matches!(query.validate(), Err(Error::InvalidQuery(_))));
  }

  #[test]
  fn blank_dates_are_ignored() {
    let params = ArchiveParams {
      start_date: Some("  ".into()),
      ..Default::default()
    };
    assert!(params.query(9).unwrap().filters.is_empty());
  }
}
