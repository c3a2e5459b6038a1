//! The list/filter/paginate engine.
//!
//! Ordering, filtering and continuation are delegated to the backend's
//! [`DocumentStore::query`]; this module validates queries, derives
//! continuation cursors and decodes documents into records.
//!
//! [`local_search`] runs over an already-fetched page only. It is not a
//! global search: a match that lives on a page the caller has not loaded yet
//! will not show up until that page is fetched.

use crate::{
  Error, Result,
  query::{Cursor, ListQuery, Page},
  record::{Record, Searchable},
  store::DocumentStore,
};

/// Fetch one page of `T`.
///
/// The returned cursor is derived from the last document of the page and is
/// `None` exactly when fewer than `query.page_size` documents came back. A
/// full final page therefore still yields a cursor, whose follow-up page is
/// empty.
pub async fn fetch_page<T, D>(store: &D, query: &ListQuery) -> Result<Page<T>>
where
  T: Record,
  D: DocumentStore,
{
  check_collection::<T>(query)?;
  query.validate()?;

  let docs = store
    .query(query, Some(query.page_size))
    .await
    .map_err(Error::backend)?;

  let next_cursor = if docs.len() < query.page_size {
    None
  } else {
    docs.last().and_then(|doc| Cursor::after(doc, &query.order))
  };

  let items = docs
    .into_iter()
    .map(T::from_document)
    .collect::<Result<Vec<_>>>()?;

  Ok(Page { items, next_cursor })
}

/// Fetch every matching `T` in one unpaged query. The query's page size is
/// ignored; its cursor, if any, still applies.
pub async fn fetch_all<T, D>(store: &D, query: &ListQuery) -> Result<Vec<T>>
where
  T: Record,
  D: DocumentStore,
{
  check_collection::<T>(query)?;
  query.validate()?;

  store
    .query(query, None)
    .await
    .map_err(Error::backend)?
    .into_iter()
    .map(T::from_document)
    .collect()
}

/// Fetch a single record by id.
pub async fn fetch_one<T, D>(store: &D, id: &str) -> Result<Option<T>>
where
  T: Record,
  D: DocumentStore,
{
  store
    .get(T::COLLECTION, id)
    .await
    .map_err(Error::backend)?
    .map(T::from_document)
    .transpose()
}

/// Keep only the items whose searchable fields contain `term`,
/// case-insensitively. A blank term keeps everything.
pub fn local_search<T: Searchable>(items: Vec<T>, term: &str) -> Vec<T> {
  let needle = term.trim().to_lowercase();
  if needle.is_empty() {
    return items;
  }
  items
    .into_iter()
    .filter(|item| item.matches(&needle))
    .collect()
}

fn check_collection<T: Record>(query: &ListQuery) -> Result<()> {
  if query.collection != T::COLLECTION {
    return Err(Error::InvalidQuery(format!(
      "query targets `{}` but records are read from `{}`",
      query.collection,
      T::COLLECTION
    )));
  }
  Ok(())
}
