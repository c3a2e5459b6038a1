//! Serves stored blobs at the download URLs handed out on upload.

use axum::{
  extract::{Path, Query, State},
  http::header,
  response::IntoResponse,
};
use parish_core::store::{BackendClient, BlobStore};
use serde::Deserialize;
use subtle::ConstantTimeEq as _;

use crate::{
  AppState,
  error::{ApiError, Result},
};

#[derive(Debug, Deserialize)]
pub struct MediaParams {
  #[serde(default)]
  pub token: String,
}

/// `GET /media/{*path}?token=...`
///
/// A wrong or missing token looks exactly like a missing blob.
pub async fn serve<B: BackendClient>(
  State(state): State<AppState<B>>,
  Path(path): Path<String>,
  Query(params): Query<MediaParams>,
) -> Result<impl IntoResponse> {
  let object = BlobStore::get(state.backend.as_ref(), &path)
    .await
    .map_err(ApiError::backend)?
    .filter(|object| token_matches(&object.blob.download_token, &params.token))
    .ok_or_else(|| ApiError::NotFound(format!("no media at {path}")))?;
  Ok((
    [
      (header::CONTENT_TYPE, object.blob.content_type),
      (header::CACHE_CONTROL, "public, max-age=31536000".to_owned()),
    ],
    object.bytes,
  ))
}

/// Compare download tokens in constant time.
fn token_matches(expected: &str, given: &str) -> bool {
  expected.len() == given.len()
    && bool::from(expected.as_bytes().ct_eq(given.as_bytes()))
}
