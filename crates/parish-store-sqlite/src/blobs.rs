//! [`BlobStore`] implementation: uploaded files live in the `blobs` table.

use chrono::Utc;
use parish_core::store::{
  BlobObject, BlobStore, MEDIA_ROUTE, StoredBlob, UploadMetadata,
};
use rand_core::{OsRng, RngCore as _};
use rusqlite::OptionalExtension as _;
use sha2::{Digest as _, Sha256};

use crate::{
  Error, Result, SqliteStore,
  encode::{RawBlob, decode_dt, encode_dt},
};

/// Random hex token, used for download tokens and session tokens.
pub(crate) fn random_token() -> String {
  let mut buf = [0u8; 24];
  OsRng.fill_bytes(&mut buf);
  hex::encode(buf)
}

impl SqliteStore {
  fn media_url(&self, path: &str, token: &str) -> String {
    format!("{}{MEDIA_ROUTE}{path}?token={token}", self.base_url)
  }

  /// Number of stored blobs.
  pub async fn blob_count(&self) -> Result<u64> {
    let count: i64 = self
      .conn
      .call(|conn| {
        Ok(conn.query_row("SELECT COUNT(*) FROM blobs", [], |row| row.get(0))?)
      })
      .await?;
    Ok(u64::try_from(count).unwrap_or(0))
  }
}

impl BlobStore for SqliteStore {
  async fn put(
    &self,
    path: &str,
    content_type: &str,
    bytes: Vec<u8>,
    metadata: UploadMetadata,
  ) -> Result<StoredBlob> {
    // Truncate to the stored precision so the returned descriptor matches
    // what `get` reads back.
    let created_at = decode_dt(&encode_dt(Utc::now()))?;
    let blob = StoredBlob {
      path: path.to_owned(),
      content_type: content_type.to_owned(),
      size: bytes.len() as u64,
      content_hash: hex::encode(Sha256::digest(&bytes)),
      download_token: random_token(),
      metadata,
      created_at,
    };

    let path_str     = blob.path.clone();
    let type_str     = blob.content_type.clone();
    let size         = i64::try_from(blob.size).unwrap_or(i64::MAX);
    let hash_str     = blob.content_hash.clone();
    let token_str    = blob.download_token.clone();
    let metadata_str = serde_json::to_string(&blob.metadata)?;
    let at_str       = encode_dt(blob.created_at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT OR REPLACE INTO blobs (
             path, content_type, size, content_hash, download_token,
             metadata, created_at, bytes
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
          rusqlite::params![
            path_str,
            type_str,
            size,
            hash_str,
            token_str,
            metadata_str,
            at_str,
            bytes,
          ],
        )?;
        Ok(())
      })
      .await?;

    tracing::debug!(path = %blob.path, size = blob.size, "blob stored");
    Ok(blob)
  }

  async fn download_url(&self, path: &str) -> Result<Option<String>> {
    let path_owned = path.to_owned();
    let token: Option<String> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT download_token FROM blobs WHERE path = ?1",
              rusqlite::params![path_owned],
              |row| row.get(0),
            )
            .optional()?,
        )
      })
      .await?;

    Ok(token.map(|token| self.media_url(path, &token)))
  }

  async fn get(&self, path: &str) -> Result<Option<BlobObject>> {
    let path_owned = path.to_owned();
    let raw: Option<(RawBlob, Vec<u8>)> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!(
                "SELECT {}, bytes FROM blobs WHERE path = ?1",
                RawBlob::COLUMNS
              ),
              rusqlite::params![path_owned],
              |row| Ok((RawBlob::from_row(row)?, row.get(7)?)),
            )
            .optional()?,
        )
      })
      .await?;

    raw
      .map(|(raw, bytes)| {
        Ok(BlobObject {
          blob: raw.into_blob()?,
          bytes,
        })
      })
      .transpose()
  }

  async fn delete(&self, path: &str) -> Result<()> {
    let path_owned = path.to_owned();
    let removed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "DELETE FROM blobs WHERE path = ?1",
          rusqlite::params![path_owned],
        )?)
      })
      .await?;

    if removed == 0 {
      return Err(Error::BlobNotFound(path.to_owned()));
    }
    tracing::debug!(%path, "blob deleted");
    Ok(())
  }
}
