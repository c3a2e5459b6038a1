//! The ingestion pipeline: count check, then per-file compress and crop on
//! the blocking pool, then parallel upload and URL resolution.
//!
//! Both fan-outs are all-or-nothing joins. When one upload fails the batch
//! fails, but blobs already written by sibling uploads stay in storage.

use chrono::Utc;
use futures::future::try_join_all;
use parish_core::{
  record::MAX_EVENT_IMAGES,
  store::{BlobStore, UploadMetadata},
};
use serde::{Deserialize, Serialize};

use crate::{
  Error, Result,
  compress::{Encoded, compress},
  crop::{CropRegion, crop},
  naming::storage_path,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaConfig {
  pub max_files:     usize,
  /// Per-file target after compression. Best effort only.
  pub max_size_mb:   f64,
  /// Longest side, in pixels, after compression.
  pub max_dimension: u32,
  /// Blob path prefix for uploads.
  pub folder:        String,
}

impl Default for MediaConfig {
  fn default() -> Self {
    Self {
      max_files:     MAX_EVENT_IMAGES,
      max_size_mb:   1.0,
      max_dimension: 1920,
      folder:        "events".to_owned(),
    }
  }
}

impl MediaConfig {
  pub fn max_bytes(&self) -> usize {
    (self.max_size_mb.max(0.0) * 1024.0 * 1024.0) as usize
  }
}

/// One image as received from the uploader.
#[derive(Debug, Clone)]
pub struct RawImage {
  pub file_name:    String,
  pub content_type: String,
  pub bytes:        Vec<u8>,
  pub crop:         Option<CropRegion>,
}

/// An image ready for upload.
#[derive(Debug, Clone)]
pub struct Prepared {
  pub original_name: String,
  pub encoded:       Encoded,
}

#[derive(Debug, Clone, Default)]
pub struct MediaPipeline {
  config: MediaConfig,
}

impl MediaPipeline {
  pub fn new(config: MediaConfig) -> Self { Self { config } }

  pub fn config(&self) -> &MediaConfig { &self.config }

  pub fn check_batch(&self, count: usize) -> Result<()> {
    if count > self.config.max_files {
      return Err(Error::TooManyFiles {
        max: self.config.max_files,
        got: count,
      });
    }
    Ok(())
  }

  /// Compress and crop every image in parallel. Output order matches input.
  pub async fn prepare(&self, images: Vec<RawImage>) -> Result<Vec<Prepared>> {
    self.check_batch(images.len())?;
    let max_bytes = self.config.max_bytes();
    let max_dimension = self.config.max_dimension;

    let tasks = images.into_iter().map(|image| {
      tokio::task::spawn_blocking(move || {
        prepare_one(image, max_bytes, max_dimension)
      })
    });
    try_join_all(tasks).await?.into_iter().collect()
  }

  /// Run the whole pipeline and return one download URL per image, in input
  /// order. Nothing is uploaded unless every image prepared cleanly.
  pub async fn ingest<B: BlobStore>(
    &self,
    blobs: &B,
    owner: &str,
    images: Vec<RawImage>,
  ) -> Result<Vec<String>> {
    if images.is_empty() {
      return Ok(Vec::new());
    }
    let prepared = self.prepare(images).await?;

    let uploaded_at = Utc::now();
    let millis = uploaded_at.timestamp_millis();
    let uploads = prepared.into_iter().enumerate().map(|(index, item)| {
      let Prepared {
        original_name,
        encoded,
      } = item;
      let path =
        storage_path(&self.config.folder, owner, millis, index, &original_name);
      let metadata = UploadMetadata {
        uploaded_by: owner.to_owned(),
        uploaded_at,
        original_name,
      };
      async move {
        let upload_failed = |source: B::Error| Error::Upload {
          path:   path.clone(),
          source: Box::new(source),
        };
        blobs
          .put(&path, &encoded.content_type, encoded.bytes, metadata)
          .await
          .map_err(upload_failed)?;
        let url = blobs
          .download_url(&path)
          .await
          .map_err(upload_failed)?
          .ok_or_else(|| Error::MissingUrl(path.clone()))?;
        tracing::debug!(%path, "image uploaded");
        Ok::<_, Error>(url)
      }
    });

    let urls = try_join_all(uploads).await?;
    tracing::info!(%owner, count = urls.len(), "image batch uploaded");
    Ok(urls)
  }
}

fn prepare_one(
  image: RawImage,
  max_bytes: usize,
  max_dimension: u32,
) -> Result<Prepared> {
  let RawImage {
    file_name,
    content_type,
    bytes,
    crop: region,
  } = image;

  let compressed = compress(
    Encoded {
      bytes,
      content_type,
    },
    max_bytes,
    max_dimension,
  );
  let encoded = match region {
    Some(region) => {
      crop(&compressed, &region).map_err(|reason| Error::InvalidCrop {
        file: file_name.clone(),
        reason,
      })?
    }
    None => compressed,
  };

  Ok(Prepared {
    original_name: file_name,
    encoded,
  })
}

#[cfg(test)]
mod tests {
  use std::io::Cursor;

  use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
  use parish_core::store::{
    Backend, BlobObject, StoredBlob, storage_path_from_reference,
  };
  use parish_store_sqlite::SqliteStore;

  use super::*;

  fn png(name: &str, width: u32, height: u32) -> RawImage {
    let img = RgbImage::from_fn(width, height, |x, y| {
      Rgb([(x % 200) as u8, (y % 200) as u8, 90])
    });
    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(img)
      .write_to(&mut out, ImageFormat::Png)
      .unwrap();
    RawImage {
      file_name:    name.into(),
      content_type: "image/png".into(),
      bytes:        out.into_inner(),
      crop:         None,
    }
  }

  #[tokio::test]
  async fn uploads_resolve_to_urls_in_input_order() {
    let store = SqliteStore::open_in_memory().await.unwrap();
    let pipeline = MediaPipeline::default();
    let urls = pipeline
      .ingest(
        &store,
        "u1",
        vec![png("first pic.png", 32, 32), png("second.png", 16, 16)],
      )
      .await
      .unwrap();
    assert_eq!(urls.len(), 2);

    let first = storage_path_from_reference(&urls[0]).unwrap();
    assert!(first.starts_with("events/u1_"), "{first}");
    assert!(first.ends_with("_0_first_pic.png"), "{first}");
    let second = storage_path_from_reference(&urls[1]).unwrap();
    assert!(second.ends_with("_1_second.png"), "{second}");

    let object = BlobStore::get(&store, &first).await.unwrap().unwrap();
    assert_eq!(object.blob.metadata.uploaded_by, "u1");
    assert_eq!(object.blob.metadata.original_name, "first pic.png");
  }

  #[tokio::test]
  async fn undecodable_images_upload_unchanged_beside_good_ones() {
    let store = SqliteStore::open_in_memory().await.unwrap();
    let garbled = RawImage {
      file_name:    "garbled.png".into(),
      content_type: "image/png".into(),
      bytes:        b"definitely not a png".to_vec(),
      crop:         None,
    };
    let urls = MediaPipeline::default()
      .ingest(&store, "u1", vec![png("good.png", 24, 24), garbled])
      .await
      .unwrap();
    assert_eq!(urls.len(), 2);

    let good = storage_path_from_reference(&urls[0]).unwrap();
    assert!(good.ends_with("_0_good.png"), "{good}");
    let kept = storage_path_from_reference(&urls[1]).unwrap();
    let object = BlobStore::get(&store, &kept).await.unwrap().unwrap();
    assert_eq!(object.bytes, b"definitely not a png");
    assert_eq!(object.blob.content_type, "image/png");
  }

  #[tokio::test]
  async fn oversized_batches_are_refused_whole() {
    let pipeline = MediaPipeline::default();
    let images = (0..6).map(|i| png(&format!("{i}.png"), 4, 4)).collect();
    let err = pipeline.prepare(images).await.unwrap_err();
    assert!(matches!(err, Error::TooManyFiles { max: 5, got: 6 }));
    assert!(err.is_validation());
  }

  #[tokio::test]
  async fn crops_are_applied_after_compression() {
    let pipeline = MediaPipeline::default();
    let mut image = png("wide.png", 400, 200);
    image.crop = Some(CropRegion {
      x:              0.0,
      y:              0.0,
      width:          50.0,
      height:         50.0,
      display_width:  100.0,
      display_height: 50.0,
    });
    let prepared = pipeline.prepare(vec![image]).await.unwrap();
    let img = image::load_from_memory(&prepared[0].encoded.bytes).unwrap();
    assert_eq!((img.width(), img.height()), (200, 200));
  }

  #[tokio::test]
  async fn invalid_crop_rejects_the_batch_before_upload() {
    let store = SqliteStore::open_in_memory().await.unwrap();
    let mut bad = png("bad.png", 40, 40);
    bad.crop = Some(CropRegion {
      x:              0.0,
      y:              0.0,
      width:          0.0,
      height:         10.0,
      display_width:  40.0,
      display_height: 40.0,
    });
    let err = MediaPipeline::default()
      .ingest(&store, "u1", vec![png("ok.png", 8, 8), bad])
      .await
      .unwrap_err();
    assert!(matches!(err, Error::InvalidCrop { ref file, .. } if file == "bad.png"));
  }

  /// Blob store whose writes always fail.
  struct Unwritable;

  #[derive(Debug, thiserror::Error)]
  #[error("storage unavailable")]
  struct Unavailable;

  impl Backend for Unwritable {
    type Error = Unavailable;
  }

  impl BlobStore for Unwritable {
    async fn put(
      &self,
      _path: &str,
      _content_type: &str,
      _bytes: Vec<u8>,
      _metadata: UploadMetadata,
    ) -> Result<StoredBlob, Unavailable> {
      Err(Unavailable)
    }

    async fn download_url(&self, _path: &str) -> Result<Option<String>, Unavailable> {
      Ok(None)
    }

    async fn get(&self, _path: &str) -> Result<Option<BlobObject>, Unavailable> {
      Ok(None)
    }

    async fn delete(&self, _path: &str) -> Result<(), Unavailable> {
      Err(Unavailable)
    }
  }

  #[tokio::test]
  async fn upload_failures_fail_the_batch() {
    let err = MediaPipeline::default()
      .ingest(&Unwritable, "u1", vec![png("a.png", 8, 8)])
      .await
      .unwrap_err();
    assert!(matches!(err, Error::Upload { ref path, .. } if path.ends_with("_0_a.png")));
  }
}
