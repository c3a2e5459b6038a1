//! Error type for `parish-media`.

use parish_core::error::BoxError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  /// The batch is refused whole; nothing was uploaded.
  #[error("you can only upload up to {max} images (got {got})")]
  TooManyFiles { max: usize, got: usize },

  #[error("invalid crop for {file}: {reason}")]
  InvalidCrop { file: String, reason: String },

  #[error("upload of {path} failed: {source}")]
  Upload {
    path:   String,
    #[source]
    source: BoxError,
  },

  #[error("no download URL for uploaded blob {0}")]
  MissingUrl(String),

  #[error("image processing task failed: {0}")]
  Task(#[from] tokio::task::JoinError),
}

impl Error {
  /// `true` when the batch was rejected before any upload started.
  pub fn is_validation(&self) -> bool {
    matches!(self, Self::TooManyFiles { .. } | Self::InvalidCrop { .. })
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
