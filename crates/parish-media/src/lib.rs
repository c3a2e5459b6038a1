//! Image ingestion for event uploads: compress, optionally crop, upload to
//! the blob store and resolve durable URLs.

pub mod compress;
pub mod crop;
pub mod error;
pub mod naming;
pub mod pipeline;

pub use error::{Error, Result};
pub use pipeline::{MediaConfig, MediaPipeline, RawImage};
