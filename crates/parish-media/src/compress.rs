//! Best-effort compression: fit within a pixel box and a byte budget.
//!
//! Compression never fails the pipeline. Anything that cannot be decoded or
//! re-encoded is passed through untouched.

use image::{
  ColorType, GenericImageView as _, ImageResult, RgbImage,
  codecs::jpeg::JpegEncoder, imageops::FilterType,
};

pub const JPEG: &str = "image/jpeg";

/// Qualities tried in order until the output fits the byte budget.
const QUALITY_STEPS: [u8; 6] = [90, 80, 70, 60, 50, 40];

/// Encoded image bytes and their content type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Encoded {
  pub bytes:        Vec<u8>,
  pub content_type: String,
}

pub fn encode_jpeg(rgb: &RgbImage, quality: u8) -> ImageResult<Vec<u8>> {
  let mut out = Vec::new();
  JpegEncoder::new_with_quality(&mut out, quality).encode(
    rgb.as_raw(),
    rgb.width(),
    rgb.height(),
    ColorType::Rgb8.into(),
  )?;
  Ok(out)
}

/// Shrink `input` to at most `max_dimension` on its longer side and, where
/// possible, at most `max_bytes`. The byte budget is a target, not a
/// guarantee: the smallest attempt is kept even if it is still over.
pub fn compress(input: Encoded, max_bytes: usize, max_dimension: u32) -> Encoded {
  match try_compress(&input.bytes, max_bytes, max_dimension) {
    Ok(Some(out)) => out,
    Ok(None) => input,
    Err(err) => {
      tracing::warn!(
        content_type = %input.content_type,
        error = %err,
        "compression failed; keeping original bytes"
      );
      input
    }
  }
}

/// `Ok(None)` means the original is already within both limits, or
/// re-encoding would not make it smaller.
fn try_compress(
  bytes: &[u8],
  max_bytes: usize,
  max_dimension: u32,
) -> ImageResult<Option<Encoded>> {
  let img = image::load_from_memory(bytes)?;
  let (width, height) = img.dimensions();
  let oversized = width > max_dimension || height > max_dimension;
  if !oversized && bytes.len() <= max_bytes {
    return Ok(None);
  }

  let img = if oversized {
    img.resize(max_dimension, max_dimension, FilterType::Lanczos3)
  } else {
    img
  };
  let rgb = img.to_rgb8();

  let mut smallest: Option<Vec<u8>> = None;
  for quality in QUALITY_STEPS {
    let out = encode_jpeg(&rgb, quality)?;
    let fits = out.len() <= max_bytes;
    if smallest.as_ref().is_none_or(|best| out.len() < best.len()) {
      smallest = Some(out);
    }
    if fits {
      break;
    }
  }

  Ok(
    smallest
      .filter(|out| oversized || out.len() < bytes.len())
      .map(|bytes| Encoded {
        bytes,
        content_type: JPEG.to_owned(),
      }),
  )
}
