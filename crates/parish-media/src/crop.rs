//! Crop at natural resolution from a region chosen on a scaled preview.

use std::io::Cursor;

use image::{GenericImageView as _, ImageFormat};
use serde::{Deserialize, Serialize};

use crate::compress::{Encoded, JPEG, encode_jpeg};

const PNG: &str = "image/png";
const CROP_QUALITY: u8 = 90;

/// A rectangle in preview coordinates, plus the size the preview was
/// rendered at.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CropRegion {
  pub x:              f64,
  pub y:              f64,
  pub width:          f64,
  pub height:         f64,
  pub display_width:  f64,
  pub display_height: f64,
}

/// Pixel rectangle in the natural image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelRect {
  pub x:      u32,
  pub y:      u32,
  pub width:  u32,
  pub height: u32,
}

impl CropRegion {
  /// Map the region onto an image of `natural` size, scaling each axis by
  /// `natural / display`. Slivers past the edge from rounding are clipped.
  pub fn to_pixels(&self, natural: (u32, u32)) -> Result<PixelRect, String> {
    let values = [
      self.x,
      self.y,
      self.width,
      self.height,
      self.display_width,
      self.display_height,
    ];
    if values.iter().any(|v| !v.is_finite()) {
      return Err("crop values must be finite numbers".into());
    }
    if self.display_width <= 0.0 || self.display_height <= 0.0 {
      return Err("preview size must be positive".into());
    }
    if self.width <= 0.0 || self.height <= 0.0 {
      return Err("crop must have a positive size".into());
    }
    if self.x < 0.0
      || self.y < 0.0
      || self.x >= self.display_width
      || self.y >= self.display_height
    {
      return Err("crop starts outside the image".into());
    }

    let (natural_w, natural_h) = natural;
    if natural_w == 0 || natural_h == 0 {
      return Err("image is empty".into());
    }
    let scale_x = f64::from(natural_w) / self.display_width;
    let scale_y = f64::from(natural_h) / self.display_height;

    let x = ((self.x * scale_x).round() as u32).min(natural_w.saturating_sub(1));
    let y = ((self.y * scale_y).round() as u32).min(natural_h.saturating_sub(1));
    let width = ((self.width * scale_x).round() as u32)
      .clamp(1, natural_w - x);
    let height = ((self.height * scale_y).round() as u32)
      .clamp(1, natural_h - y);

    Ok(PixelRect {
      x,
      y,
      width,
      height,
    })
  }
}

/// Crop `input`. PNG stays PNG; everything else is written as JPEG.
pub fn crop(input: &Encoded, region: &CropRegion) -> Result<Encoded, String> {
  let img = image::load_from_memory(&input.bytes)
    .map_err(|e| format!("image could not be decoded: {e}"))?;
  let rect = region.to_pixels(img.dimensions())?;
  let cropped = img.crop_imm(rect.x, rect.y, rect.width, rect.height);

  let encoded = if input.content_type == PNG {
    let mut out = Cursor::new(Vec::new());
    cropped
      .write_to(&mut out, ImageFormat::Png)
      .map(|()| Encoded {
        bytes:        out.into_inner(),
        content_type: PNG.to_owned(),
      })
  } else {
    encode_jpeg(&cropped.to_rgb8(), CROP_QUALITY).map(|bytes| Encoded {
      bytes,
      content_type: JPEG.to_owned(),
    })
  };
  encoded.map_err(|e| format!("cropped image could not be encoded: {e}"))
}
