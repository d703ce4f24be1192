//! Receipt image preparation before upload or local queueing.
//!
//! Uploads are size-capped and normalized to JPEG so a cached receipt photo
//! never dominates the local store. Downscaling preserves aspect ratio.

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use tracing::debug;

use crate::config::OfflineConfig;
use crate::error::{Error, Result};

/// A receipt image ready for upload: normalized JPEG bytes.
#[derive(Debug, Clone)]
pub struct PreparedImage {
  pub bytes: Vec<u8>,
  pub content_type: &'static str,
}

/// Validate, downscale, and re-encode an uploaded image.
///
/// Rejects inputs over the configured size cap or that fail to decode as an
/// image. The output is always JPEG regardless of the input format.
pub fn prepare_upload(input: &[u8], config: &OfflineConfig) -> Result<PreparedImage> {
  let max_bytes = config.max_upload_mb * 1024 * 1024;
  if input.len() as u64 > max_bytes {
    return Err(Error::Validation(format!(
      "image is {} bytes, which exceeds the {} MB upload limit",
      input.len(),
      config.max_upload_mb
    )));
  }

  let mut img = image::load_from_memory(input)
    .map_err(|e| Error::Validation(format!("not a decodable image: {}", e)))?;

  if img.width() > config.image_max_width {
    let scale = config.image_max_width as f64 / img.width() as f64;
    let height = ((img.height() as f64 * scale).round() as u32).max(1);
    debug!(
      from = img.width(),
      to = config.image_max_width,
      "downscaling image"
    );
    img = img.resize_exact(config.image_max_width, height, FilterType::Triangle);
  }

  // JPEG has no alpha channel; flatten before encoding.
  let rgb = img.to_rgb8();
  let quality = (config.image_quality * 100.0).clamp(1.0, 100.0) as u8;
  let mut bytes = Vec::new();
  JpegEncoder::new_with_quality(&mut bytes, quality)
    .encode_image(&rgb)
    .map_err(|e| Error::Validation(format!("failed to encode image: {}", e)))?;

  Ok(PreparedImage {
    bytes,
    content_type: "image/jpeg",
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::RgbImage;

  fn png_of_width(width: u32) -> Vec<u8> {
    let img = RgbImage::from_fn(width, width / 2, |x, _| image::Rgb([(x % 256) as u8, 80, 40]));
    let mut bytes = Vec::new();
    image::DynamicImage::ImageRgb8(img)
      .write_to(
        &mut std::io::Cursor::new(&mut bytes),
        image::ImageFormat::Png,
      )
      .unwrap();
    bytes
  }

  #[test]
  fn test_oversized_input_is_rejected() {
    let config = OfflineConfig {
      max_upload_mb: 1,
      ..Default::default()
    };
    let blob = vec![0u8; 2 * 1024 * 1024];
    let err = prepare_upload(&blob, &config).unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
  }

  #[test]
  fn test_garbage_input_is_rejected() {
    let err = prepare_upload(b"not an image", &OfflineConfig::default()).unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
  }

  #[test]
  fn test_wide_image_is_downscaled_to_max_width() {
    let config = OfflineConfig {
      image_max_width: 64,
      ..Default::default()
    };
    let prepared = prepare_upload(&png_of_width(256), &config).unwrap();
    assert_eq!(prepared.content_type, "image/jpeg");

    let reloaded = image::load_from_memory(&prepared.bytes).unwrap();
    assert_eq!(reloaded.width(), 64);
    // Aspect ratio preserved.
    assert_eq!(reloaded.height(), 32);
  }

  #[test]
  fn test_small_image_keeps_its_dimensions() {
    let prepared = prepare_upload(&png_of_width(100), &OfflineConfig::default()).unwrap();
    let reloaded = image::load_from_memory(&prepared.bytes).unwrap();
    assert_eq!(reloaded.width(), 100);
    assert_eq!(reloaded.height(), 50);
  }
}
