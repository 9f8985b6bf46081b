//! Page thumbnails
//!
//! Page images are shrunk to a fixed width and re-encoded as JPEG data
//! URLs, so the view can show them whatever host they were served from.

use base64::Engine;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageError, ImageFormat};

/// Default thumbnail width in pixels
pub const THUMBNAIL_MAX_WIDTH: u32 = 150;

/// JPEG quality of encoded thumbnails
pub const THUMBNAIL_QUALITY: u8 = 75;

/// Shrink an encoded image to `max_width` and return it as a data URL
///
/// The height keeps the aspect ratio. `content_type` is only a hint; a body
/// that does not match it is decoded by sniffing.
pub fn thumbnail_data_url(data: &[u8], content_type: Option<&str>, max_width: u32) -> Result<String, ImageError> {
    let image = decode(data, content_type)?;
    let width = max_width.max(1);
    let height = (u64::from(image.height()) * u64::from(width) / u64::from(image.width().max(1))).max(1) as u32;

    let resized = image.resize_exact(width, height, FilterType::Lanczos3);
    let rgb = DynamicImage::ImageRgb8(resized.to_rgb8());

    let mut out = Vec::new();
    rgb.write_with_encoder(JpegEncoder::new_with_quality(&mut out, THUMBNAIL_QUALITY))?;

    tracing::debug!(width, height, size = out.len(), "Encoded thumbnail");
    Ok(format!(
        "data:image/jpeg;base64,{}",
        base64::engine::general_purpose::STANDARD.encode(&out)
    ))
}

fn decode(data: &[u8], content_type: Option<&str>) -> Result<DynamicImage, ImageError> {
    let hinted = content_type
        .and_then(|ct| ct.split(';').next())
        .map(str::trim)
        .and_then(ImageFormat::from_mime_type);

    match hinted {
        Some(format) => image::load_from_memory_with_format(data, format).or_else(|_| image::load_from_memory(data)),
        None => image::load_from_memory(data),
    }
}
