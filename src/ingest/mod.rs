//! Upload preparation: size validation, decoding, orientation and resizing.
//!
//! [`prepare`] stops at the full-resolution image and its hash so duplicates
//! can be rejected before [`resize_to_fit`] does any work.

pub mod discovery;
pub mod hashing;

use image::imageops::FilterType;
use image::DynamicImage;
use std::io::Cursor;

use crate::config::UploadConfig;
use crate::error::ValidationError;

pub use discovery::discover_images;
pub use hashing::content_hash;

/// A decoded, normalised upload.
#[derive(Debug, Clone)]
pub struct PreparedImage {
    /// Orientation-corrected RGB image at full resolution
    pub image: DynamicImage,
    /// Hash of the full-resolution normalised pixels
    pub content_hash: String,
}

/// Reject uploads larger than the configured limit.
pub fn validate_size(bytes: &[u8], config: &UploadConfig) -> Result<(), ValidationError> {
    let limit_bytes = config.max_image_size_kb.saturating_mul(1024);
    if bytes.len() as u64 > limit_bytes {
        return Err(ValidationError::ImageTooLarge {
            size_kb: (bytes.len() as u64).div_ceil(1024),
            limit_kb: config.max_image_size_kb,
        });
    }
    Ok(())
}

/// Decode, orient and hash an upload.
pub fn prepare(bytes: &[u8], config: &UploadConfig) -> Result<PreparedImage, ValidationError> {
    validate_size(bytes, config)?;

    let decoded = image::load_from_memory(bytes)
        .map_err(|e| ValidationError::InvalidImage(e.to_string()))?;
    let oriented = apply_rotation(decoded, read_exif_rotation(bytes));
    let rgb = oriented.to_rgb8();
    let content_hash = content_hash(&rgb);

    Ok(PreparedImage {
        image: DynamicImage::ImageRgb8(rgb),
        content_hash,
    })
}

/// Downscale so the longest side is at most `max_dimension`, preserving aspect ratio.
pub fn resize_to_fit(image: DynamicImage, max_dimension: u32) -> DynamicImage {
    let (width, height) = (image.width(), image.height());
    let longest = width.max(height);
    if max_dimension == 0 || longest <= max_dimension {
        return image;
    }

    let scale = max_dimension as f64 / longest as f64;
    let new_width = ((width as f64 * scale) as u32).max(1);
    let new_height = ((height as f64 * scale) as u32).max(1);
    image.resize_exact(new_width, new_height, FilterType::Lanczos3)
}

/// Convert EXIF orientation value (1-8) to rotation degrees (0, 90, 180, 270)
fn exif_orientation_to_degrees(orientation: u32) -> u32 {
    match orientation {
        6 => 90,  // Rotate 90 CW
        3 => 180, // Rotate 180
        8 => 270, // Rotate 90 CCW
        _ => 0,   // Normal (1) or other values
    }
}

/// Read EXIF orientation from in-memory image bytes; missing or unreadable EXIF means no rotation.
fn read_exif_rotation(bytes: &[u8]) -> u32 {
    let mut reader = Cursor::new(bytes);
    let exif = match exif::Reader::new().read_from_container(&mut reader) {
        Ok(e) => e,
        Err(_) => return 0,
    };

    exif.get_field(exif::Tag::Orientation, exif::In::PRIMARY)
        .and_then(|field| field.value.get_uint(0))
        .map(exif_orientation_to_degrees)
        .unwrap_or(0)
}

fn apply_rotation(image: DynamicImage, degrees: u32) -> DynamicImage {
    match degrees {
        90 => image.rotate90(),
        180 => image.rotate180(),
        270 => image.rotate270(),
        _ => image,
    }
}
