use image::RgbImage;
use md5::{Digest, Md5};

/// Content hash of decoded pixels: MD5 over the dimensions and raw RGB8 bytes.
///
/// Two files that decode to the same pixels hash equally regardless of
/// filename, container or metadata.
pub fn content_hash(pixels: &RgbImage) -> String {
    let mut hasher = Md5::new();
    let (width, height) = pixels.dimensions();
    hasher.update(width.to_le_bytes());
    hasher.update(height.to_le_bytes());
    hasher.update(pixels.as_raw());
    format!("{:x}", hasher.finalize())
}
