//! Synthetic image fixtures
//!
//! Deterministic gradients so identical parameters produce identical
//! bytes (and therefore identical fingerprints).

use image::codecs::jpeg::JpegEncoder;
use image::{Rgb, RgbImage};
use std::path::{Path, PathBuf};

/// Diagonal gradient tinted by `seed`
pub fn gradient(width: u32, height: u32, seed: u8) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        let r = ((x * 255) / width.max(1)) as u8;
        let g = ((y * 255) / height.max(1)) as u8;
        Rgb([r, g, seed.wrapping_mul(37)])
    })
}

/// Write a PNG gradient and return its path
pub fn write_png(dir: &Path, name: &str, width: u32, height: u32, seed: u8) -> PathBuf {
    let path = dir.join(name);
    gradient(width, height, seed).save(&path).unwrap();
    path
}

/// Write a JPEG gradient at quality 85 and return its path
pub fn write_jpeg(dir: &Path, name: &str, width: u32, height: u32, seed: u8) -> PathBuf {
    let path = dir.join(name);
    let mut bytes = Vec::new();
    JpegEncoder::new_with_quality(&mut bytes, 85)
        .encode_image(&gradient(width, height, seed))
        .unwrap();
    std::fs::write(&path, bytes).unwrap();
    path
}

/// Write bytes that no decoder accepts
pub fn write_garbage(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, b"this is not an image at all").unwrap();
    path
}
