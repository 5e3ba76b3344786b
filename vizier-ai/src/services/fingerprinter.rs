//! Content fingerprinting
//!
//! The SHA-256 digest of a file's bytes is the dedup key. Perceptual hashes
//! (average, difference, DCT) are computed from the decoded image for
//! near-duplicate discovery only.

use crate::error::{PipelineError, PipelineResult};
use crate::models::PerceptualHashes;
use image::imageops::FilterType;
use image::DynamicImage;
use sha2::{Digest, Sha256};
use std::path::Path;

const CHUNK_SIZE: usize = 1024 * 1024;

/// Content identity of one file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileFingerprint {
    /// Lowercase hex SHA-256 of the file bytes
    pub digest: String,
    pub byte_size: u64,
}

/// Computes content fingerprints and perceptual hashes
#[derive(Debug, Clone, Copy, Default)]
pub struct ContentFingerprinter;

impl ContentFingerprinter {
    pub fn new() -> Self {
        Self
    }

    /// SHA-256 of a file, streamed in 1MB chunks on the blocking pool
    pub async fn fingerprint_file(&self, path: &Path) -> PipelineResult<FileFingerprint> {
        let path_buf = path.to_path_buf();
        tracing::debug!(path = %path_buf.display(), "Calculating SHA-256 fingerprint");

        let task_path = path_buf.clone();
        let fingerprint = tokio::task::spawn_blocking(move || hash_file(&task_path))
            .await
            .map_err(|e| PipelineError::Read {
                path: path_buf.clone(),
                detail: format!("Hash task failed: {}", e),
            })??;

        tracing::debug!(
            path = %path_buf.display(),
            fingerprint = %fingerprint.digest,
            byte_size = fingerprint.byte_size,
            "Calculated fingerprint"
        );

        Ok(fingerprint)
    }

    /// SHA-256 of an in-memory buffer
    pub fn fingerprint_bytes(bytes: &[u8]) -> String {
        format!("{:x}", Sha256::digest(bytes))
    }

    /// Average, difference and DCT hashes of a decoded image
    pub fn perceptual_hashes(image: &DynamicImage) -> PerceptualHashes {
        PerceptualHashes {
            average: to_hex(average_hash(image)),
            difference: to_hex(difference_hash(image)),
            frequency: to_hex(dct_hash(image)),
        }
    }
}

fn hash_file(path: &Path) -> PipelineResult<FileFingerprint> {
    use std::fs::File;
    use std::io::Read;

    let read_error = |e: std::io::Error| PipelineError::Read {
        path: path.to_path_buf(),
        detail: e.to_string(),
    };

    let mut file = File::open(path).map_err(read_error)?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; CHUNK_SIZE];
    let mut byte_size = 0u64;

    loop {
        let bytes_read = file.read(&mut buffer).map_err(read_error)?;
        if bytes_read == 0 {
            break;
        }
        byte_size += bytes_read as u64;
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(FileFingerprint {
        digest: format!("{:x}", hasher.finalize()),
        byte_size,
    })
}

/// 8×8 grayscale, bit set where pixel exceeds the mean
fn average_hash(image: &DynamicImage) -> u64 {
    let small = image.resize_exact(8, 8, FilterType::Triangle).to_luma8();
    let pixels: Vec<u32> = small.pixels().map(|p| p[0] as u32).collect();
    let mean = pixels.iter().sum::<u32>() as f64 / pixels.len() as f64;
    pixels
        .iter()
        .fold(0u64, |hash, &p| (hash << 1) | ((p as f64 > mean) as u64))
}

/// 9×8 grayscale, bit set where a pixel is brighter than its left neighbour
fn difference_hash(image: &DynamicImage) -> u64 {
    let small = image.resize_exact(9, 8, FilterType::Triangle).to_luma8();
    let mut hash = 0u64;
    for y in 0..8 {
        for x in 0..8 {
            let left = small.get_pixel(x, y)[0];
            let right = small.get_pixel(x + 1, y)[0];
            hash = (hash << 1) | ((right > left) as u64);
        }
    }
    hash
}

/// 32×32 grayscale DCT, top-left 8×8 coefficients against their median
fn dct_hash(image: &DynamicImage) -> u64 {
    const N: usize = 32;
    let small = image.resize_exact(N as u32, N as u32, FilterType::Triangle).to_luma8();

    let mut matrix = [[0f64; N]; N];
    for (x, y, pixel) in small.enumerate_pixels() {
        matrix[y as usize][x as usize] = pixel[0] as f64;
    }

    // Separable DCT-II: columns, then rows
    let mut columns = [[0f64; N]; N];
    for x in 0..N {
        let column: Vec<f64> = (0..N).map(|y| matrix[y][x]).collect();
        let transformed = dct_1d(&column);
        for y in 0..N {
            columns[y][x] = transformed[y];
        }
    }

    let mut low = Vec::with_capacity(64);
    for row in columns.iter().take(8) {
        let transformed = dct_1d(row);
        low.extend_from_slice(&transformed[..8]);
    }

    let mut sorted = low.clone();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let median = (sorted[31] + sorted[32]) / 2.0;

    low.iter()
        .fold(0u64, |hash, &c| (hash << 1) | ((c > median) as u64))
}

fn dct_1d(input: &[f64]) -> Vec<f64> {
    let n = input.len() as f64;
    (0..input.len())
        .map(|k| {
            input
                .iter()
                .enumerate()
                .map(|(i, v)| {
                    v * (std::f64::consts::PI / n * (i as f64 + 0.5) * k as f64).cos()
                })
                .sum()
        })
        .collect()
}

fn to_hex(hash: u64) -> String {
    format!("{:016x}", hash)
}

/// Bit distance between two 16-hex-char hashes; `None` if either is malformed
pub fn hamming_distance(a: &str, b: &str) -> Option<u32> {
    let a = u64::from_str_radix(a, 16).ok()?;
    let b = u64::from_str_radix(b, 16).ok()?;
    Some((a ^ b).count_ones())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn gradient(width: u32, height: u32, invert: bool) -> DynamicImage {
        let img = RgbImage::from_fn(width, height, |x, y| {
            let v = ((x * 255) / width.max(1)) as u8;
            let v = if invert { 255 - v } else { v };
            Rgb([v, v / 2, ((y * 255) / height.max(1)) as u8])
        });
        DynamicImage::ImageRgb8(img)
    }

    #[test]
    fn test_fingerprint_bytes_deterministic() {
        let data = b"identical content".to_vec();
        let a = ContentFingerprinter::fingerprint_bytes(&data);
        let b = ContentFingerprinter::fingerprint_bytes(&data);
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);

        let mut mutated = data.clone();
        mutated[0] ^= 0x01;
        assert_ne!(a, ContentFingerprinter::fingerprint_bytes(&mutated));
    }

    #[tokio::test]
    async fn test_fingerprint_file_matches_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blob.bin");
        let data: Vec<u8> = (0..(CHUNK_SIZE * 2 + 17)).map(|i| (i % 251) as u8).collect();
        std::fs::write(&path, &data).unwrap();

        let fp = ContentFingerprinter::new().fingerprint_file(&path).await.unwrap();
        assert_eq!(fp.digest, ContentFingerprinter::fingerprint_bytes(&data));
        assert_eq!(fp.byte_size, data.len() as u64);
    }

    #[tokio::test]
    async fn test_missing_file_is_read_error() {
        let err = ContentFingerprinter::new()
            .fingerprint_file(Path::new("/nonexistent/vizier/missing.png"))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Read { .. }));
    }

    #[test]
    fn test_perceptual_hashes_survive_resize() {
        let original = ContentFingerprinter::perceptual_hashes(&gradient(400, 300, false));
        let smaller = ContentFingerprinter::perceptual_hashes(&gradient(200, 150, false));
        let inverted = ContentFingerprinter::perceptual_hashes(&gradient(400, 300, true));

        assert_eq!(original.difference.len(), 16);
        let near = hamming_distance(&original.difference, &smaller.difference).unwrap();
        let far = hamming_distance(&original.difference, &inverted.difference).unwrap();
        assert!(near <= 6, "resized copy distance {}", near);
        assert!(far > near);
    }

    #[test]
    fn test_hamming_distance() {
        assert_eq!(hamming_distance("0000000000000000", "0000000000000000"), Some(0));
        assert_eq!(hamming_distance("0000000000000000", "000000000000000f"), Some(4));
        assert_eq!(hamming_distance("ffffffffffffffff", "0000000000000000"), Some(64));
        assert_eq!(hamming_distance("zz", "00"), None);
    }
}
