//! Image loading, resizing, and base64 encoding for analyzer requests.
//!
//! A JPEG already within `max_dimension` passes through byte-for-byte.
//! Anything else is resized (longest side = `max_dimension`, Lanczos3) and
//! re-encoded as JPEG. The base64 payload never exceeds `max_payload_bytes`:
//! quality is lowered first, then dimensions.

use crate::config::PreprocessSettings;
use crate::error::{PipelineError, PipelineResult};
use crate::models::{ImageMetadata, PerceptualHashes};
use crate::services::fingerprinter::ContentFingerprinter;
use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{DateTime, Utc};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat, ImageReader};
use std::io::Cursor;
use std::path::Path;

const MIN_JPEG_QUALITY: u8 = 40;
const QUALITY_STEP: u8 = 10;
const MIN_DIMENSION: u32 = 64;

/// Transport-ready image
#[derive(Debug, Clone)]
pub struct PreparedImage {
    /// Base64 JPEG bytes
    pub payload: String,
    pub metadata: ImageMetadata,
}

impl PreparedImage {
    /// `data:` URL used by chat-completion image parts
    pub fn data_url(&self) -> String {
        format!("data:image/jpeg;base64,{}", self.payload)
    }
}

/// Decodes, normalizes and encodes images for transport
#[derive(Debug, Clone)]
pub struct ImagePreprocessor {
    settings: PreprocessSettings,
    perceptual_hashes: bool,
}

impl ImagePreprocessor {
    pub fn new(settings: PreprocessSettings) -> Self {
        Self {
            settings,
            perceptual_hashes: false,
        }
    }

    /// Also compute perceptual hashes from the decoded image
    pub fn with_perceptual_hashes(mut self, enabled: bool) -> Self {
        self.perceptual_hashes = enabled;
        self
    }

    pub fn settings(&self) -> &PreprocessSettings {
        &self.settings
    }

    /// Read, decode and encode `path` on the blocking pool
    pub async fn prepare(&self, path: &Path) -> PipelineResult<PreparedImage> {
        let path_buf = path.to_path_buf();
        let preprocessor = self.clone();

        let prepared = tokio::task::spawn_blocking(move || preprocessor.prepare_blocking(&path_buf))
            .await
            .map_err(|e| PipelineError::Encoding(format!("Preprocess task failed: {}", e)))??;

        tracing::debug!(
            path = %path.display(),
            width = prepared.metadata.width,
            height = prepared.metadata.height,
            payload_width = prepared.metadata.payload_width,
            payload_height = prepared.metadata.payload_height,
            payload_bytes = prepared.metadata.payload_bytes,
            "Prepared image payload"
        );

        Ok(prepared)
    }

    fn prepare_blocking(&self, path: &Path) -> PipelineResult<PreparedImage> {
        let read_error = |e: std::io::Error| PipelineError::Read {
            path: path.to_path_buf(),
            detail: e.to_string(),
        };
        let bytes = std::fs::read(path).map_err(read_error)?;
        let modified_at = std::fs::metadata(path)
            .and_then(|m| m.modified())
            .ok()
            .map(DateTime::<Utc>::from);

        let mut prepared = self.prepare_bytes(&bytes, path)?;
        prepared.metadata.modified_at = modified_at;
        Ok(prepared)
    }

    /// Prepare an in-memory image; `path` is used for error reporting only
    pub fn prepare_bytes(&self, bytes: &[u8], path: &Path) -> PipelineResult<PreparedImage> {
        let decode_error = |detail: String| PipelineError::Decode {
            path: path.to_path_buf(),
            detail,
        };

        let reader = ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .map_err(|e| decode_error(e.to_string()))?;
        let format = reader
            .format()
            .ok_or_else(|| decode_error("unrecognized image format".to_string()))?;
        let image = reader.decode().map_err(|e| decode_error(e.to_string()))?;

        let (width, height) = (image.width(), image.height());
        if width == 0 || height == 0 {
            return Err(decode_error(format!("degenerate dimensions {}x{}", width, height)));
        }

        let perceptual_hashes: Option<PerceptualHashes> = self
            .perceptual_hashes
            .then(|| ContentFingerprinter::perceptual_hashes(&image));

        let (payload, payload_width, payload_height) = self.encode_for_transport(&image, format, bytes)?;

        Ok(PreparedImage {
            metadata: ImageMetadata {
                width,
                height,
                format: format!("{:?}", format).to_lowercase(),
                color_type: format!("{:?}", image.color()),
                file_size: bytes.len() as u64,
                aspect_ratio: width as f64 / height as f64,
                modified_at: None,
                payload_width,
                payload_height,
                payload_bytes: payload.len(),
                perceptual_hashes,
            },
            payload,
        })
    }

    fn encode_for_transport(
        &self,
        image: &DynamicImage,
        format: ImageFormat,
        original: &[u8],
    ) -> PipelineResult<(String, u32, u32)> {
        let max_dimension = self.settings.max_dimension;
        let budget = self.settings.max_payload_bytes;
        let within_bounds = image.width() <= max_dimension && image.height() <= max_dimension;

        if format == ImageFormat::Jpeg && within_bounds && base64_len(original.len()) <= budget {
            let payload = STANDARD.encode(original);
            return non_empty(payload).map(|p| (p, image.width(), image.height()));
        }

        let mut dimension = max_dimension;
        let mut quality = self.settings.jpeg_quality;
        let mut resized = resize_if_needed(image, dimension);

        loop {
            let jpeg = encode_to_jpeg(&resized, quality)?;
            if base64_len(jpeg.len()) <= budget {
                let payload = non_empty(STANDARD.encode(&jpeg))?;
                return Ok((payload, resized.width(), resized.height()));
            }

            if quality > MIN_JPEG_QUALITY {
                quality = quality.saturating_sub(QUALITY_STEP).max(MIN_JPEG_QUALITY);
            } else if dimension > MIN_DIMENSION {
                dimension = (dimension * 3 / 4).max(MIN_DIMENSION);
                resized = resize_if_needed(image, dimension);
            } else {
                return Err(PipelineError::Encoding(format!(
                    "Cannot fit image into {} byte payload budget",
                    budget
                )));
            }

            tracing::debug!(quality, dimension, "Payload over budget, re-encoding");
        }
    }
}

/// Resize so the longest side equals `max_dimension`, preserving aspect ratio
fn resize_if_needed(image: &DynamicImage, max_dimension: u32) -> DynamicImage {
    if image.width() <= max_dimension && image.height() <= max_dimension {
        return image.clone();
    }
    image.resize(max_dimension, max_dimension, FilterType::Lanczos3)
}

fn encode_to_jpeg(image: &DynamicImage, quality: u8) -> PipelineResult<Vec<u8>> {
    let rgb = image.to_rgb8();
    let mut buffer = Vec::new();
    JpegEncoder::new_with_quality(&mut buffer, quality)
        .encode_image(&rgb)
        .map_err(|e| PipelineError::Encoding(format!("JPEG encoding failed: {}", e)))?;
    Ok(buffer)
}

fn base64_len(bytes: usize) -> usize {
    bytes.div_ceil(3) * 4
}

fn non_empty(payload: String) -> PipelineResult<String> {
    if payload.is_empty() {
        return Err(PipelineError::Encoding("encoding produced an empty payload".to_string()));
    }
    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn settings(max_dimension: u32) -> PreprocessSettings {
        PreprocessSettings {
            max_dimension,
            jpeg_quality: 90,
            max_payload_bytes: 20 * 1024 * 1024,
        }
    }

    fn encoded(width: u32, height: u32, format: ImageFormat) -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x % 256) as u8, (y % 256) as u8, ((x * y) % 256) as u8])
        }));
        let mut buffer = Cursor::new(Vec::new());
        img.write_to(&mut buffer, format).unwrap();
        buffer.into_inner()
    }

    #[test]
    fn test_small_jpeg_passes_through() {
        let jpeg = encoded(300, 200, ImageFormat::Jpeg);
        let prepared = ImagePreprocessor::new(settings(1024))
            .prepare_bytes(&jpeg, Path::new("small.jpg"))
            .unwrap();

        assert_eq!(prepared.payload, STANDARD.encode(&jpeg));
        assert_eq!(prepared.metadata.format, "jpeg");
        assert_eq!((prepared.metadata.payload_width, prepared.metadata.payload_height), (300, 200));
    }

    #[test]
    fn test_large_png_is_resized_and_reencoded() {
        let png = encoded(2000, 1000, ImageFormat::Png);
        let prepared = ImagePreprocessor::new(settings(1024))
            .prepare_bytes(&png, Path::new("wide.png"))
            .unwrap();

        assert_eq!(prepared.metadata.width, 2000);
        assert_eq!(prepared.metadata.format, "png");
        assert_eq!(prepared.metadata.payload_width, 1024);
        assert_eq!(prepared.metadata.payload_height, 512);

        let bytes = STANDARD.decode(&prepared.payload).unwrap();
        assert_eq!(image::guess_format(&bytes).unwrap(), ImageFormat::Jpeg);
        assert!(prepared.data_url().starts_with("data:image/jpeg;base64,"));
    }

    #[test]
    fn test_small_png_is_reencoded_without_resize() {
        let png = encoded(120, 80, ImageFormat::Png);
        let prepared = ImagePreprocessor::new(settings(1024))
            .prepare_bytes(&png, Path::new("icon.png"))
            .unwrap();
        assert_eq!((prepared.metadata.payload_width, prepared.metadata.payload_height), (120, 80));
        let bytes = STANDARD.decode(&prepared.payload).unwrap();
        assert_eq!(image::guess_format(&bytes).unwrap(), ImageFormat::Jpeg);
    }

    #[test]
    fn test_payload_budget_shrinks_image() {
        let png = encoded(800, 800, ImageFormat::Png);
        let mut tight = settings(800);
        tight.max_payload_bytes = 24 * 1024;
        let prepared = ImagePreprocessor::new(tight)
            .prepare_bytes(&png, Path::new("busy.png"))
            .unwrap();
        assert!(prepared.payload.len() <= 24 * 1024);
        assert!(prepared.metadata.payload_bytes <= 24 * 1024);
    }

    #[test]
    fn test_impossible_budget_is_encoding_error() {
        let png = encoded(200, 200, ImageFormat::Png);
        let mut impossible = settings(200);
        impossible.max_payload_bytes = 8;
        let err = ImagePreprocessor::new(impossible)
            .prepare_bytes(&png, Path::new("any.png"))
            .unwrap_err();
        assert!(matches!(err, PipelineError::Encoding(_)));
    }

    #[test]
    fn test_corrupt_bytes_are_decode_error() {
        let err = ImagePreprocessor::new(settings(1024))
            .prepare_bytes(b"definitely not an image", Path::new("bad.jpg"))
            .unwrap_err();
        assert!(matches!(err, PipelineError::Decode { .. }));

        let mut truncated = encoded(64, 64, ImageFormat::Png);
        truncated.truncate(40);
        let err = ImagePreprocessor::new(settings(1024))
            .prepare_bytes(&truncated, Path::new("cut.png"))
            .unwrap_err();
        assert!(matches!(err, PipelineError::Decode { .. }));
    }

    #[test]
    fn test_perceptual_hashes_optional() {
        let png = encoded(64, 64, ImageFormat::Png);
        let without = ImagePreprocessor::new(settings(1024))
            .prepare_bytes(&png, Path::new("a.png"))
            .unwrap();
        assert!(without.metadata.perceptual_hashes.is_none());

        let with = ImagePreprocessor::new(settings(1024))
            .with_perceptual_hashes(true)
            .prepare_bytes(&png, Path::new("a.png"))
            .unwrap();
        assert!(with.metadata.perceptual_hashes.is_some());
    }

    #[tokio::test]
    async fn test_prepare_missing_file_is_read_error() {
        let err = ImagePreprocessor::new(settings(1024))
            .prepare(Path::new("/nonexistent/vizier/none.png"))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Read { .. }));
    }
}
