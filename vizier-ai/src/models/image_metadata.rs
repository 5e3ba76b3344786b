//! Descriptive image metadata gathered during a pass

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Perceptual similarity hashes, each a 64-bit hash as 16 hex chars
///
/// Advisory only: never used as the dedup key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerceptualHashes {
    /// Mean-threshold hash (aHash)
    pub average: String,
    /// Horizontal gradient hash (dHash)
    pub difference: String,
    /// DCT low-frequency hash (pHash)
    pub frequency: String,
}

/// Source image properties plus the transport payload geometry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageMetadata {
    pub width: u32,
    pub height: u32,
    /// Detected container format, e.g. "jpeg", "png"
    pub format: String,
    /// Decoded color type, e.g. "Rgb8"
    pub color_type: String,
    pub file_size: u64,
    pub aspect_ratio: f64,
    pub modified_at: Option<DateTime<Utc>>,
    pub payload_width: u32,
    pub payload_height: u32,
    /// Length of the base64 payload in bytes
    pub payload_bytes: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub perceptual_hashes: Option<PerceptualHashes>,
}
