//! Image processing status lifecycle
//!
//! `pending -(start)-> processing -(>=1 analyzer succeeded)-> completed`
//! `processing -(all analyzers failed)-> failed`
//!
//! The store does not reject backward transitions; the orchestrator only
//! issues forward ones within a pass.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Persisted processing status of an image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageStatus {
    /// First observed, not yet analyzed
    Pending,
    /// A pass has started (marker, not a lock)
    Processing,
    /// At least one analyzer produced a result
    Completed,
    /// Every analyzer call of the last pass failed, or preprocessing failed
    Failed,
}

impl ImageStatus {
    pub const ALL: [ImageStatus; 4] = [
        ImageStatus::Pending,
        ImageStatus::Processing,
        ImageStatus::Completed,
        ImageStatus::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ImageStatus::Pending => "pending",
            ImageStatus::Processing => "processing",
            ImageStatus::Completed => "completed",
            ImageStatus::Failed => "failed",
        }
    }

    /// Whether a newly discovered image in this status gets a new pass.
    ///
    /// Only `completed` is skipped, and only when not forced.
    pub fn needs_processing(&self, force: bool) -> bool {
        force || *self != ImageStatus::Completed
    }
}

impl fmt::Display for ImageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ImageStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ImageStatus::Pending),
            "processing" => Ok(ImageStatus::Processing),
            "completed" => Ok(ImageStatus::Completed),
            "failed" => Ok(ImageStatus::Failed),
            other => Err(format!("Unknown image status: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_roundtrip() {
        for status in ImageStatus::ALL {
            assert_eq!(status.as_str().parse::<ImageStatus>().unwrap(), status);
        }
        assert!("done".parse::<ImageStatus>().is_err());
    }

    #[test]
    fn test_needs_processing() {
        assert!(!ImageStatus::Completed.needs_processing(false));
        assert!(ImageStatus::Completed.needs_processing(true));
        assert!(ImageStatus::Failed.needs_processing(false));
        assert!(ImageStatus::Pending.needs_processing(false));
        assert!(ImageStatus::Processing.needs_processing(false));
    }

    #[test]
    fn test_serde_lowercase() {
        let json = serde_json::to_string(&ImageStatus::Completed).unwrap();
        assert_eq!(json, "\"completed\"");
    }
}
