//! Image file scanner
//!
//! Recursive discovery of image files by extension. Ignores VCS folders,
//! OS thumbnail caches and hidden directories. Symbolic links are followed;
//! link cycles are reported by the walker and skipped. Output is sorted so
//! batch order is stable across runs.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::{DirEntry, WalkDir};

/// Extensions accepted as images (lower-case)
pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "bmp", "tiff", "tif", "webp"];

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),

    #[error("Not a directory: {0}")]
    NotADirectory(PathBuf),
}

pub struct ImageScanner {
    ignore_names: Vec<String>,
    max_depth: Option<usize>,
}

impl ImageScanner {
    pub fn new() -> Self {
        Self {
            ignore_names: vec![
                ".DS_Store".to_string(),
                "Thumbs.db".to_string(),
                ".git".to_string(),
            ],
            max_depth: None,
        }
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    /// Recursively collect image files under `root`
    pub fn scan(&self, root: &Path) -> Result<Vec<PathBuf>, ScanError> {
        if !root.exists() {
            return Err(ScanError::PathNotFound(root.to_path_buf()));
        }
        if !root.is_dir() {
            return Err(ScanError::NotADirectory(root.to_path_buf()));
        }

        let mut images = Vec::new();

        let walker = WalkDir::new(root)
            .follow_links(true)
            .max_depth(self.max_depth.unwrap_or(usize::MAX))
            .into_iter()
            .filter_entry(|e| self.should_visit(e));

        for entry in walker {
            match entry {
                Ok(entry) => {
                    if entry.file_type().is_file() && is_image_path(entry.path()) {
                        images.push(entry.into_path());
                    }
                }
                Err(e) if e.loop_ancestor().is_some() => {
                    tracing::warn!("Symlink loop skipped: {}", e);
                }
                Err(e) => {
                    tracing::warn!("Error accessing entry: {}", e);
                }
            }
        }

        images.sort();
        tracing::debug!(root = %root.display(), images = images.len(), "Scan complete");
        Ok(images)
    }

    /// Expand a mix of files and directories into a sorted, de-duplicated
    /// list of image paths. Explicit files are kept whatever their extension.
    pub fn expand(&self, inputs: &[PathBuf]) -> Result<Vec<PathBuf>, ScanError> {
        let mut seen = HashSet::new();
        let mut paths = Vec::new();

        for input in inputs {
            let found = if input.is_dir() {
                self.scan(input)?
            } else {
                vec![input.clone()]
            };
            for path in found {
                if seen.insert(path.clone()) {
                    paths.push(path);
                }
            }
        }

        Ok(paths)
    }

    fn should_visit(&self, entry: &DirEntry) -> bool {
        let name = entry.file_name().to_string_lossy();

        if self.ignore_names.iter().any(|ignored| name == ignored.as_str()) {
            return false;
        }

        // Hidden directories below the root
        !(entry.depth() > 0 && entry.file_type().is_dir() && name.starts_with('.'))
    }
}

impl Default for ImageScanner {
    fn default() -> Self {
        Self::new()
    }
}

/// True when the extension is a supported image type
pub fn is_image_path(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
}
