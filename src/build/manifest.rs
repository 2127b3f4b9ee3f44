//! Cache manifest recording what a completed build produced.
//!
//! The manifest is stored as JSON in `_meta.json` inside the character's
//! cache directory:
//!
//! ```json
//! {
//!   "source_signature": "3f5a...",
//!   "canvas_size": [2560, 1440],
//!   "cache_format": "jpeg",
//!   "portrait_count": 2,
//!   "background_count": 1
//! }
//! ```
//!
//! It is written only after every composite of a build is on disk, and
//! always through a temporary file and a rename, so readers see either the
//! manifest of the last complete build or none at all.

use crate::build::MANIFEST_FILENAME;
use crate::config::{CacheFormat, CanvasSpec};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Error during manifest operations.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ManifestError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Persisted record of one complete cache build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheManifest {
    /// Signature of the sources the cache was built from
    pub source_signature: String,
    /// Canvas size `[width, height]`
    pub canvas_size: [u32; 2],
    /// Output format name
    pub cache_format: CacheFormat,
    /// Number of portraits composited
    pub portrait_count: usize,
    /// Number of backgrounds composited
    pub background_count: usize,
}

impl CacheManifest {
    /// Create a manifest describing a finished build.
    pub fn new(
        source_signature: String,
        canvas: CanvasSpec,
        cache_format: CacheFormat,
        portrait_count: usize,
        background_count: usize,
    ) -> Self {
        Self {
            source_signature,
            canvas_size: canvas.as_array(),
            cache_format,
            portrait_count,
            background_count,
        }
    }

    /// Number of composites this manifest asserts exist.
    pub fn expected_items(&self) -> usize {
        self.portrait_count * self.background_count
    }

    pub fn canvas(&self) -> CanvasSpec {
        CanvasSpec::new(self.canvas_size[0], self.canvas_size[1])
    }

    /// Load a manifest from a file.
    ///
    /// Returns `Ok(None)` if the file doesn't exist.
    pub fn load(path: &Path) -> Result<Option<Self>, ManifestError> {
        if !path.exists() {
            return Ok(None);
        }

        let file = File::open(path)?;
        let manifest = serde_json::from_reader(BufReader::new(file))?;
        Ok(Some(manifest))
    }

    /// Load the manifest from a character's cache directory.
    pub fn load_from_dir(cache_dir: &Path) -> Result<Option<Self>, ManifestError> {
        Self::load(&cache_dir.join(MANIFEST_FILENAME))
    }

    /// Save the manifest atomically: write a sibling temp file, then rename.
    pub fn save(&self, path: &Path) -> Result<(), ManifestError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let tmp = temp_path(path);
        {
            let file = File::create(&tmp)?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer_pretty(&mut writer, self)?;
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }
        fs::rename(&tmp, path)?;

        Ok(())
    }

    /// Save the manifest into a character's cache directory.
    pub fn save_to_dir(&self, cache_dir: &Path) -> Result<(), ManifestError> {
        self.save(&cache_dir.join(MANIFEST_FILENAME))
    }

    /// Remove the manifest from a cache directory, if present.
    pub fn remove_from_dir(cache_dir: &Path) -> Result<(), ManifestError> {
        match fs::remove_file(cache_dir.join(MANIFEST_FILENAME)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample() -> CacheManifest {
        CacheManifest::new("abc123".to_string(), CanvasSpec::new(2560, 1440), CacheFormat::Jpeg, 2, 3)
    }

    #[test]
    fn test_expected_items() {
        assert_eq!(sample().expected_items(), 6);
        assert_eq!(sample().canvas(), CanvasSpec::new(2560, 1440));
    }

    #[test]
    fn test_json_shape() {
        let value = serde_json::to_value(sample()).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "source_signature": "abc123",
                "canvas_size": [2560, 1440],
                "cache_format": "jpeg",
                "portrait_count": 2,
                "background_count": 3
            })
        );
    }

    #[test]
    fn test_load_missing_returns_none() {
        let temp = TempDir::new().unwrap();
        assert!(CacheManifest::load_from_dir(temp.path()).unwrap().is_none());
    }

    #[test]
    fn test_save_and_load() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("rin");
        sample().save_to_dir(&dir).unwrap();

        assert!(dir.join(MANIFEST_FILENAME).exists());
        assert!(!dir.join("_meta.json.tmp").exists());
        assert_eq!(CacheManifest::load_from_dir(&dir).unwrap(), Some(sample()));
    }

    #[test]
    fn test_load_corrupt_manifest() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join(MANIFEST_FILENAME), "{ not json").unwrap();
        assert!(matches!(CacheManifest::load_from_dir(temp.path()), Err(ManifestError::Json(_))));
    }

    #[test]
    fn test_load_unknown_format_is_error() {
        let temp = TempDir::new().unwrap();
        fs::write(
            temp.path().join(MANIFEST_FILENAME),
            r#"{"source_signature":"x","canvas_size":[1,1],"cache_format":"webp","portrait_count":1,"background_count":1}"#,
        )
        .unwrap();
        assert!(CacheManifest::load_from_dir(temp.path()).is_err());
    }

    #[test]
    fn test_remove_from_dir() {
        let temp = TempDir::new().unwrap();
        sample().save_to_dir(temp.path()).unwrap();
        CacheManifest::remove_from_dir(temp.path()).unwrap();
        assert!(!temp.path().join(MANIFEST_FILENAME).exists());
        // Removing again is fine
        CacheManifest::remove_from_dir(temp.path()).unwrap();
    }
}
