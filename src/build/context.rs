//! Build context containing the configuration and paths for one character build.

use crate::config::{
    CacheFormat, CanvasSpec, LoadedCharacter, ResolvedLayout, Settings, SignatureMode,
};
use crate::output::composite_file_name;
use std::path::{Path, PathBuf};

/// Manifest filename inside each character's cache directory.
pub const MANIFEST_FILENAME: &str = "_meta.json";

/// Directory layout of the asset tree and the composite cache.
///
/// ```text
/// <base>/characters/<id>/...            inputs (read-only)
/// <base>/common/background/...          shared backgrounds (read-only)
/// <base>/pre_scaled/characters/<id>/... persisted scaled backgrounds
/// <cache>/<id>/...                      composites and manifest
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachePaths {
    base: PathBuf,
    cache: PathBuf,
}

impl CachePaths {
    pub fn new(base: impl Into<PathBuf>, cache: impl Into<PathBuf>) -> Self {
        Self { base: base.into(), cache: cache.into() }
    }

    /// Paths from the `[paths]` settings section.
    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.paths.base.clone(), settings.paths.cache.clone())
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    pub fn cache(&self) -> &Path {
        &self.cache
    }

    pub fn characters_root(&self) -> PathBuf {
        self.base.join("characters")
    }

    pub fn character_root(&self, character: &str) -> PathBuf {
        self.characters_root().join(character)
    }

    pub fn portrait_dir(&self, character: &str) -> PathBuf {
        self.character_root(character).join("portrait")
    }

    pub fn background_dir(&self, character: &str) -> PathBuf {
        self.character_root(character).join("background")
    }

    /// Backgrounds shared by every character.
    pub fn common_background_dir(&self) -> PathBuf {
        self.base.join("common").join("background")
    }

    /// Where scaled copies of a character's backgrounds are persisted.
    pub fn pre_scaled_background_dir(&self, character: &str) -> PathBuf {
        self.base.join("pre_scaled").join("characters").join(character).join("background")
    }

    pub fn cache_dir(&self, character: &str) -> PathBuf {
        self.cache.join(character)
    }

    pub fn manifest_path(&self, character: &str) -> PathBuf {
        self.cache_dir(character).join(MANIFEST_FILENAME)
    }

    pub fn composite_path(
        &self,
        character: &str,
        portrait_key: &str,
        background_key: &str,
        format: CacheFormat,
    ) -> PathBuf {
        self.cache_dir(character).join(composite_file_name(portrait_key, background_key, format))
    }
}

/// Everything one character build needs, fixed when the build starts.
///
/// The context is constructed once per `ensure`/`rebuild` call and passed by
/// reference to every stage; nothing mutates it afterwards.
#[derive(Debug, Clone)]
pub struct BuildContext {
    character: String,
    paths: CachePaths,
    config_path: PathBuf,
    dialog_box: String,
    layout: ResolvedLayout,
    format: CacheFormat,
    jpeg_quality: u8,
    signature_mode: SignatureMode,
    jobs: usize,
}

impl BuildContext {
    /// Create the context for `character` from settings and its loaded document.
    pub fn new(character: &str, paths: CachePaths, settings: &Settings, loaded: LoadedCharacter) -> Self {
        Self {
            character: character.to_string(),
            paths,
            config_path: loaded.path,
            dialog_box: loaded.config.assets.dialog_box,
            layout: loaded.layout,
            format: settings.render.cache_format,
            jpeg_quality: settings.render.jpeg_quality,
            signature_mode: settings.render.signature,
            jobs: resolve_jobs(settings.build.jobs),
        }
    }

    pub fn character(&self) -> &str {
        &self.character
    }

    pub fn paths(&self) -> &CachePaths {
        &self.paths
    }

    /// The layout document this build was configured from.
    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn character_root(&self) -> PathBuf {
        self.paths.character_root(&self.character)
    }

    pub fn dialog_box_path(&self) -> PathBuf {
        self.character_root().join(&self.dialog_box)
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.paths.cache_dir(&self.character)
    }

    pub fn layout(&self) -> &ResolvedLayout {
        &self.layout
    }

    pub fn canvas(&self) -> CanvasSpec {
        self.layout.canvas
    }

    pub fn format(&self) -> CacheFormat {
        self.format
    }

    pub fn jpeg_quality(&self) -> u8 {
        self.jpeg_quality
    }

    pub fn signature_mode(&self) -> SignatureMode {
        self.signature_mode
    }

    /// Worker threads for the parallel stages (always at least 1).
    pub fn jobs(&self) -> usize {
        self.jobs
    }

    /// Set the output format.
    pub fn with_format(mut self, format: CacheFormat) -> Self {
        self.format = format;
        self
    }

    /// Set the number of worker threads (0 = available parallelism).
    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = resolve_jobs(jobs);
        self
    }

    /// Output path for one pair.
    pub fn composite_path(&self, portrait_key: &str, background_key: &str) -> PathBuf {
        self.paths.composite_path(&self.character, portrait_key, background_key, self.format)
    }
}

fn resolve_jobs(jobs: usize) -> usize {
    if jobs == 0 {
        std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
    } else {
        jobs
    }
}
