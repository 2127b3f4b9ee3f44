//! Build pipeline orchestration.
//!
//! [`CacheBuilder`] is the public entry point. One call resolves the
//! character's configuration, lists its assets, and either confirms the
//! cache is complete or rebuilds it:
//!
//! 1. Load the layout document and list portraits/backgrounds
//! 2. Validate the existing cache (unless forced)
//! 3. Snapshot the source signature
//! 4. Prepare backgrounds and portraits in parallel
//! 5. Remove the old manifest and composites
//! 6. Composite every pair in parallel
//! 7. Write the manifest
//!
//! Until step 5 the previous cache is left untouched, so a build that
//! fails early keeps serving the old composites.

use crate::build::composite::Scene;
use crate::build::manifest::{CacheManifest, ManifestError};
use crate::build::parallel::{build_pool, composite_pairs, CancellationToken};
use crate::build::prepare::{prepare_backgrounds, prepare_portraits};
use crate::build::progress::{
    notify, NullProgress, ProgressEvent, ProgressKind, ProgressReporter,
};
use crate::build::{
    check_cache, compute_signature, list_backgrounds, list_portraits, AssetEntry, BuildContext,
    BuildReport, CachePaths, CacheStatus,
};
use crate::config::{load_character_config, CanvasSpec, ConfigError, Settings};
use crate::output::{load_rgba, OutputError};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

/// Error during a cache build.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum BuildError {
    /// No layout document in the character folder
    #[error("Character config not found: {}", .expected.display())]
    ConfigMissing { expected: PathBuf },
    /// Layout document unreadable or invalid
    #[error("{0}")]
    ConfigUnreadable(ConfigError),
    /// Portrait folder empty or absent
    #[error("No portraits found in {}", .0.display())]
    NoPortraits(PathBuf),
    /// No background in the character or shared folder
    #[error("No backgrounds found for '{0}'")]
    NoBackgrounds(String),
    /// Dialog box image absent
    #[error("Dialog box image not found: {}", .0.display())]
    DialogBoxMissing(PathBuf),
    /// A source image could not be decoded
    #[error("Failed to load image {}: {}", .path.display(), .source)]
    Image {
        path: PathBuf,
        #[source]
        source: OutputError,
    },
    /// Scaled portrait would be far larger than the canvas
    #[error("Portrait {} scaled by {} is too large for canvas {}", .path.display(), .scale, .canvas)]
    PortraitTooLarge { path: PathBuf, scale: f64, canvas: CanvasSpec },
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// Manifest could not be written
    #[error("Manifest error: {0}")]
    Manifest(#[from] ManifestError),
    /// A composite could not be encoded or written
    #[error("Output error: {0}")]
    Output(#[from] OutputError),
    /// Worker pool could not be created
    #[error("Worker pool error: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
    /// Cancellation was requested
    #[error("Build cancelled")]
    Cancelled,
}

impl From<ConfigError> for BuildError {
    fn from(e: ConfigError) -> Self {
        match e {
            ConfigError::Missing { expected } => BuildError::ConfigMissing { expected },
            other => BuildError::ConfigUnreadable(other),
        }
    }
}

/// Listed inputs of one character.
struct Sources {
    ctx: BuildContext,
    portraits: Vec<AssetEntry>,
    backgrounds: Vec<AssetEntry>,
}

/// Entry point for ensuring and rebuilding composite caches.
///
/// # Example
///
/// ```ignore
/// use galframe::build::CacheBuilder;
/// use galframe::config::load_settings;
///
/// let builder = CacheBuilder::new(load_settings(None)?);
/// let report = builder.ensure_cache("rin")?;
/// println!("{}", report.summary());
/// ```
pub struct CacheBuilder {
    settings: Settings,
    paths: CachePaths,
    progress: Arc<dyn ProgressReporter>,
    cancel: CancellationToken,
}

impl CacheBuilder {
    /// Create a builder using the paths from `settings`.
    pub fn new(settings: Settings) -> Self {
        let paths = CachePaths::from_settings(&settings);
        Self {
            settings,
            paths,
            progress: Arc::new(NullProgress::new()),
            cancel: CancellationToken::new(),
        }
    }

    /// Override the asset and cache roots.
    pub fn with_paths(mut self, paths: CachePaths) -> Self {
        self.paths = paths;
        self
    }

    /// Set the progress reporter.
    pub fn with_progress(mut self, progress: Arc<dyn ProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    /// Set the cancellation token checked by workers.
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn paths(&self) -> &CachePaths {
        &self.paths
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Resolve the build context of `character`.
    pub fn context(&self, character: &str) -> Result<BuildContext, BuildError> {
        let loaded = load_character_config(&self.paths.character_root(character))?;
        Ok(BuildContext::new(character, self.paths.clone(), &self.settings, loaded))
    }

    /// Make sure the cache of `character` is complete, rebuilding it if not.
    pub fn ensure_cache(&self, character: &str) -> Result<BuildReport, BuildError> {
        self.report_failure(character, || {
            let sources = self.sources(character)?;
            match check_cache(&sources.ctx, &sources.portraits, &sources.backgrounds) {
                CacheStatus::Complete => Ok(self.skip(&sources)),
                CacheStatus::Stale(reason) => {
                    tracing::info!(character, %reason, "cache incomplete, rebuilding");
                    self.build(&sources)
                }
            }
        })
    }

    /// Rebuild the cache of `character`.
    ///
    /// Without `force` the cache is validated first and the call reports a
    /// skip when it is already complete.
    pub fn rebuild_cache(&self, character: &str, force: bool) -> Result<BuildReport, BuildError> {
        self.report_failure(character, || {
            let sources = self.sources(character)?;
            if !force {
                let status = check_cache(&sources.ctx, &sources.portraits, &sources.backgrounds);
                if status.is_complete() {
                    return Ok(self.skip(&sources));
                }
            }
            self.build(&sources)
        })
    }

    /// Validator verdict for `character` without building anything.
    pub fn cache_status(&self, character: &str) -> Result<CacheStatus, BuildError> {
        let ctx = self.context(character)?;
        let portraits = list_portraits(&self.paths.portrait_dir(character));
        let backgrounds = list_backgrounds(&self.paths, character);
        Ok(check_cache(&ctx, &portraits, &backgrounds))
    }

    /// Run `f`, turning any error into an `error` event and log record.
    fn report_failure<F>(&self, character: &str, f: F) -> Result<BuildReport, BuildError>
    where
        F: FnOnce() -> Result<BuildReport, BuildError>,
    {
        self.emit(ProgressKind::Start, 0, 0, character);
        let result = f();
        if let Err(e) = &result {
            tracing::error!(character, error = %e, "cache build failed");
            self.emit(ProgressKind::Error, 0, 0, e.to_string());
        }
        result
    }

    fn sources(&self, character: &str) -> Result<Sources, BuildError> {
        let ctx = self.context(character)?;
        let portraits = list_portraits(&self.paths.portrait_dir(character));
        let backgrounds = list_backgrounds(&self.paths, character);

        if portraits.is_empty() {
            return Err(BuildError::NoPortraits(self.paths.portrait_dir(character)));
        }
        if backgrounds.is_empty() {
            return Err(BuildError::NoBackgrounds(character.to_string()));
        }

        tracing::debug!(
            character,
            portraits = portraits.len(),
            backgrounds = backgrounds.len(),
            canvas = %ctx.canvas(),
            format = %ctx.format(),
            "sources listed"
        );
        Ok(Sources { ctx, portraits, backgrounds })
    }

    fn skip(&self, sources: &Sources) -> BuildReport {
        let expected = sources.portraits.len() * sources.backgrounds.len();
        tracing::info!(character = sources.ctx.character(), composites = expected, "cache up to date");
        self.emit(ProgressKind::Skip, expected, expected, "cache up to date");
        BuildReport::skipped(sources.ctx.character(), sources.portraits.len(), sources.backgrounds.len())
    }

    fn build(&self, sources: &Sources) -> Result<BuildReport, BuildError> {
        let start = Instant::now();
        let Sources { ctx, portraits, backgrounds } = sources;
        tracing::info!(
            character = ctx.character(),
            portraits = portraits.len(),
            backgrounds = backgrounds.len(),
            jobs = ctx.jobs(),
            "building composite cache"
        );

        let box_path = ctx.dialog_box_path();
        if !box_path.is_file() {
            return Err(BuildError::DialogBoxMissing(box_path));
        }
        let dialog_box = load_rgba(&box_path)
            .map_err(|source| BuildError::Image { path: box_path.clone(), source })?;

        let signature = compute_signature(ctx, portraits, backgrounds);
        let pool = build_pool(ctx.jobs())?;
        let progress = self.progress.as_ref();

        let prepared_backgrounds =
            prepare_backgrounds(ctx, backgrounds, &pool, progress, &self.cancel)?;
        let prepared_portraits = prepare_portraits(ctx, portraits, &pool, &self.cancel)?;
        let scene = Scene::new(ctx.layout(), dialog_box);

        let cache_dir = ctx.cache_dir();
        CacheManifest::remove_from_dir(&cache_dir)?;
        clean_cache_dir(&cache_dir)?;
        fs::create_dir_all(&cache_dir)?;

        let written = composite_pairs(
            ctx,
            &scene,
            &prepared_portraits,
            &prepared_backgrounds,
            &pool,
            progress,
            &self.cancel,
        )?;

        CacheManifest::new(signature, ctx.canvas(), ctx.format(), portraits.len(), backgrounds.len())
            .save_to_dir(&cache_dir)?;

        let report = BuildReport::built(
            ctx.character(),
            portraits.len(),
            backgrounds.len(),
            written,
            start.elapsed(),
        );
        tracing::info!(
            character = ctx.character(),
            composites = written,
            elapsed_ms = report.duration.as_millis() as u64,
            "composite cache built"
        );
        self.emit(ProgressKind::Done, written, written, report.summary());
        Ok(report)
    }

    fn emit(&self, kind: ProgressKind, current: usize, total: usize, message: impl Into<String>) {
        notify(self.progress.as_ref(), ProgressEvent::new(kind, current, total, message));
    }
}

/// Remove composites and leftover temporary files from a cache directory.
///
/// Only files named like composites (`p_*__b_*`) or left by an interrupted
/// write are touched. A missing directory is not an error.
pub fn clean_cache_dir(dir: &Path) -> Result<usize, BuildError> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e.into()),
    };

    let mut removed = 0;
    for entry in entries {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if is_cache_artifact(&name) {
            fs::remove_file(entry.path())?;
            removed += 1;
        }
    }

    if removed > 0 {
        tracing::debug!(dir = %dir.display(), removed, "cleaned cache directory");
    }
    Ok(removed)
}

fn is_cache_artifact(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    if lower.ends_with(".partial") || lower.ends_with(".tmp") {
        return true;
    }
    lower.starts_with("p_")
        && lower.contains("__b_")
        && [".jpg", ".jpeg", ".png"].iter().any(|ext| lower.ends_with(ext))
}
