//! Cache validity checks.
//!
//! Decides, without recomposing anything, whether a character's cache still
//! matches its sources. The check only reads; it never repairs or deletes.
//!
//! # How It Works
//!
//! A cache is complete when all of the following hold:
//!
//! 1. Both asset lists are non-empty
//! 2. The cache directory exists
//! 3. At least `portraits × backgrounds` files with the output extension exist
//! 4. A manifest exists and its counts, canvas and format equal the current ones
//! 5. The manifest's signature equals a freshly computed one
//!
//! Any failed check means a full rebuild; there is no partial repair.

use crate::build::{compute_signature, AssetEntry, BuildContext, CacheManifest};
use crate::config::{CacheFormat, CanvasSpec};
use std::fs;
use std::path::Path;

/// Why a cache is not usable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StaleReason {
    /// No portraits or no backgrounds to composite
    NoAssets,
    /// Cache directory does not exist
    MissingCacheDir,
    /// Fewer composites on disk than the cross product requires
    TooFewFiles { existing: usize, expected: usize },
    /// No manifest from a completed build
    ManifestMissing,
    /// Manifest exists but cannot be parsed
    ManifestUnreadable(String),
    /// Asset counts changed since the last build
    CountMismatch { cached: (usize, usize), current: (usize, usize) },
    /// Canvas size changed since the last build
    CanvasMismatch { cached: CanvasSpec, current: CanvasSpec },
    /// Output format changed since the last build
    FormatMismatch { cached: CacheFormat, current: CacheFormat },
    /// A source file was added, removed or modified
    SignatureChanged,
}

impl std::fmt::Display for StaleReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StaleReason::NoAssets => write!(f, "no portraits or backgrounds"),
            StaleReason::MissingCacheDir => write!(f, "cache directory missing"),
            StaleReason::TooFewFiles { existing, expected } => {
                write!(f, "{} of {} composites on disk", existing, expected)
            }
            StaleReason::ManifestMissing => write!(f, "manifest missing"),
            StaleReason::ManifestUnreadable(e) => write!(f, "manifest unreadable: {}", e),
            StaleReason::CountMismatch { cached, current } => write!(
                f,
                "asset counts changed ({}x{} -> {}x{})",
                cached.0, cached.1, current.0, current.1
            ),
            StaleReason::CanvasMismatch { cached, current } => {
                write!(f, "canvas changed ({} -> {})", cached, current)
            }
            StaleReason::FormatMismatch { cached, current } => {
                write!(f, "format changed ({} -> {})", cached, current)
            }
            StaleReason::SignatureChanged => write!(f, "source files changed"),
        }
    }
}

/// Verdict of [`check_cache`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheStatus {
    /// The cache matches its sources
    Complete,
    /// The cache must be rebuilt
    Stale(StaleReason),
}

impl CacheStatus {
    pub fn is_complete(&self) -> bool {
        matches!(self, CacheStatus::Complete)
    }
}

/// Check whether the cache for `ctx` is usable as-is.
pub fn check_cache(
    ctx: &BuildContext,
    portraits: &[AssetEntry],
    backgrounds: &[AssetEntry],
) -> CacheStatus {
    match find_stale_reason(ctx, portraits, backgrounds) {
        Some(reason) => CacheStatus::Stale(reason),
        None => CacheStatus::Complete,
    }
}

/// Shorthand for `check_cache(..).is_complete()`.
pub fn is_complete(ctx: &BuildContext, portraits: &[AssetEntry], backgrounds: &[AssetEntry]) -> bool {
    check_cache(ctx, portraits, backgrounds).is_complete()
}

fn find_stale_reason(
    ctx: &BuildContext,
    portraits: &[AssetEntry],
    backgrounds: &[AssetEntry],
) -> Option<StaleReason> {
    if portraits.is_empty() || backgrounds.is_empty() {
        return Some(StaleReason::NoAssets);
    }

    let cache_dir = ctx.cache_dir();
    if !cache_dir.is_dir() {
        return Some(StaleReason::MissingCacheDir);
    }

    let expected = portraits.len() * backgrounds.len();
    let existing = count_cache_files(&cache_dir, ctx.format());
    if existing < expected {
        return Some(StaleReason::TooFewFiles { existing, expected });
    }

    let manifest = match CacheManifest::load_from_dir(&cache_dir) {
        Ok(Some(manifest)) => manifest,
        Ok(None) => return Some(StaleReason::ManifestMissing),
        Err(e) => return Some(StaleReason::ManifestUnreadable(e.to_string())),
    };

    let current = (portraits.len(), backgrounds.len());
    let cached = (manifest.portrait_count, manifest.background_count);
    if cached != current {
        return Some(StaleReason::CountMismatch { cached, current });
    }
    if manifest.canvas() != ctx.canvas() {
        return Some(StaleReason::CanvasMismatch { cached: manifest.canvas(), current: ctx.canvas() });
    }
    if manifest.cache_format != ctx.format() {
        return Some(StaleReason::FormatMismatch {
            cached: manifest.cache_format,
            current: ctx.format(),
        });
    }
    if manifest.source_signature != compute_signature(ctx, portraits, backgrounds) {
        return Some(StaleReason::SignatureChanged);
    }

    None
}

/// Count files in `dir` whose extension matches `format` (case-insensitive).
pub fn count_cache_files(dir: &Path, format: CacheFormat) -> usize {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(_) => return 0,
    };

    entries
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
        .filter(|entry| {
            entry
                .path()
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case(format.extension()))
        })
        .count()
}
