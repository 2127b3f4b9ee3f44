//! Source image preparation.
//!
//! Backgrounds are scaled to the canvas once and persisted under the
//! pre-scaled tree as `<stem>@<W>x<H>.<ext>`, keeping the source extension
//! so copies written by older tooling are picked up. The content is always
//! PNG. A persisted copy older than its source is rescaled. Portraits are
//! decoded and scaled by `stand_scale` in memory only.

use crate::build::composite::{scale_portrait, scaled_portrait_size};
use crate::build::progress::{notify, ProgressEvent, ProgressKind, ProgressReporter};
use crate::build::{AssetEntry, BuildContext, BuildError, CachePaths, CancellationToken};
use crate::config::CanvasSpec;
use crate::output::{load_rgba, resize_exact, save_png};
use image::RgbaImage;
use rayon::prelude::*;
use rayon::ThreadPool;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

/// A decoded source image ready for compositing.
#[derive(Debug, Clone)]
pub struct PreparedImage {
    /// Key used in composite filenames
    pub key: String,
    pub image: RgbaImage,
}

/// Path of the persisted canvas-sized copy of the background file `name`.
pub fn tagged_background_path(
    paths: &CachePaths,
    character: &str,
    name: &str,
    canvas: CanvasSpec,
) -> PathBuf {
    let name = Path::new(name);
    let stem = name.file_stem().map(|s| s.to_string_lossy()).unwrap_or_default();
    let file_name = match name.extension() {
        Some(ext) => format!("{}{}.{}", stem, canvas.tag(), ext.to_string_lossy()),
        None => format!("{}{}", stem, canvas.tag()),
    };
    paths.pre_scaled_background_dir(character).join(file_name)
}

/// Untagged scaled copy left by older tooling, if any.
fn legacy_background_path(paths: &CachePaths, character: &str, name: &str) -> Option<PathBuf> {
    let path = paths.pre_scaled_background_dir(character).join(name);
    path.is_file().then_some(path)
}

/// Whether `copy` was written no earlier than `source` was last modified.
///
/// Missing timestamps count as stale.
fn is_fresh(copy: &Path, source: &Path) -> bool {
    let modified = |path: &Path| fs::metadata(path).and_then(|m| m.modified()).ok();
    match (modified(copy), modified(source)) {
        (Some(copy), Some(source)) => copy >= source,
        _ => false,
    }
}

fn decode(path: &Path) -> Result<RgbaImage, BuildError> {
    load_rgba(path).map_err(|source| BuildError::Image { path: path.to_path_buf(), source })
}

/// Produce one background at exactly the canvas size.
pub fn prepare_background(ctx: &BuildContext, entry: &AssetEntry) -> Result<RgbaImage, BuildError> {
    let canvas = ctx.canvas();
    let tagged = tagged_background_path(ctx.paths(), ctx.character(), &entry.name, canvas);

    if tagged.is_file() {
        if !is_fresh(&tagged, &entry.path) {
            tracing::debug!(background = %entry.key, path = %tagged.display(), "scaled background older than source");
        } else {
            match load_rgba(&tagged) {
                Ok(image) => {
                    tracing::debug!(background = %entry.key, path = %tagged.display(), "reusing scaled background");
                    return Ok(resize_exact(image, canvas.width, canvas.height));
                }
                Err(e) => {
                    tracing::warn!(path = %tagged.display(), error = %e, "scaled background unreadable, rebuilding");
                }
            }
        }
    }

    let source = legacy_background_path(ctx.paths(), ctx.character(), &entry.name)
        .filter(|legacy| is_fresh(legacy, &entry.path))
        .unwrap_or_else(|| entry.path.clone());
    let image = decode(&source)?;
    let image = resize_exact(image, canvas.width, canvas.height);

    if let Err(e) = save_png(&image, &tagged) {
        tracing::warn!(path = %tagged.display(), error = %e, "failed to persist scaled background");
    }

    Ok(image)
}

/// Prepare every background in parallel on `pool`.
///
/// Emits one `prepare_bg` event per finished background. The first
/// decoding failure aborts the stage.
pub fn prepare_backgrounds(
    ctx: &BuildContext,
    entries: &[AssetEntry],
    pool: &ThreadPool,
    progress: &dyn ProgressReporter,
    cancel: &CancellationToken,
) -> Result<Vec<PreparedImage>, BuildError> {
    let total = entries.len();
    let done = AtomicUsize::new(0);

    pool.install(|| {
        entries
            .par_iter()
            .map(|entry| -> Result<PreparedImage, BuildError> {
                cancel.check()?;
                let image = prepare_background(ctx, entry)?;

                let current = done.fetch_add(1, Ordering::SeqCst) + 1;
                notify(
                    progress,
                    ProgressEvent::new(
                        ProgressKind::PrepareBg,
                        current,
                        total,
                        format!("{} {}", entry.name, ctx.canvas()),
                    ),
                );
                Ok(PreparedImage { key: entry.key.clone(), image })
            })
            .collect()
    })
}

/// Decode and scale every portrait once.
///
/// A portrait whose scaled size would exceed the bound of
/// [`scaled_portrait_size`] fails with [`BuildError::PortraitTooLarge`].
pub fn prepare_portraits(
    ctx: &BuildContext,
    entries: &[AssetEntry],
    pool: &ThreadPool,
    cancel: &CancellationToken,
) -> Result<Vec<PreparedImage>, BuildError> {
    let scale = ctx.layout().stand_scale;
    let canvas = ctx.canvas();

    pool.install(|| {
        entries
            .par_iter()
            .map(|entry| -> Result<PreparedImage, BuildError> {
                cancel.check()?;
                let image = decode(&entry.path)?;
                if scaled_portrait_size(image.dimensions(), scale, canvas).is_none() {
                    return Err(BuildError::PortraitTooLarge {
                        path: entry.path.clone(),
                        scale,
                        canvas,
                    });
                }
                let image = scale_portrait(image, scale);
                Ok(PreparedImage { key: entry.key.clone(), image })
            })
            .collect()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::{build_pool, list_backgrounds, NullProgress};
    use crate::config::{load_character_config, Settings};
    use image::Rgba;
    use std::time::{Duration, SystemTime};
    use tempfile::TempDir;

    fn setup(canvas: &str) -> (TempDir, CachePaths) {
        let temp = TempDir::new().unwrap();
        let paths = CachePaths::new(temp.path().join("assets"), temp.path().join("cache"));
        let root = paths.character_root("rin");
        fs::create_dir_all(&root).unwrap();
        fs::write(root.join("config.yaml"), format!("layout:\n  canvas_size: {}\n", canvas)).unwrap();
        (temp, paths)
    }

    fn context(paths: &CachePaths) -> BuildContext {
        let loaded = load_character_config(&paths.character_root("rin")).unwrap();
        BuildContext::new("rin", paths.clone(), &Settings::default(), loaded)
    }

    fn write_image(path: &Path, width: u32, height: u32, color: Rgba<u8>) {
        save_png(&RgbaImage::from_pixel(width, height, color), path).unwrap();
    }

    fn set_mtime(path: &Path, time: SystemTime) {
        fs::File::options().write(true).open(path).unwrap().set_modified(time).unwrap();
    }

    #[test]
    fn test_tagged_path() {
        let paths = CachePaths::new("assets", "cache");
        assert_eq!(
            tagged_background_path(&paths, "rin", "room.png", CanvasSpec::new(1920, 1080)),
            PathBuf::from("assets/pre_scaled/characters/rin/background/room@1920x1080.png")
        );
        assert_eq!(
            tagged_background_path(&paths, "rin", "night.jpg", CanvasSpec::new(2560, 1440)),
            PathBuf::from("assets/pre_scaled/characters/rin/background/night@2560x1440.jpg")
        );
    }

    #[test]
    fn test_prepare_scales_and_persists() {
        let (_temp, paths) = setup("[16, 9]");
        write_image(&paths.background_dir("rin").join("room.png"), 32, 18, Rgba([10, 20, 30, 255]));
        let ctx = context(&paths);
        let entries = list_backgrounds(&paths, "rin");

        let pool = build_pool(2).unwrap();
        let prepared =
            prepare_backgrounds(&ctx, &entries, &pool, &NullProgress, &CancellationToken::new())
                .unwrap();

        assert_eq!(prepared.len(), 1);
        assert_eq!(prepared[0].key, "room");
        assert_eq!(prepared[0].image.dimensions(), (16, 9));

        let tagged = tagged_background_path(&paths, "rin", "room.png", CanvasSpec::new(16, 9));
        assert_eq!(load_rgba(&tagged).unwrap().dimensions(), (16, 9));
    }

    #[test]
    fn test_prepare_reuses_tagged_copy() {
        let (_temp, paths) = setup("[4, 4]");
        write_image(&paths.background_dir("rin").join("room.png"), 8, 8, Rgba([255, 0, 0, 255]));
        let tagged = tagged_background_path(&paths, "rin", "room.png", CanvasSpec::new(4, 4));
        write_image(&tagged, 4, 4, Rgba([0, 0, 255, 255]));

        let ctx = context(&paths);
        let entry = &list_backgrounds(&paths, "rin")[0];
        let image = prepare_background(&ctx, entry).unwrap();

        assert_eq!(*image.get_pixel(0, 0), Rgba([0, 0, 255, 255]));
    }

    #[test]
    fn test_prepare_reuses_tagged_copy_with_source_extension() {
        let (_temp, paths) = setup("[4, 4]");
        write_image(&paths.background_dir("rin").join("night.jpg"), 8, 8, Rgba([255, 0, 0, 255]));
        // PNG content under the source's extension
        let tagged = paths.pre_scaled_background_dir("rin").join("night@4x4.jpg");
        write_image(&tagged, 4, 4, Rgba([0, 0, 255, 255]));

        let ctx = context(&paths);
        let entry = &list_backgrounds(&paths, "rin")[0];
        let image = prepare_background(&ctx, entry).unwrap();

        assert_eq!(*image.get_pixel(0, 0), Rgba([0, 0, 255, 255]));
    }

    #[test]
    fn test_prepare_rescales_when_source_is_newer() {
        let (_temp, paths) = setup("[4, 4]");
        let source = paths.background_dir("rin").join("room.png");
        write_image(&source, 8, 8, Rgba([255, 0, 255, 255]));
        let tagged = tagged_background_path(&paths, "rin", "room.png", CanvasSpec::new(4, 4));
        write_image(&tagged, 4, 4, Rgba([255, 0, 0, 255]));

        let now = SystemTime::now();
        set_mtime(&tagged, now - Duration::from_secs(60));
        set_mtime(&source, now);

        let ctx = context(&paths);
        let entry = &list_backgrounds(&paths, "rin")[0];
        let image = prepare_background(&ctx, entry).unwrap();
        assert_eq!(*image.get_pixel(0, 0), Rgba([255, 0, 255, 255]));

        // The stale copy was overwritten
        assert_eq!(*load_rgba(&tagged).unwrap().get_pixel(0, 0), Rgba([255, 0, 255, 255]));
    }

    #[test]
    fn test_prepare_skips_stale_legacy_copy() {
        let (_temp, paths) = setup("[4, 4]");
        let source = paths.background_dir("rin").join("room.png");
        write_image(&source, 4, 4, Rgba([255, 0, 255, 255]));
        let legacy = paths.pre_scaled_background_dir("rin").join("room.png");
        write_image(&legacy, 4, 4, Rgba([0, 255, 0, 255]));

        let now = SystemTime::now();
        set_mtime(&legacy, now - Duration::from_secs(60));
        set_mtime(&source, now);

        let ctx = context(&paths);
        let entry = &list_backgrounds(&paths, "rin")[0];
        let image = prepare_background(&ctx, entry).unwrap();
        assert_eq!(*image.get_pixel(0, 0), Rgba([255, 0, 255, 255]));
    }

    #[test]
    fn test_prepare_prefers_legacy_copy() {
        let (_temp, paths) = setup("[4, 4]");
        write_image(&paths.background_dir("rin").join("room.png"), 4, 4, Rgba([255, 0, 0, 255]));
        let legacy = paths.pre_scaled_background_dir("rin").join("room.png");
        write_image(&legacy, 4, 4, Rgba([0, 255, 0, 255]));

        let ctx = context(&paths);
        let entry = &list_backgrounds(&paths, "rin")[0];
        let image = prepare_background(&ctx, entry).unwrap();

        assert_eq!(*image.get_pixel(0, 0), Rgba([0, 255, 0, 255]));
    }

    #[test]
    fn test_prepare_undecodable_background_fails() {
        let (_temp, paths) = setup("[4, 4]");
        let bg_dir = paths.background_dir("rin");
        fs::create_dir_all(&bg_dir).unwrap();
        fs::write(bg_dir.join("broken.png"), b"not an image").unwrap();

        let ctx = context(&paths);
        let entry = &list_backgrounds(&paths, "rin")[0];
        assert!(matches!(prepare_background(&ctx, entry), Err(BuildError::Image { .. })));
    }

    #[test]
    fn test_prepare_cancelled() {
        let (_temp, paths) = setup("[4, 4]");
        write_image(&paths.background_dir("rin").join("room.png"), 4, 4, Rgba([255, 0, 0, 255]));
        let ctx = context(&paths);
        let entries = list_backgrounds(&paths, "rin");

        let cancel = CancellationToken::new();
        cancel.cancel();
        let pool = build_pool(1).unwrap();
        let result = prepare_backgrounds(&ctx, &entries, &pool, &NullProgress, &cancel);
        assert!(matches!(result, Err(BuildError::Cancelled)));
    }

    #[test]
    fn test_prepare_portraits_scales() {
        let (_temp, paths) = setup("[4, 4]");
        fs::write(
            paths.character_root("rin").join("config.yaml"),
            "layout:\n  canvas_size: [4, 4]\n  stand_scale: 0.5\n",
        )
        .unwrap();
        let portrait = paths.portrait_dir("rin").join("happy.png");
        write_image(&portrait, 10, 20, Rgba([1, 2, 3, 255]));

        let ctx = context(&paths);
        let entries = crate::build::list_portraits(&paths.portrait_dir("rin"));
        let pool = build_pool(1).unwrap();
        let prepared = prepare_portraits(&ctx, &entries, &pool, &CancellationToken::new()).unwrap();

        assert_eq!(prepared[0].key, "happy");
        assert_eq!(prepared[0].image.dimensions(), (5, 10));
    }

    #[test]
    fn test_prepare_portraits_rejects_oversized_scale() {
        let (_temp, paths) = setup("[4, 4]");
        fs::write(
            paths.character_root("rin").join("config.yaml"),
            "layout:\n  canvas_size: [4, 4]\n  stand_scale: 1.0e12\n",
        )
        .unwrap();
        write_image(&paths.portrait_dir("rin").join("happy.png"), 10, 20, Rgba([1, 2, 3, 255]));

        let ctx = context(&paths);
        let entries = crate::build::list_portraits(&paths.portrait_dir("rin"));
        let pool = build_pool(1).unwrap();
        let result = prepare_portraits(&ctx, &entries, &pool, &CancellationToken::new());
        assert!(matches!(result, Err(BuildError::PortraitTooLarge { .. })));
    }
}
