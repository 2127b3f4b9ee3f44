//! Image input/output and composite file naming

use crate::build::CachePaths;
use crate::config::CacheFormat;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType as PngFilter, PngEncoder};
use image::imageops::FilterType;
use image::{ColorType, DynamicImage, ImageEncoder, RgbaImage};
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Error type for output operations
#[derive(Debug, thiserror::Error)]
pub enum OutputError {
    /// IO error during file operations
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    /// Image decoding or encoding error
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
    /// A composite the cache should contain is not on disk
    #[error("Composite not found (cache needs a rebuild): {}", .0.display())]
    MissingComposite(PathBuf),
}

/// Deterministic filename of one composite: `p_<portrait>__b_<background>.<ext>`.
pub fn composite_file_name(portrait_key: &str, background_key: &str, format: CacheFormat) -> String {
    format!("p_{}__b_{}.{}", portrait_key, background_key, format.extension())
}

/// Decode an image file into RGBA.
///
/// The format is sniffed from the file contents, so a PNG saved under a
/// `.jpg` name still loads.
pub fn load_rgba(path: &Path) -> Result<RgbaImage, OutputError> {
    let image = image::io::Reader::open(path)?.with_guessed_format()?.decode()?;
    Ok(image.into_rgba8())
}

/// Resize to exactly `width × height` with Lanczos3; returns the input
/// untouched when it already has that size.
pub fn resize_exact(image: RgbaImage, width: u32, height: u32) -> RgbaImage {
    if image.dimensions() == (width, height) {
        return image;
    }
    image::imageops::resize(&image, width, height, FilterType::Lanczos3)
}

/// Save an RGBA image as PNG, atomically.
pub fn save_png(image: &RgbaImage, path: &Path) -> Result<(), OutputError> {
    write_atomic(path, |writer| {
        let encoder =
            PngEncoder::new_with_quality(writer, CompressionType::Best, PngFilter::Adaptive);
        encoder.write_image(image.as_raw(), image.width(), image.height(), ColorType::Rgba8)
    })
}

/// Save a composite in the cache format, atomically.
///
/// JPEG output drops the alpha channel; `quality` is ignored for PNG.
pub fn save_composite(
    image: &RgbaImage,
    path: &Path,
    format: CacheFormat,
    quality: u8,
) -> Result<(), OutputError> {
    match format {
        CacheFormat::Png => save_png(image, path),
        CacheFormat::Jpeg => {
            let rgb = DynamicImage::ImageRgba8(image.clone()).into_rgb8();
            write_atomic(path, |writer| {
                let mut encoder = JpegEncoder::new_with_quality(writer, quality.clamp(1, 100));
                encoder.encode(rgb.as_raw(), rgb.width(), rgb.height(), ColorType::Rgb8)
            })
        }
    }
}

/// Encode into `<path>.partial`, then rename over `path`.
///
/// The partial file never carries the output extension, so a crash
/// mid-encode cannot be mistaken for a finished composite.
fn write_atomic<F>(path: &Path, encode: F) -> Result<(), OutputError>
where
    F: FnOnce(&mut BufWriter<File>) -> image::ImageResult<()>,
{
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)?;
        }
    }

    let tmp = partial_path(path);
    let result = (|| {
        let mut writer = BufWriter::new(File::create(&tmp)?);
        encode(&mut writer)?;
        writer.flush()?;
        Ok::<(), OutputError>(())
    })();

    match result {
        Ok(()) => {
            fs::rename(&tmp, path)?;
            Ok(())
        }
        Err(e) => {
            let _ = fs::remove_file(&tmp);
            Err(e)
        }
    }
}

/// Temporary sibling used while a file is being written.
pub fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".partial");
    path.with_file_name(name)
}

/// Read one cached composite base.
///
/// Fails with [`OutputError::MissingComposite`] when the file is absent,
/// which means the cache was invalidated and not rebuilt.
pub fn open_composite_base(
    paths: &CachePaths,
    format: CacheFormat,
    character: &str,
    portrait_key: &str,
    background_key: &str,
) -> Result<RgbaImage, OutputError> {
    let path = paths.composite_path(character, portrait_key, background_key, format);
    if !path.is_file() {
        return Err(OutputError::MissingComposite(path));
    }
    load_rgba(&path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;
    use tempfile::TempDir;

    fn checker(width: u32, height: u32) -> RgbaImage {
        RgbaImage::from_fn(width, height, |x, y| {
            if (x + y) % 2 == 0 {
                Rgba([255, 0, 0, 255])
            } else {
                Rgba([0, 0, 255, 128])
            }
        })
    }

    #[test]
    fn test_composite_file_name() {
        assert_eq!(composite_file_name("happy", "room", CacheFormat::Jpeg), "p_happy__b_room.jpg");
        assert_eq!(composite_file_name("1", "beach", CacheFormat::Png), "p_1__b_beach.png");
    }

    #[test]
    fn test_partial_path() {
        assert_eq!(partial_path(Path::new("/c/p_a__b_b.jpg")), PathBuf::from("/c/p_a__b_b.jpg.partial"));
    }

    #[test]
    fn test_resize_exact_noop() {
        let image = checker(4, 4);
        let resized = resize_exact(image.clone(), 4, 4);
        assert_eq!(resized, image);
        assert_eq!(resize_exact(image, 8, 2).dimensions(), (8, 2));
    }

    #[test]
    fn test_save_png_roundtrip_is_lossless() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested/out.png");
        let image = checker(5, 3);

        save_png(&image, &path).unwrap();
        assert!(!partial_path(&path).exists());
        assert_eq!(load_rgba(&path).unwrap(), image);
    }

    #[test]
    fn test_save_jpeg_drops_alpha() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("out.jpg");
        save_composite(&checker(16, 16), &path, CacheFormat::Jpeg, 90).unwrap();

        let loaded = load_rgba(&path).unwrap();
        assert_eq!(loaded.dimensions(), (16, 16));
        assert!(loaded.pixels().all(|p| p[3] == 255));
    }

    #[test]
    fn test_load_sniffs_format() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("actually_png.jpg");
        save_png(&checker(2, 2), &path).unwrap();
        assert_eq!(load_rgba(&path).unwrap().dimensions(), (2, 2));
    }

    #[test]
    fn test_open_composite_base_missing() {
        let temp = TempDir::new().unwrap();
        let paths = CachePaths::new(temp.path(), temp.path().join("cache"));
        let err = open_composite_base(&paths, CacheFormat::Png, "rin", "happy", "room").unwrap_err();
        assert!(matches!(err, OutputError::MissingComposite(_)));
        assert!(err.to_string().contains("p_happy__b_room.png"));
    }

    #[test]
    fn test_open_composite_base_reads_file() {
        let temp = TempDir::new().unwrap();
        let paths = CachePaths::new(temp.path(), temp.path().join("cache"));
        let image = checker(3, 3);
        save_png(&image, &paths.composite_path("rin", "happy", "room", CacheFormat::Png)).unwrap();

        let loaded = open_composite_base(&paths, CacheFormat::Png, "rin", "happy", "room").unwrap();
        assert_eq!(loaded, image);
    }
}
