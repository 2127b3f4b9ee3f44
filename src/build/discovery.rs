//! Asset discovery for the build system.
//!
//! Lists portrait and background images for a character. Backgrounds merge
//! the character's own folder with the shared `common/background` folder,
//! the character's files taking precedence on a name collision.

use crate::build::CachePaths;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

/// Image extensions recognised as assets (compared case-insensitively).
pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg"];

/// One portrait or background source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetEntry {
    /// Filename without extension; used in composite filenames
    pub key: String,
    /// Filename including extension
    pub name: String,
    /// Full path of the source file
    pub path: PathBuf,
}

impl AssetEntry {
    fn new(dir: &Path, name: String) -> Self {
        let key = file_key(&name);
        let path = dir.join(&name);
        Self { key, name, path }
    }
}

/// Filename without its final extension.
pub fn file_key(name: &str) -> String {
    Path::new(name)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| name.to_string())
}

/// Check if a path has an image extension.
pub fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| IMAGE_EXTENSIONS.iter().any(|known| ext.eq_ignore_ascii_case(known)))
}

/// Sorted image filenames directly inside `dir`. Missing folder → empty.
pub fn list_images(dir: &Path) -> Vec<String> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(_) => return Vec::new(),
    };

    let mut names: Vec<String> = entries
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
        .map(|entry| entry.path())
        .filter(|path| is_image_file(path))
        .filter_map(|path| path.file_name().map(|n| n.to_string_lossy().into_owned()))
        .collect();

    names.sort();
    names
}

/// Portraits in `dir`, in sorted filename order.
///
/// Files whose key collides with an earlier one (`happy.png` and
/// `happy.jpg`) are skipped, as both would map to the same composite.
pub fn list_portraits(dir: &Path) -> Vec<AssetEntry> {
    let mut keys = HashSet::new();
    let mut portraits = Vec::new();

    for name in list_images(dir) {
        let entry = AssetEntry::new(dir, name);
        if !keys.insert(entry.key.clone()) {
            tracing::warn!(file = %entry.path.display(), "skipping portrait with duplicate key '{}'", entry.key);
            continue;
        }
        portraits.push(entry);
    }

    portraits
}

/// Backgrounds for `character`: its own folder first, then the shared folder.
///
/// Shared files whose filename was already seen are skipped silently; files
/// whose key collides with a different filename are skipped with a warning.
pub fn list_backgrounds(paths: &CachePaths, character: &str) -> Vec<AssetEntry> {
    let mut seen_names = HashSet::new();
    let mut seen_keys = HashSet::new();
    let mut backgrounds = Vec::new();

    for dir in [paths.background_dir(character), paths.common_background_dir()] {
        for name in list_images(&dir) {
            if seen_names.contains(&name) {
                continue;
            }
            let entry = AssetEntry::new(&dir, name);
            if !seen_keys.insert(entry.key.clone()) {
                tracing::warn!(file = %entry.path.display(), "skipping background with duplicate key '{}'", entry.key);
                continue;
            }
            seen_names.insert(entry.name.clone());
            backgrounds.push(entry);
        }
    }

    backgrounds
}

/// Sorted names of the character folders under `<base>/characters`.
pub fn list_characters(paths: &CachePaths) -> Vec<String> {
    let entries = match fs::read_dir(paths.characters_root()) {
        Ok(entries) => entries,
        Err(_) => return Vec::new(),
    };

    let mut names: Vec<String> = entries
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().map(|t| t.is_dir()).unwrap_or(false))
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .collect();

    names.sort();
    names
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use tempfile::TempDir;

    fn touch(path: &Path) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        File::create(path).unwrap();
    }

    #[test]
    fn test_is_image_file() {
        assert!(is_image_file(Path::new("a.png")));
        assert!(is_image_file(Path::new("a.JPG")));
        assert!(is_image_file(Path::new("a.Jpeg")));
        assert!(!is_image_file(Path::new("a.gif")));
        assert!(!is_image_file(Path::new("png")));
    }

    #[test]
    fn test_list_images_sorted_and_filtered() {
        let temp = TempDir::new().unwrap();
        touch(&temp.path().join("b.png"));
        touch(&temp.path().join("a.JPG"));
        touch(&temp.path().join("notes.txt"));
        touch(&temp.path().join("nested/c.png"));

        assert_eq!(list_images(temp.path()), vec!["a.JPG", "b.png"]);
    }

    #[test]
    fn test_list_images_missing_dir() {
        assert!(list_images(Path::new("/nonexistent/portrait")).is_empty());
    }

    #[test]
    fn test_list_portraits_keys() {
        let temp = TempDir::new().unwrap();
        touch(&temp.path().join("sad.png"));
        touch(&temp.path().join("happy.png"));
        touch(&temp.path().join("happy.jpg"));

        let portraits = list_portraits(temp.path());
        let keys: Vec<_> = portraits.iter().map(|p| p.key.as_str()).collect();
        assert_eq!(keys, vec!["happy", "sad"]);
        assert_eq!(portraits[0].name, "happy.jpg");
        assert_eq!(portraits[0].path, temp.path().join("happy.jpg"));
    }

    #[test]
    fn test_list_backgrounds_merges_shared_folder() {
        let temp = TempDir::new().unwrap();
        let paths = CachePaths::new(temp.path(), temp.path().join("cache"));
        touch(&paths.background_dir("rin").join("room.png"));
        touch(&paths.common_background_dir().join("room.png"));
        touch(&paths.common_background_dir().join("beach.png"));

        let backgrounds = list_backgrounds(&paths, "rin");
        let names: Vec<_> = backgrounds.iter().map(|b| b.name.as_str()).collect();
        assert_eq!(names, vec!["room.png", "beach.png"]);
        assert_eq!(backgrounds[0].path, paths.background_dir("rin").join("room.png"));
        assert_eq!(backgrounds[1].path, paths.common_background_dir().join("beach.png"));
    }

    #[test]
    fn test_list_backgrounds_key_collision_across_folders() {
        let temp = TempDir::new().unwrap();
        let paths = CachePaths::new(temp.path(), temp.path().join("cache"));
        touch(&paths.background_dir("rin").join("room.png"));
        touch(&paths.common_background_dir().join("room.jpg"));

        let backgrounds = list_backgrounds(&paths, "rin");
        assert_eq!(backgrounds.len(), 1);
        assert_eq!(backgrounds[0].name, "room.png");
    }

    #[test]
    fn test_list_characters() {
        let temp = TempDir::new().unwrap();
        let paths = CachePaths::new(temp.path(), temp.path().join("cache"));
        fs::create_dir_all(paths.character_root("rin")).unwrap();
        fs::create_dir_all(paths.character_root("aoi")).unwrap();
        touch(&paths.characters_root().join("readme.txt"));

        assert_eq!(list_characters(&paths), vec!["aoi", "rin"]);
    }
}
