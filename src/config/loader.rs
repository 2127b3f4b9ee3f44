//! Configuration loading and discovery
//!
//! Finds and loads `galframe.toml`, and loads per-character layout documents.

use super::schema::{
    CacheFormat, CharacterConfig, ConfigValidationError, ResolvedLayout, Settings,
};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Settings filename searched for by [`find_settings`].
pub const SETTINGS_FILENAME: &str = "galframe.toml";

/// Primary character document name.
pub const CHARACTER_CONFIG_YAML: &str = "config.yaml";
/// Legacy character document name.
pub const CHARACTER_CONFIG_JSON: &str = "config.json";

/// Configuration loading error
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// File I/O error
    #[error("Failed to read settings: {0}")]
    Io(#[from] std::io::Error),
    /// TOML parsing error
    #[error("Failed to parse galframe.toml: {0}")]
    Parse(#[from] toml::de::Error),
    /// Settings validation error
    #[error("Settings validation failed:\n{}", .0.iter().map(|e| format!("  - {}", e)).collect::<Vec<_>>().join("\n"))]
    Validation(Vec<String>),
    /// No character document in either format
    #[error("Character config not found: {}", .expected.display())]
    Missing { expected: PathBuf },
    /// Character document exists but cannot be read or parsed
    #[error("Cannot read character config {}: {reason}", .path.display())]
    Unreadable { path: PathBuf, reason: String },
    /// Character document parsed but failed validation
    #[error("Invalid character config {}: {}", .path.display(), .errors.join("; "))]
    Invalid { path: PathBuf, errors: Vec<String> },
}

/// CLI arguments that can override settings values
#[derive(Debug, Default, Clone)]
pub struct CliOverrides {
    /// Override asset root
    pub base: Option<PathBuf>,
    /// Override cache root
    pub cache: Option<PathBuf>,
    /// Override output format
    pub format: Option<CacheFormat>,
    /// Override JPEG quality
    pub quality: Option<u8>,
    /// Number of parallel jobs
    pub jobs: Option<usize>,
}

/// Find galframe.toml by walking up from the current working directory.
///
/// Search order:
/// 1. Walk up from current directory looking for galframe.toml
/// 2. Check XDG_CONFIG_HOME/galframe/galframe.toml (or ~/.config/galframe/galframe.toml)
pub fn find_settings() -> Option<PathBuf> {
    if let Ok(cwd) = env::current_dir() {
        if let Some(path) = find_settings_from(cwd) {
            return Some(path);
        }
    }

    find_xdg_settings()
}

/// Find galframe.toml in the XDG config directory.
pub fn find_xdg_settings() -> Option<PathBuf> {
    let xdg_config = env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .or_else(|_| env::var("HOME").map(|h| PathBuf::from(h).join(".config")))
        .ok()?;

    let path = xdg_config.join("galframe").join(SETTINGS_FILENAME);
    if path.exists() {
        Some(path)
    } else {
        None
    }
}

/// Find galframe.toml by walking up from a specific directory.
pub fn find_settings_from(start: PathBuf) -> Option<PathBuf> {
    let mut current = start;

    loop {
        let path = current.join(SETTINGS_FILENAME);
        if path.exists() {
            return Some(path);
        }

        if !current.pop() {
            return None;
        }
    }
}

/// Load settings from galframe.toml.
///
/// If a path is provided, loads from that file. Otherwise uses
/// [`find_settings`]; when nothing is found the defaults are returned.
/// Relative `paths.*` entries resolve against the settings file's directory.
pub fn load_settings(path: Option<&Path>) -> Result<Settings, ConfigError> {
    let settings_path = match path {
        Some(p) => Some(p.to_path_buf()),
        None => find_settings(),
    };

    match settings_path {
        Some(p) => load_settings_file(&p),
        None => Ok(Settings::default()),
    }
}

fn load_settings_file(path: &Path) -> Result<Settings, ConfigError> {
    let contents = fs::read_to_string(path)?;
    let mut settings: Settings = toml::from_str(&contents)?;

    let errors = settings.validate();
    if !errors.is_empty() {
        return Err(ConfigError::Validation(errors.into_iter().map(|e| e.to_string()).collect()));
    }

    if let Some(root) = path.parent() {
        settings.paths.base = resolve_path(root, &settings.paths.base);
        settings.paths.cache = resolve_path(root, &settings.paths.cache);
    }

    tracing::debug!(path = %path.display(), "loaded settings");
    Ok(settings)
}

/// Merge CLI overrides into settings. CLI arguments take precedence.
pub fn merge_cli_overrides(settings: &mut Settings, overrides: &CliOverrides) {
    if let Some(ref base) = overrides.base {
        settings.paths.base = base.clone();
    }
    if let Some(ref cache) = overrides.cache {
        settings.paths.cache = cache.clone();
    }
    if let Some(format) = overrides.format {
        settings.render.cache_format = format;
    }
    if let Some(quality) = overrides.quality {
        settings.render.jpeg_quality = quality;
    }
    if let Some(jobs) = overrides.jobs {
        settings.build.jobs = jobs;
    }
}

/// Resolve a path relative to a root directory.
///
/// If the path is absolute, returns it unchanged.
pub fn resolve_path(root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

/// Locate a character's layout document: `config.yaml` (or `config.yml`)
/// first, then the legacy `config.json`.
pub fn character_config_path(char_root: &Path) -> Option<PathBuf> {
    [CHARACTER_CONFIG_YAML, "config.yml", CHARACTER_CONFIG_JSON]
        .iter()
        .map(|name| char_root.join(name))
        .find(|path| path.is_file())
}

/// A character document together with its resolved layout
#[derive(Debug, Clone)]
pub struct LoadedCharacter {
    /// File the document was read from
    pub path: PathBuf,
    pub config: CharacterConfig,
    pub layout: ResolvedLayout,
}

/// Load and resolve the layout document of the character at `char_root`.
pub fn load_character_config(char_root: &Path) -> Result<LoadedCharacter, ConfigError> {
    let path = character_config_path(char_root)
        .ok_or_else(|| ConfigError::Missing { expected: char_root.join(CHARACTER_CONFIG_YAML) })?;

    let unreadable =
        |reason: String| ConfigError::Unreadable { path: path.clone(), reason };

    let text = fs::read_to_string(&path).map_err(|e| unreadable(e.to_string()))?;
    let value: serde_json::Value = if is_json(&path) {
        serde_json::from_str(&text).map_err(|e| unreadable(e.to_string()))?
    } else {
        serde_yaml::from_str(&text).map_err(|e| unreadable(e.to_string()))?
    };

    match &value {
        serde_json::Value::Object(map) if !map.is_empty() => {}
        _ => return Err(unreadable("document is empty or not a mapping".to_string())),
    }

    let config: CharacterConfig =
        serde_json::from_value(value).map_err(|e| unreadable(e.to_string()))?;
    let layout = config.resolve().map_err(|errors| ConfigError::Invalid {
        path: path.clone(),
        errors: errors.iter().map(ConfigValidationError::to_string).collect(),
    })?;

    tracing::debug!(path = %path.display(), canvas = %layout.canvas, "loaded character config");
    Ok(LoadedCharacter { path, config, layout })
}

fn is_json(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()).is_some_and(|e| e.eq_ignore_ascii_case("json"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{CanvasSpec, DEFAULT_CANVAS};
    use std::fs::File;
    use std::io::Write;
    use tempfile::TempDir;

    fn write(path: &Path, content: &str) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        File::create(path).unwrap().write_all(content.as_bytes()).unwrap();
    }

    #[test]
    fn test_find_settings_in_current_dir() {
        let temp = TempDir::new().expect("should create temp dir");
        let path = temp.path().join(SETTINGS_FILENAME);
        write(&path, "[render]\ncache_format = \"png\"\n");

        assert_eq!(find_settings_from(temp.path().to_path_buf()), Some(path));
    }

    #[test]
    fn test_find_settings_in_parent_dir() {
        let temp = TempDir::new().expect("should create temp dir");
        let path = temp.path().join(SETTINGS_FILENAME);
        write(&path, "");

        let subdir = temp.path().join("assets").join("characters");
        fs::create_dir_all(&subdir).unwrap();

        assert_eq!(find_settings_from(subdir), Some(path));
    }

    #[test]
    fn test_load_settings_resolves_relative_paths() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(SETTINGS_FILENAME);
        write(&path, "[paths]\nbase = \"art\"\ncache = \"/abs/cache\"\n");

        let settings = load_settings(Some(&path)).unwrap();
        assert_eq!(settings.paths.base, temp.path().join("art"));
        assert_eq!(settings.paths.cache, PathBuf::from("/abs/cache"));
    }

    #[test]
    fn test_load_settings_validation_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(SETTINGS_FILENAME);
        write(&path, "[render]\njpeg_quality = 101\n");

        let err = load_settings(Some(&path)).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
        assert!(err.to_string().contains("render.jpeg_quality"));
    }

    #[test]
    fn test_load_settings_parse_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(SETTINGS_FILENAME);
        write(&path, "[render\n");

        assert!(matches!(load_settings(Some(&path)), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_merge_cli_overrides() {
        let mut settings = Settings::default();
        let overrides = CliOverrides {
            base: Some(PathBuf::from("elsewhere")),
            format: Some(CacheFormat::Png),
            jobs: Some(3),
            ..Default::default()
        };
        merge_cli_overrides(&mut settings, &overrides);

        assert_eq!(settings.paths.base, PathBuf::from("elsewhere"));
        assert_eq!(settings.paths.cache, PathBuf::from("assets/cache"));
        assert_eq!(settings.render.cache_format, CacheFormat::Png);
        assert_eq!(settings.render.jpeg_quality, 90);
        assert_eq!(settings.build.jobs, 3);
    }

    #[test]
    fn test_character_config_missing() {
        let temp = TempDir::new().unwrap();
        let err = load_character_config(temp.path()).unwrap_err();
        match err {
            ConfigError::Missing { expected } => {
                assert_eq!(expected, temp.path().join("config.yaml"))
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_character_config_yaml() {
        let temp = TempDir::new().unwrap();
        write(
            &temp.path().join("config.yaml"),
            "assets:\n  dialog_box: box.png\nlayout:\n  stand_pos: [100, 50]\n  stand_scale: 0.5\n  canvas_size: [1280, 720]\n",
        );

        let loaded = load_character_config(temp.path()).unwrap();
        assert_eq!(loaded.config.assets.dialog_box, "box.png");
        assert_eq!(loaded.layout.canvas, CanvasSpec::new(1280, 720));
        assert_eq!(loaded.layout.stand_pos, (100, 50));
        assert_eq!(loaded.layout.stand_scale, 0.5);
    }

    #[test]
    fn test_yaml_preferred_over_legacy_json() {
        let temp = TempDir::new().unwrap();
        write(&temp.path().join("config.json"), r#"{"layout": {"canvas_size": [640, 480]}}"#);
        write(&temp.path().join("config.yaml"), "layout:\n  canvas_size: [800, 600]\n");

        let loaded = load_character_config(temp.path()).unwrap();
        assert_eq!(loaded.path, temp.path().join("config.yaml"));
        assert_eq!(loaded.layout.canvas, CanvasSpec::new(800, 600));
    }

    #[test]
    fn test_legacy_json_fallback() {
        let temp = TempDir::new().unwrap();
        write(&temp.path().join("config.json"), r#"{"layout": {"stand_on_top": true}}"#);

        let loaded = load_character_config(temp.path()).unwrap();
        assert_eq!(loaded.path, temp.path().join("config.json"));
        assert_eq!(loaded.layout.canvas, DEFAULT_CANVAS);
    }

    #[test]
    fn test_character_config_unreadable() {
        let temp = TempDir::new().unwrap();
        write(&temp.path().join("config.yaml"), "layout: [unclosed\n");

        assert!(matches!(
            load_character_config(temp.path()),
            Err(ConfigError::Unreadable { .. })
        ));
    }

    #[test]
    fn test_empty_character_config_is_unreadable() {
        let temp = TempDir::new().unwrap();
        write(&temp.path().join("config.json"), "{}");

        assert!(matches!(
            load_character_config(temp.path()),
            Err(ConfigError::Unreadable { .. })
        ));
    }

    #[test]
    fn test_character_config_invalid_layers() {
        let temp = TempDir::new().unwrap();
        write(&temp.path().join("config.yaml"), "layout:\n  layers: [background, box]\n");

        match load_character_config(temp.path()) {
            Err(ConfigError::Invalid { errors, .. }) => {
                assert!(errors[0].contains("layout.layers"))
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
