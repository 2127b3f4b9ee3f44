//! Configuration schema types
//!
//! Two documents are described here: the tool-wide `galframe.toml` settings
//! and the per-character layout document (`config.yaml`, or the legacy
//! `config.json`) that the asset editor maintains.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Canvas size used when a character layout does not specify one.
pub const DEFAULT_CANVAS: CanvasSpec = CanvasSpec { width: 2560, height: 1440 };

/// Largest accepted canvas side in pixels.
pub const MAX_CANVAS_SIDE: u32 = 16_384;

/// Dialog box filename used when `assets.dialog_box` is absent.
pub const DEFAULT_DIALOG_BOX: &str = "textbox_bg.png";

/// Output encoding of cached composites
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CacheFormat {
    /// Lossy, alpha dropped
    #[default]
    Jpeg,
    /// Lossless RGBA
    Png,
}

impl CacheFormat {
    /// Name recorded in the cache manifest.
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheFormat::Jpeg => "jpeg",
            CacheFormat::Png => "png",
        }
    }

    /// File extension of cached composites (without the dot).
    pub fn extension(&self) -> &'static str {
        match self {
            CacheFormat::Jpeg => "jpg",
            CacheFormat::Png => "png",
        }
    }

    /// Parse a format name as accepted on the command line.
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "jpeg" | "jpg" => Some(CacheFormat::Jpeg),
            "png" => Some(CacheFormat::Png),
            _ => None,
        }
    }
}

impl std::fmt::Display for CacheFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How source files are identified when computing the cache signature
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SignatureMode {
    /// Path, modification time and size only
    #[default]
    Metadata,
    /// Metadata plus the file contents
    Content,
}

impl SignatureMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignatureMode::Metadata => "metadata",
            SignatureMode::Content => "content",
        }
    }
}

/// Effective canvas dimensions for one character build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CanvasSpec {
    pub width: u32,
    pub height: u32,
}

impl CanvasSpec {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Tag appended to persisted scaled backgrounds, e.g. `@2560x1440`.
    pub fn tag(&self) -> String {
        format!("@{}x{}", self.width, self.height)
    }

    pub fn as_array(&self) -> [u32; 2] {
        [self.width, self.height]
    }
}

impl Default for CanvasSpec {
    fn default() -> Self {
        DEFAULT_CANVAS
    }
}

impl std::fmt::Display for CanvasSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

// ============================================================================
// galframe.toml
// ============================================================================

/// Filesystem roots
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Asset root containing `characters/`, `common/` and `pre_scaled/`
    #[serde(default = "default_base")]
    pub base: PathBuf,
    /// Root of the composite cache
    #[serde(default = "default_cache")]
    pub cache: PathBuf,
}

fn default_base() -> PathBuf {
    PathBuf::from("assets")
}

fn default_cache() -> PathBuf {
    PathBuf::from("assets/cache")
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self { base: default_base(), cache: default_cache() }
    }
}

/// Output encoding settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderConfig {
    #[serde(default)]
    pub cache_format: CacheFormat,
    /// JPEG quality (1-100), ignored for PNG
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
    #[serde(default)]
    pub signature: SignatureMode,
}

fn default_jpeg_quality() -> u8 {
    90
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            cache_format: CacheFormat::default(),
            jpeg_quality: default_jpeg_quality(),
            signature: SignatureMode::default(),
        }
    }
}

/// Build execution settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BuildConfig {
    /// Worker threads for compositing; 0 uses available parallelism
    #[serde(default)]
    pub jobs: usize,
}

/// Watch mode configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Debounce delay in milliseconds
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u32,
    /// Clear terminal between rebuilds
    #[serde(default)]
    pub clear_screen: bool,
}

fn default_debounce_ms() -> u32 {
    300
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self { debounce_ms: default_debounce_ms(), clear_screen: false }
    }
}

/// Complete galframe.toml configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub render: RenderConfig,
    #[serde(default)]
    pub build: BuildConfig,
    #[serde(default)]
    pub watch: WatchConfig,
}

/// Configuration validation error
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigValidationError {
    /// Path to the invalid field (e.g., "layout.stand_scale")
    pub field: String,
    /// Error message
    pub message: String,
}

impl ConfigValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self { field: field.into(), message: message.into() }
    }
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "'{}' {}", self.field, self.message)
    }
}

impl Settings {
    /// Validate the settings and return any errors
    pub fn validate(&self) -> Vec<ConfigValidationError> {
        let mut errors = Vec::new();

        if self.paths.base.as_os_str().is_empty() {
            errors.push(ConfigValidationError::new("paths.base", "must be a non-empty path"));
        }
        if self.paths.cache.as_os_str().is_empty() {
            errors.push(ConfigValidationError::new("paths.cache", "must be a non-empty path"));
        }
        if self.render.jpeg_quality == 0 || self.render.jpeg_quality > 100 {
            errors.push(ConfigValidationError::new(
                "render.jpeg_quality",
                "must be between 1 and 100",
            ));
        }

        errors
    }

    /// Check if validation passed
    pub fn is_valid(&self) -> bool {
        self.validate().is_empty()
    }
}

// ============================================================================
// Character layout document
// ============================================================================

/// A 2D position written as `[x, y]`.
///
/// Coordinates may be integers or floats in the document; floats truncate
/// toward zero when converted to pixels.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point(pub f64, pub f64);

impl Point {
    pub fn to_pixels(self) -> (i64, i64) {
        (self.0 as i64, self.1 as i64)
    }
}

/// Named image layers of a composite
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Layer {
    Background,
    Portrait,
    DialogBox,
}

impl Layer {
    fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "background" | "bg" => Some(Layer::Background),
            "portrait" | "stand" => Some(Layer::Portrait),
            "box" | "dialog_box" => Some(Layer::DialogBox),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Layer::Background => "background",
            Layer::Portrait => "portrait",
            Layer::DialogBox => "box",
        }
    }
}

/// Bottom-to-top paint order of the three layers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerOrder(Vec<Layer>);

impl LayerOrder {
    /// The two orders expressible with the `stand_on_top` flag.
    pub fn from_stand_on_top(stand_on_top: bool) -> Self {
        if stand_on_top {
            Self(vec![Layer::Background, Layer::DialogBox, Layer::Portrait])
        } else {
            Self(vec![Layer::Background, Layer::Portrait, Layer::DialogBox])
        }
    }

    /// Parse an explicit list; every layer must appear exactly once.
    pub fn parse(names: &[String]) -> Result<Self, String> {
        let mut layers = Vec::with_capacity(names.len());
        for name in names {
            let layer = Layer::from_name(name).ok_or_else(|| format!("unknown layer '{}'", name))?;
            if layers.contains(&layer) {
                return Err(format!("layer '{}' listed more than once", layer.name()));
            }
            layers.push(layer);
        }
        for required in [Layer::Background, Layer::Portrait, Layer::DialogBox] {
            if !layers.contains(&required) {
                return Err(format!("missing layer '{}'", required.name()));
            }
        }
        Ok(Self(layers))
    }

    pub fn layers(&self) -> &[Layer] {
        &self.0
    }
}

impl Default for LayerOrder {
    fn default() -> Self {
        Self::from_stand_on_top(false)
    }
}

/// `assets` section of a character document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetsConfig {
    /// Dialog box image, relative to the character folder
    #[serde(default = "default_dialog_box")]
    pub dialog_box: String,
}

fn default_dialog_box() -> String {
    DEFAULT_DIALOG_BOX.to_string()
}

impl Default for AssetsConfig {
    fn default() -> Self {
        Self { dialog_box: default_dialog_box() }
    }
}

/// `layout` section of a character document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayoutConfig {
    #[serde(default)]
    pub stand_pos: Point,
    #[serde(default = "default_stand_scale")]
    pub stand_scale: f64,
    #[serde(default)]
    pub stand_on_top: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub box_pos: Option<Point>,
    /// Kept loose: malformed values fall back to the default canvas.
    #[serde(default, alias = "_canvas_size", skip_serializing_if = "Option::is_none")]
    pub canvas_size: Option<serde_json::Value>,
    /// Explicit layer order; overrides `stand_on_top` when present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layers: Option<Vec<String>>,
}

fn default_stand_scale() -> f64 {
    1.0
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            stand_pos: Point::default(),
            stand_scale: default_stand_scale(),
            stand_on_top: false,
            box_pos: None,
            canvas_size: None,
            layers: None,
        }
    }
}

/// A character's layout/style document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CharacterConfig {
    #[serde(default)]
    pub assets: AssetsConfig,
    #[serde(default)]
    pub layout: LayoutConfig,
}

/// Layout with defaults applied and every field checked
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedLayout {
    pub canvas: CanvasSpec,
    pub stand_pos: (i64, i64),
    pub stand_scale: f64,
    pub box_pos: Option<(i64, i64)>,
    pub layers: LayerOrder,
}

impl CharacterConfig {
    /// Validate the document and return any errors
    pub fn validate(&self) -> Vec<ConfigValidationError> {
        let mut errors = Vec::new();
        let layout = &self.layout;

        if !layout.stand_scale.is_finite() || layout.stand_scale <= 0.0 {
            errors.push(ConfigValidationError::new(
                "layout.stand_scale",
                "must be a positive number",
            ));
        }
        if let Some(canvas) = layout.canvas_size.as_ref().and_then(extract_canvas_size) {
            if canvas.width > MAX_CANVAS_SIDE || canvas.height > MAX_CANVAS_SIDE {
                errors.push(ConfigValidationError::new(
                    "layout.canvas_size",
                    format!("sides must not exceed {} pixels, got {}", MAX_CANVAS_SIDE, canvas),
                ));
            }
        }
        if let Some(names) = &layout.layers {
            if let Err(message) = LayerOrder::parse(names) {
                errors.push(ConfigValidationError::new("layout.layers", message));
            }
        }
        if self.assets.dialog_box.trim().is_empty() {
            errors.push(ConfigValidationError::new(
                "assets.dialog_box",
                "must be a non-empty filename",
            ));
        }

        errors
    }

    /// Apply defaults and resolve the canvas and layer order.
    pub fn resolve(&self) -> Result<ResolvedLayout, Vec<ConfigValidationError>> {
        let errors = self.validate();
        if !errors.is_empty() {
            return Err(errors);
        }

        let layout = &self.layout;
        let layers = match &layout.layers {
            Some(names) => LayerOrder::parse(names).map_err(|message| {
                vec![ConfigValidationError::new("layout.layers", message)]
            })?,
            None => LayerOrder::from_stand_on_top(layout.stand_on_top),
        };

        Ok(ResolvedLayout {
            canvas: resolve_canvas(layout),
            stand_pos: layout.stand_pos.to_pixels(),
            stand_scale: layout.stand_scale,
            box_pos: layout.box_pos.map(Point::to_pixels),
            layers,
        })
    }
}

/// Effective canvas for a layout: the explicit size when well-formed,
/// otherwise [`DEFAULT_CANVAS`].
pub fn resolve_canvas(layout: &LayoutConfig) -> CanvasSpec {
    layout.canvas_size.as_ref().and_then(extract_canvas_size).unwrap_or(DEFAULT_CANVAS)
}

/// Read `[w, h]` as two positive integers. Numeric strings are accepted.
pub fn extract_canvas_size(value: &serde_json::Value) -> Option<CanvasSpec> {
    let items = value.as_array()?;
    if items.len() != 2 {
        return None;
    }
    let w = as_dimension(&items[0])?;
    let h = as_dimension(&items[1])?;
    Some(CanvasSpec::new(w, h))
}

fn as_dimension(value: &serde_json::Value) -> Option<u32> {
    let n = match value {
        serde_json::Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64))?,
        serde_json::Value::String(s) => s.trim().parse::<i64>().ok()?,
        _ => return None,
    };
    if n > 0 {
        u32::try_from(n).ok()
    } else {
        None
    }
}
