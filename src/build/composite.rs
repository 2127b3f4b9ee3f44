//! Layer compositing for one portrait/background pair.
//!
//! Every composite is a canvas-sized RGBA surface that starts fully
//! transparent. The three layers are alpha-blended onto it in the order
//! given by [`LayerOrder`]:
//!
//! - background at `(0, 0)` (already scaled to the canvas)
//! - portrait at `stand_pos`, not clamped, so it may hang off any edge
//! - dialog box at its resolved position

use crate::config::{CanvasSpec, Layer, LayerOrder, ResolvedLayout};
use crate::output::resize_exact;
use image::imageops::{self, FilterType};
use image::RgbaImage;

/// Scale the dialog box to the canvas width, keeping its aspect ratio.
///
/// The new height is `floor(h * canvas_w / w)`, at least 1 px. Returns the
/// box untouched when the widths already match.
pub fn scale_box_to_canvas(dialog_box: RgbaImage, canvas: CanvasSpec) -> RgbaImage {
    let (w, h) = dialog_box.dimensions();
    if w == canvas.width || w == 0 {
        return dialog_box;
    }
    let new_h = (u64::from(h) * u64::from(canvas.width) / u64::from(w)).max(1);
    let new_h = u32::try_from(new_h).unwrap_or(u32::MAX);
    imageops::resize(&dialog_box, canvas.width, new_h, FilterType::Lanczos3)
}

/// Where the (already scaled) dialog box is drawn.
///
/// An explicit position is clamped per axis to `[-box_dim, canvas_dim]`;
/// without one the box sits at the bottom-left corner.
pub fn resolve_box_position(
    explicit: Option<(i64, i64)>,
    box_size: (u32, u32),
    canvas: CanvasSpec,
) -> (i64, i64) {
    let (box_w, box_h) = (i64::from(box_size.0), i64::from(box_size.1));
    let (canvas_w, canvas_h) = (i64::from(canvas.width), i64::from(canvas.height));

    match explicit {
        Some((x, y)) => (x.clamp(-box_w, canvas_w), y.clamp(-box_h, canvas_h)),
        None => (0, canvas_h - box_h),
    }
}

/// Largest scaled portrait side, as a multiple of the matching canvas side.
pub const MAX_PORTRAIT_FACTOR: u32 = 16;

/// Size of a `size` portrait scaled by `scale`, each side floored to at
/// least 1 px. `None` when a side would exceed [`MAX_PORTRAIT_FACTOR`]
/// times the canvas.
pub fn scaled_portrait_size(size: (u32, u32), scale: f64, canvas: CanvasSpec) -> Option<(u32, u32)> {
    let limit = |side: u32| f64::from(side) * f64::from(MAX_PORTRAIT_FACTOR);
    let w = (f64::from(size.0) * scale).floor();
    let h = (f64::from(size.1) * scale).floor();
    if !(w <= limit(canvas.width) && h <= limit(canvas.height)) {
        return None;
    }
    Some(((w as u32).max(1), (h as u32).max(1)))
}

/// Scale a portrait by `scale`, flooring each side to at least 1 px.
pub fn scale_portrait(portrait: RgbaImage, scale: f64) -> RgbaImage {
    if scale == 1.0 {
        return portrait;
    }
    let (w, h) = portrait.dimensions();
    let new_w = ((f64::from(w) * scale) as u32).max(1);
    let new_h = ((f64::from(h) * scale) as u32).max(1);
    resize_exact(portrait, new_w, new_h)
}

/// The parts of a composite shared by every pair of one build.
#[derive(Debug, Clone)]
pub struct Scene {
    canvas: CanvasSpec,
    layers: LayerOrder,
    stand_pos: (i64, i64),
    dialog_box: RgbaImage,
    box_pos: (i64, i64),
}

impl Scene {
    /// Build the scene from a resolved layout and the raw dialog box image.
    pub fn new(layout: &ResolvedLayout, dialog_box: RgbaImage) -> Self {
        let dialog_box = scale_box_to_canvas(dialog_box, layout.canvas);
        let box_pos = resolve_box_position(layout.box_pos, dialog_box.dimensions(), layout.canvas);
        tracing::debug!(
            box_w = dialog_box.width(),
            box_h = dialog_box.height(),
            box_x = box_pos.0,
            box_y = box_pos.1,
            "dialog box placed"
        );
        Self {
            canvas: layout.canvas,
            layers: layout.layers.clone(),
            stand_pos: layout.stand_pos,
            dialog_box,
            box_pos,
        }
    }

    pub fn canvas(&self) -> CanvasSpec {
        self.canvas
    }

    pub fn box_position(&self) -> (i64, i64) {
        self.box_pos
    }

    pub fn dialog_box(&self) -> &RgbaImage {
        &self.dialog_box
    }

    /// Composite one pair onto a fresh transparent canvas.
    pub fn compose(&self, background: &RgbaImage, portrait: &RgbaImage) -> RgbaImage {
        let mut canvas = RgbaImage::new(self.canvas.width, self.canvas.height);
        for layer in self.layers.layers() {
            match layer {
                Layer::Background => imageops::overlay(&mut canvas, background, 0, 0),
                Layer::Portrait => {
                    imageops::overlay(&mut canvas, portrait, self.stand_pos.0, self.stand_pos.1)
                }
                Layer::DialogBox => {
                    imageops::overlay(&mut canvas, &self.dialog_box, self.box_pos.0, self.box_pos.1)
                }
            }
        }
        canvas
    }
}
