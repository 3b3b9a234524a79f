use image::{Rgba, RgbaImage, imageops};
use rayon::prelude::*;
use std::sync::Arc;
use thiserror::Error;

use crate::components::history::HistoryManager;
use crate::components::patterns::PatternTile;
use crate::ops::shapes::{self, Geometry};
use crate::ops::templates::{self, BuiltinTemplate};
use crate::viewport::Viewport;
use crate::{log_info, log_warn};

pub const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);
pub const TRANSPARENT: Rgba<u8> = Rgba([0, 0, 0, 0]);
/// Colour shown around the drawing area when the view is zoomed out or panned.
pub const BACKDROP: Rgba<u8> = Rgba([232, 230, 238, 255]);

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SurfaceError {
    #[error("surface has zero size ({width}x{height})")]
    ZeroSize { width: u32, height: u32 },
}

// ============================================================================
// BLENDING
// ============================================================================

/// How a source pixel combines with the destination.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum BlendMode {
    /// Source-over.
    #[default]
    Normal,
    /// Destination-out: source alpha removes destination alpha.
    Erase,
}

/// Blend `top` onto `base` with an extra `coverage` multiplier on top's alpha.
pub fn blend_pixel(base: Rgba<u8>, top: Rgba<u8>, coverage: f32, mode: BlendMode) -> Rgba<u8> {
    let top_a = (top[3] as f32 / 255.0) * coverage.clamp(0.0, 1.0);
    if top_a <= 0.0 {
        return base;
    }

    match mode {
        BlendMode::Normal => {
            if top_a >= 1.0 {
                return Rgba([top[0], top[1], top[2], 255]);
            }
            let base_a = base[3] as f32 / 255.0;
            let out_a = top_a + base_a * (1.0 - top_a);
            if out_a <= 0.0 {
                return TRANSPARENT;
            }
            let ch = |i: usize| {
                let v = (top[i] as f32 * top_a + base[i] as f32 * base_a * (1.0 - top_a)) / out_a;
                v.round().clamp(0.0, 255.0) as u8
            };
            Rgba([
                ch(0),
                ch(1),
                ch(2),
                (out_a * 255.0).round().clamp(0.0, 255.0) as u8,
            ])
        }
        BlendMode::Erase => {
            let a = (base[3] as f32 * (1.0 - top_a)).round().clamp(0.0, 255.0) as u8;
            if a == 0 {
                TRANSPARENT
            } else {
                Rgba([base[0], base[1], base[2], a])
            }
        }
    }
}

/// Where stroke and fill colour comes from.
#[derive(Clone, Debug)]
pub enum Paint {
    Solid(Rgba<u8>),
    /// Repeating tile anchored at the layer origin.
    Pattern(Arc<PatternTile>),
}

impl Paint {
    #[inline]
    pub fn sample(&self, x: u32, y: u32) -> Rgba<u8> {
        match self {
            Paint::Solid(c) => *c,
            Paint::Pattern(tile) => tile.pixel_at(x, y),
        }
    }
}

// ============================================================================
// LAYER
// ============================================================================

/// One full-resolution RGBA layer.
#[derive(Clone, Debug, PartialEq)]
pub struct Layer {
    image: RgbaImage,
}

impl Default for Layer {
    fn default() -> Self {
        Self::new(0, 0)
    }
}

impl Layer {
    /// Fully transparent layer.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            image: RgbaImage::new(width, height),
        }
    }

    pub fn filled(width: u32, height: u32, color: Rgba<u8>) -> Self {
        Self {
            image: RgbaImage::from_pixel(width, height, color),
        }
    }

    pub fn from_image(image: RgbaImage) -> Self {
        Self { image }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn image_mut(&mut self) -> &mut RgbaImage {
        &mut self.image
    }

    pub fn into_image(self) -> RgbaImage {
        self.image
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<Rgba<u8>> {
        if x < self.width() && y < self.height() {
            Some(*self.image.get_pixel(x, y))
        } else {
            None
        }
    }

    pub fn fill(&mut self, color: Rgba<u8>) {
        for px in self.image.pixels_mut() {
            *px = color;
        }
    }

    pub fn clear(&mut self) {
        self.fill(TRANSPARENT);
    }

    pub fn has_any_alpha(&self) -> bool {
        self.image.as_raw().par_chunks(4).any(|p| p[3] != 0)
    }

    /// Copy of the pixels for history. A zero-size layer has nothing to record.
    pub fn try_snapshot(&self) -> Result<RgbaImage, SurfaceError> {
        let (width, height) = (self.width(), self.height());
        if width == 0 || height == 0 {
            return Err(SurfaceError::ZeroSize { width, height });
        }
        Ok(self.image.clone())
    }

    /// Replace the pixels wholesale (used by undo/redo).
    pub fn restore(&mut self, image: &RgbaImage) {
        self.image.clone_from(image);
    }

    /// Rasterize `geom` and blend `paint` through its coverage.
    ///
    /// Returns `true` if at least one pixel was touched.
    pub fn draw(&mut self, geom: &Geometry, paint: &Paint, opacity: f32, mode: BlendMode) -> bool {
        let cov = shapes::rasterize(geom, self.width(), self.height());
        if cov.is_empty() {
            return false;
        }
        let mut touched = false;
        for (x, y, a) in cov.iter() {
            let src = paint.sample(x, y);
            let px = self.image.get_pixel_mut(x, y);
            *px = blend_pixel(*px, src, a * opacity, mode);
            touched = true;
        }
        touched
    }
}

// ============================================================================
// PAINT SURFACE: background (template art) + paint (user strokes)
// ============================================================================

/// What the background layer shows.
#[derive(Clone, Debug, PartialEq)]
pub enum TemplateSource {
    Builtin(BuiltinTemplate),
    /// Imported or loaded artwork at its own resolution; fitted on every redraw.
    Custom(RgbaImage),
}

impl Default for TemplateSource {
    fn default() -> Self {
        TemplateSource::Builtin(BuiltinTemplate::default())
    }
}

/// The two-layer drawing surface at device resolution.
#[derive(Clone, Debug, Default)]
pub struct PaintSurface {
    background: Layer,
    paint: Layer,
    dpr: f32,
    template: TemplateSource,
    generation: u64,
}

impl PaintSurface {
    pub fn new(template: TemplateSource) -> Self {
        Self {
            dpr: 1.0,
            template,
            ..Default::default()
        }
    }

    pub fn width(&self) -> u32 {
        self.paint.width()
    }

    pub fn height(&self) -> u32 {
        self.paint.height()
    }

    pub fn device_pixel_ratio(&self) -> f32 {
        self.dpr
    }

    pub fn background(&self) -> &Layer {
        &self.background
    }

    pub fn paint(&self) -> &Layer {
        &self.paint
    }

    /// Mutable paint layer. Marks the surface as changed.
    pub fn paint_mut(&mut self) -> &mut Layer {
        self.generation = self.generation.wrapping_add(1);
        &mut self.paint
    }

    pub fn template(&self) -> &TemplateSource {
        &self.template
    }

    /// Bumped on every visible change; the front end re-uploads when it moves.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    fn touch(&mut self) {
        self.generation = self.generation.wrapping_add(1);
    }

    /// Reallocate both layers for a new display size and restart history.
    pub fn resize(&mut self, css_w: f32, css_h: f32, dpr: f32, history: &mut HistoryManager) {
        let dpr = if dpr.is_finite() { dpr.max(1.0) } else { 1.0 };
        let w = (css_w.max(0.0) * dpr).round() as u32;
        let h = (css_h.max(0.0) * dpr).round() as u32;
        self.dpr = dpr;
        self.background = Layer::new(w, h);
        self.paint = Layer::new(w, h);
        history.reset();
        self.redraw_background();
        history.snapshot(&self.paint);
        log_info!("Surface resized to {}x{} (dpr {})", w, h, dpr);
    }

    /// Repaint the background layer from the current template source.
    pub fn redraw_background(&mut self) {
        let (w, h) = (self.background.width(), self.background.height());
        self.touch();
        if w == 0 || h == 0 {
            return;
        }
        match &self.template {
            TemplateSource::Custom(img) => {
                self.background = Layer::from_image(fit_onto_white(img, w, h));
            }
            TemplateSource::Builtin(t) => {
                templates::draw(&mut self.background, *t, self.dpr);
            }
        }
    }

    /// Switch to a built-in template. History restarts from the resulting paint.
    pub fn set_template(&mut self, template: BuiltinTemplate, clear_paint: bool, history: &mut HistoryManager) {
        self.install_template(TemplateSource::Builtin(template), clear_paint, history);
    }

    /// Install imported artwork as the template, optionally starting over.
    pub fn import_template(&mut self, image: RgbaImage, clear_paint: bool, history: &mut HistoryManager) {
        log_info!(
            "Importing template {}x{} (clear paint: {})",
            image.width(),
            image.height(),
            clear_paint
        );
        self.install_template(TemplateSource::Custom(image), clear_paint, history);
    }

    fn install_template(&mut self, template: TemplateSource, clear_paint: bool, history: &mut HistoryManager) {
        self.template = template;
        if clear_paint {
            self.paint.clear();
        }
        history.reset();
        history.snapshot(&self.paint);
        self.redraw_background();
    }

    /// Wipe strokes only; the template stays.
    pub fn clear_paint(&mut self, history: &mut HistoryManager) {
        self.paint_mut().clear();
        history.snapshot(&self.paint);
    }

    /// Clear both layers to transparent. History is left alone.
    pub fn wipe_all(&mut self) {
        self.background.clear();
        self.paint.clear();
        self.touch();
    }

    pub fn has_any_paint(&self) -> bool {
        self.paint.has_any_alpha()
    }

    /// Show a saved composite as the template and start a clean paint layer.
    pub fn load_flattened_as_template(&mut self, image: RgbaImage, history: &mut HistoryManager) {
        self.template = TemplateSource::Custom(image);
        self.paint.clear();
        self.redraw_background();
        history.snapshot(&self.paint);
    }

    /// Background with paint on top, untransformed. Transparent where both are.
    pub fn flatten(&self) -> RgbaImage {
        self.flatten_over(TRANSPARENT)
    }

    /// Background and paint on opaque white, at native resolution.
    pub fn export_flattened(&self) -> RgbaImage {
        self.flatten_over(WHITE)
    }

    fn flatten_over(&self, base: Rgba<u8>) -> RgbaImage {
        let (w, h) = (self.width(), self.height());
        let mut out = RgbaImage::from_pixel(w, h, base);
        if w == 0 || h == 0 {
            return out;
        }
        let row_bytes = w as usize * 4;
        let bg = self.background.image().as_raw();
        let paint = self.paint.image().as_raw();
        let bg_ok = bg.len() == paint.len();
        out.par_chunks_mut(row_bytes)
            .enumerate()
            .for_each(|(row, row_buf)| {
                let start = row * row_bytes;
                for (i, px) in row_buf.chunks_exact_mut(4).enumerate() {
                    let o = start + i * 4;
                    let mut acc = Rgba([px[0], px[1], px[2], px[3]]);
                    if bg_ok {
                        acc = blend_pixel(acc, rgba_at(bg, o), 1.0, BlendMode::Normal);
                    }
                    acc = blend_pixel(acc, rgba_at(paint, o), 1.0, BlendMode::Normal);
                    px.copy_from_slice(&acc.0);
                }
            });
        out
    }

    /// Display image for the current view, sized to the viewport's device buffer.
    ///
    /// Each output pixel is mapped back through the viewport and sampled
    /// nearest-neighbour. Outside the scene the backdrop colour shows.
    pub fn composite(&self, viewport: &Viewport) -> RgbaImage {
        let (out_w, out_h) = viewport.buffer_size();
        let mut out = RgbaImage::from_pixel(out_w, out_h, BACKDROP);
        if out_w == 0 || out_h == 0 {
            return out;
        }
        let (w, h) = (self.width(), self.height());
        let dpr = viewport.device_pixel_ratio();
        let bg = self.background.image().as_raw();
        let paint = self.paint.image().as_raw();
        let bg_ok = bg.len() == paint.len();
        let row_bytes = out_w as usize * 4;

        out.par_chunks_mut(row_bytes)
            .enumerate()
            .for_each(|(row, row_buf)| {
                let sy = (row as f32 + 0.5) / dpr;
                for (col, px) in row_buf.chunks_exact_mut(4).enumerate() {
                    let sx = (col as f32 + 0.5) / dpr;
                    let scene = viewport.screen_to_scene(egui::Pos2::new(sx, sy));
                    let (fx, fy) = (scene.x.floor(), scene.y.floor());
                    if fx < 0.0 || fy < 0.0 || fx >= w as f32 || fy >= h as f32 {
                        continue;
                    }
                    let o = (fy as usize * w as usize + fx as usize) * 4;
                    let mut acc = WHITE;
                    if bg_ok {
                        acc = blend_pixel(acc, rgba_at(bg, o), 1.0, BlendMode::Normal);
                    }
                    acc = blend_pixel(acc, rgba_at(paint, o), 1.0, BlendMode::Normal);
                    px.copy_from_slice(&acc.0);
                }
            });
        out
    }
}

#[inline]
fn rgba_at(raw: &[u8], o: usize) -> Rgba<u8> {
    Rgba([raw[o], raw[o + 1], raw[o + 2], raw[o + 3]])
}

/// Scale `img` to fit `w` × `h` over white, keeping its aspect and centring it.
pub fn fit_onto_white(img: &RgbaImage, w: u32, h: u32) -> RgbaImage {
    let mut out = RgbaImage::from_pixel(w, h, WHITE);
    if img.width() == 0 || img.height() == 0 || w == 0 || h == 0 {
        return out;
    }
    let s = (w as f32 / img.width() as f32).min(h as f32 / img.height() as f32);
    let dw = ((img.width() as f32 * s).round() as u32).clamp(1, w);
    let dh = ((img.height() as f32 * s).round() as u32).clamp(1, h);
    let scaled = if (dw, dh) == img.dimensions() {
        img.clone()
    } else {
        imageops::resize(img, dw, dh, imageops::FilterType::Triangle)
    };
    let dx = ((w - dw) / 2) as i64;
    let dy = ((h - dh) / 2) as i64;
    imageops::overlay(&mut out, &scaled, dx, dy);
    out
}

/// Log-and-skip wrapper used where a failed snapshot is not fatal.
pub(crate) fn snapshot_or_warn(layer: &Layer) -> Option<RgbaImage> {
    match layer.try_snapshot() {
        Ok(img) => Some(img),
        Err(e) => {
            log_warn!("Snapshot skipped: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn surface(w: f32, h: f32) -> (PaintSurface, HistoryManager) {
        let mut history = HistoryManager::default();
        let mut s = PaintSurface::new(TemplateSource::Builtin(BuiltinTemplate::Blank));
        s.resize(w, h, 1.0, &mut history);
        (s, history)
    }

    #[test]
    fn normal_blend_over_transparent_keeps_colour() {
        let out = blend_pixel(TRANSPARENT, Rgba([200, 10, 10, 255]), 0.5, BlendMode::Normal);
        assert_eq!(out, Rgba([200, 10, 10, 128]));
    }

    #[test]
    fn erase_removes_alpha_only() {
        let base = Rgba([10, 20, 30, 200]);
        assert_eq!(blend_pixel(base, WHITE, 1.0, BlendMode::Erase), TRANSPARENT);
        let half = blend_pixel(base, WHITE, 0.5, BlendMode::Erase);
        assert_eq!(half, Rgba([10, 20, 30, 100]));
    }

    #[test]
    fn zero_size_snapshot_is_an_error() {
        let layer = Layer::new(0, 5);
        assert_eq!(
            layer.try_snapshot().unwrap_err(),
            SurfaceError::ZeroSize {
                width: 0,
                height: 5
            }
        );
    }

    #[test]
    fn resize_allocates_device_pixels_and_seeds_history() {
        let mut history = HistoryManager::default();
        let mut s = PaintSurface::new(TemplateSource::default());
        s.resize(50.0, 40.0, 2.0, &mut history);
        assert_eq!((s.width(), s.height()), (100, 80));
        assert_eq!(s.background().width(), 100);
        assert_eq!(history.undo_count(), 1);
        assert!(!history.can_undo());
    }

    #[test]
    fn export_is_opaque_even_when_wiped() {
        let (mut s, _h) = surface(8.0, 8.0);
        s.wipe_all();
        let out = s.export_flattened();
        assert!(out.pixels().all(|p| *p == WHITE));
        assert!(s.flatten().pixels().all(|p| p[3] == 0));
    }

    #[test]
    fn composite_shows_backdrop_outside_scene() {
        let (mut s, _h) = surface(10.0, 10.0);
        s.paint_mut().image_mut().put_pixel(0, 0, Rgba([255, 0, 0, 255]));
        let mut vp = Viewport::new(10.0, 10.0, 1.0);
        assert_eq!(*s.composite(&vp).get_pixel(0, 0), Rgba([255, 0, 0, 255]));
        vp.set_pan(5.0, 0.0);
        let img = s.composite(&vp);
        assert_eq!(*img.get_pixel(0, 0), BACKDROP);
        assert_eq!(*img.get_pixel(5, 0), Rgba([255, 0, 0, 255]));
    }

    #[test]
    fn clear_paint_keeps_template_and_snapshots() {
        let mut history = HistoryManager::default();
        let mut s = PaintSurface::new(TemplateSource::Builtin(BuiltinTemplate::House));
        s.resize(60.0, 60.0, 1.0, &mut history);
        let bg = s.background().clone();
        s.paint_mut().fill(Rgba([0, 0, 255, 255]));
        s.clear_paint(&mut history);
        assert!(!s.has_any_paint());
        assert_eq!(s.background(), &bg);
        assert_eq!(history.undo_count(), 2);
    }

    #[test]
    fn import_fits_and_centres() {
        let (mut s, mut history) = surface(20.0, 10.0);
        let art = RgbaImage::from_pixel(4, 4, Rgba([0, 0, 0, 255]));
        s.import_template(art, true, &mut history);
        let bg = s.background().image();
        assert_eq!(*bg.get_pixel(0, 5), WHITE);
        assert_eq!(*bg.get_pixel(10, 5), Rgba([0, 0, 0, 255]));
        assert_eq!(history.undo_count(), 1);
    }

    #[test]
    fn template_change_restarts_history() {
        let (mut s, mut history) = surface(30.0, 30.0);
        s.paint_mut().fill(Rgba([0, 0, 255, 255]));
        history.snapshot(s.paint());
        assert!(history.can_undo());

        s.set_template(BuiltinTemplate::Fish, false, &mut history);
        assert!(s.has_any_paint());
        assert!(!history.can_undo());
        assert_eq!(history.undo_count(), 1);

        s.set_template(BuiltinTemplate::House, true, &mut history);
        assert!(!s.has_any_paint());
        assert!(!history.can_undo());
        assert!(matches!(s.template(), TemplateSource::Builtin(BuiltinTemplate::House)));
    }
}
