use egui::Pos2;
use image::{Rgba, RgbaImage};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fmt;
use std::str::FromStr;

use crate::canvas::{BlendMode, Layer, Paint, blend_pixel};
use crate::components::history::HistoryManager;
use crate::components::patterns::PatternKind;
use crate::ops::shapes::{self, Geometry};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Tool {
    #[default]
    Brush,
    Eraser,
    Bucket,
    Pan,
}

impl Tool {
    pub fn all() -> &'static [Tool] {
        &[Tool::Brush, Tool::Eraser, Tool::Bucket, Tool::Pan]
    }

    pub fn label(&self) -> &'static str {
        match self {
            Tool::Brush => "Brush",
            Tool::Eraser => "Eraser",
            Tool::Bucket => "Fill",
            Tool::Pan => "Pan",
        }
    }

    /// Tools that start a stroke on pointer-down.
    pub fn draws_strokes(&self) -> bool {
        matches!(self, Tool::Brush | Tool::Eraser)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum BrushKind {
    #[default]
    Pen,
    Marker,
    Calligraphy,
    Crayon,
    Neon,
}

impl BrushKind {
    pub fn all() -> &'static [BrushKind] {
        &[
            BrushKind::Pen,
            BrushKind::Marker,
            BrushKind::Calligraphy,
            BrushKind::Crayon,
            BrushKind::Neon,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BrushKind::Pen => "pen",
            BrushKind::Marker => "marker",
            BrushKind::Calligraphy => "calligraphy",
            BrushKind::Crayon => "crayon",
            BrushKind::Neon => "neon",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            BrushKind::Pen => "Pen",
            BrushKind::Marker => "Marker",
            BrushKind::Calligraphy => "Calligraphy",
            BrushKind::Crayon => "Crayon",
            BrushKind::Neon => "Neon",
        }
    }

    /// Continuous-line brushes rasterize through the per-stroke coverage mask;
    /// the rest stamp dabs straight onto the layer.
    fn is_continuous(&self) -> bool {
        matches!(self, BrushKind::Pen | BrushKind::Marker)
    }
}

impl fmt::Display for BrushKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BrushKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BrushKind::all()
            .iter()
            .copied()
            .find(|b| b.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown brush '{}'", s))
    }
}

// ============================================================================
// SETTINGS: what the toolbar controls
// ============================================================================

pub const DEFAULT_BRUSH_SIZE: f32 = 12.0;
pub const DEFAULT_COLOR: Rgba<u8> = Rgba([0xff, 0x4d, 0x6d, 255]);
pub const MARKER_OPACITY: f32 = 0.6;
pub const CRAYON_ALPHA: f32 = 0.35;

#[derive(Clone, Debug, PartialEq)]
pub struct BrushSettings {
    pub tool: Tool,
    pub brush: BrushKind,
    pub color: Rgba<u8>,
    /// `None` paints solid colour.
    pub pattern: Option<PatternKind>,
    /// Brush diameter in CSS pixels.
    pub size: f32,
    /// Effective opacity in `[0, 1]`, see [`BrushSettings::set_opacity_percent`].
    pub opacity: f32,
    /// Bucket fills use the active pattern when set.
    pub bucket_pattern: bool,
}

impl Default for BrushSettings {
    fn default() -> Self {
        Self {
            tool: Tool::Brush,
            brush: BrushKind::Pen,
            color: DEFAULT_COLOR,
            pattern: None,
            size: DEFAULT_BRUSH_SIZE,
            opacity: 1.0,
            bucket_pattern: true,
        }
    }
}

impl BrushSettings {
    /// Slider percent to opacity. The square root makes low settings less faint.
    pub fn set_opacity_percent(&mut self, percent: f32) {
        self.opacity = (percent.clamp(0.0, 100.0) / 100.0).sqrt();
    }

    pub fn opacity_percent(&self) -> f32 {
        self.opacity * self.opacity * 100.0
    }
}

// ============================================================================
// STROKE
// ============================================================================

/// Parameters fixed for the lifetime of one stroke.
#[derive(Clone, Debug)]
pub struct StrokeStyle {
    pub brush: BrushKind,
    pub paint: Paint,
    /// Halo colour for neon; always the solid colour even when painting a pattern.
    pub glow: Rgba<u8>,
    pub opacity: f32,
    pub mode: BlendMode,
    /// Device pixels per brush size, i.e. `size * dpr / scale`.
    pub unit: f32,
}

impl StrokeStyle {
    pub fn brush(settings: &BrushSettings, paint: Paint, unit: f32) -> Self {
        Self {
            brush: settings.brush,
            paint,
            glow: settings.color,
            opacity: settings.opacity,
            mode: BlendMode::Normal,
            unit,
        }
    }

    /// Pen geometry that removes paint at full strength.
    pub fn eraser(unit: f32) -> Self {
        Self {
            brush: BrushKind::Pen,
            paint: Paint::Solid(Rgba([0, 0, 0, 255])),
            glow: Rgba([0, 0, 0, 255]),
            opacity: 1.0,
            mode: BlendMode::Erase,
            unit,
        }
    }
}

/// A gesture in progress.
#[derive(Clone, Debug)]
pub struct Stroke {
    style: StrokeStyle,
    points: Vec<Pos2>,
    /// Paint layer as it was at pointer-down (continuous brushes only).
    base: Option<RgbaImage>,
    /// Highest coverage seen per pixel so far (continuous brushes only).
    mask: Vec<u8>,
}

impl Stroke {
    fn last(&self) -> Option<Pos2> {
        self.points.last().copied()
    }
}

// ============================================================================
// BRUSH ENGINE
// ============================================================================

/// Rasterizes strokes into the paint layer.
#[derive(Clone, Debug)]
pub struct BrushEngine {
    active: Option<Stroke>,
    rng: StdRng,
}

impl Default for BrushEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl BrushEngine {
    pub fn new() -> Self {
        Self {
            active: None,
            rng: StdRng::from_entropy(),
        }
    }

    /// Deterministic jitter, for tests and headless runs.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            active: None,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    /// Start a stroke at `at` (scene pixels). Nothing is drawn yet.
    pub fn begin_stroke(&mut self, at: Pos2, style: StrokeStyle, layer: &Layer) {
        let continuous = style.mode == BlendMode::Erase || style.brush.is_continuous();
        let (base, mask) = if continuous {
            let len = layer.width() as usize * layer.height() as usize;
            (Some(layer.image().clone()), vec![0u8; len])
        } else {
            (None, Vec::new())
        };
        self.active = Some(Stroke {
            style,
            points: vec![at],
            base,
            mask,
        });
    }

    /// Extend the active stroke to `to`. Returns `true` if pixels changed.
    pub fn stroke_to(&mut self, to: Pos2, layer: &mut Layer) -> bool {
        let Some(stroke) = self.active.as_mut() else {
            return false;
        };
        let Some(from) = stroke.last() else {
            stroke.points.push(to);
            return false;
        };
        stroke.points.push(to);

        if stroke.base.is_some() {
            return rasterize_continuous(stroke, from, to, layer);
        }
        match stroke.style.brush {
            BrushKind::Calligraphy => stamp_calligraphy(&stroke.style, from, to, layer),
            BrushKind::Crayon => stamp_crayon(&stroke.style, from, to, layer, &mut self.rng),
            BrushKind::Neon => stamp_neon(&stroke.style, from, to, layer),
            BrushKind::Pen | BrushKind::Marker => false,
        }
    }

    /// Finish the stroke and commit exactly one history entry.
    ///
    /// Returns `true` if a stroke was active and its snapshot was recorded.
    pub fn end_stroke(&mut self, layer: &Layer, history: &mut HistoryManager) -> bool {
        if self.active.take().is_none() {
            return false;
        }
        history.snapshot(layer)
    }

    /// Drop the active stroke without committing. Drawn pixels stay as they are.
    pub fn cancel(&mut self) {
        self.active = None;
    }
}

/// Dab positions along `from -> to`, every `step` pixels starting at `from`.
fn dab_positions(from: Pos2, to: Pos2, step: f32) -> Vec<Pos2> {
    let dist = from.distance(to);
    if dist <= f32::EPSILON {
        return Vec::new();
    }
    let mut out = Vec::with_capacity((dist / step) as usize + 1);
    let mut i = 0.0;
    while i <= dist {
        out.push(from.lerp(to, i / dist));
        i += step;
    }
    out
}

fn dab_step(unit: f32) -> f32 {
    (unit * 0.45).max(1.0)
}

fn rasterize_continuous(stroke: &mut Stroke, from: Pos2, to: Pos2, layer: &mut Layer) -> bool {
    let style = &stroke.style;
    let (width, opacity) = match (style.mode, style.brush) {
        (BlendMode::Erase, _) => (style.unit, 1.0),
        (_, BrushKind::Marker) => (style.unit * 1.2, MARKER_OPACITY),
        _ => (style.unit, style.opacity),
    };
    let seg = Geometry::Capsule {
        ax: from.x,
        ay: from.y,
        bx: to.x,
        by: to.y,
        half_width: width * 0.5,
    };
    let (w, h) = (layer.width(), layer.height());
    let Some(base) = stroke.base.as_ref() else {
        return false;
    };
    if base.dimensions() != (w, h) {
        return false;
    }

    let cov = shapes::rasterize(&seg, w, h);
    let mut changed = false;
    let out = layer.image_mut();
    for (x, y, a) in cov.iter() {
        let idx = y as usize * w as usize + x as usize;
        let a8 = (a * 255.0).round() as u8;
        if a8 <= stroke.mask[idx] {
            continue;
        }
        stroke.mask[idx] = a8;
        let src = style.paint.sample(x, y);
        let px = blend_pixel(
            *base.get_pixel(x, y),
            src,
            a8 as f32 / 255.0 * opacity,
            style.mode,
        );
        out.put_pixel(x, y, px);
        changed = true;
    }
    changed
}

fn stamp_calligraphy(style: &StrokeStyle, from: Pos2, to: Pos2, layer: &mut Layer) -> bool {
    let d = to - from;
    let rotation = d.y.atan2(d.x) - std::f32::consts::FRAC_PI_6;
    let mut changed = false;
    for p in dab_positions(from, to, dab_step(style.unit)) {
        let nib = Geometry::Ellipse {
            cx: p.x,
            cy: p.y,
            rx: style.unit * 0.8,
            ry: style.unit * 0.35,
            rotation,
        };
        changed |= layer.draw(&nib, &style.paint, style.opacity, style.mode);
    }
    changed
}

fn stamp_crayon(
    style: &StrokeStyle,
    from: Pos2,
    to: Pos2,
    layer: &mut Layer,
    rng: &mut StdRng,
) -> bool {
    let jitter = style.unit * 0.4;
    let r = (style.unit * 0.12).max(1.0);
    let alpha = CRAYON_ALPHA * style.opacity;
    let mut changed = false;
    for p in dab_positions(from, to, dab_step(style.unit)) {
        for _ in 0..6 {
            let jx = (rng.r#gen::<f32>() - 0.5) * jitter;
            let jy = (rng.r#gen::<f32>() - 0.5) * jitter;
            let grain = Geometry::Disc {
                cx: p.x + jx,
                cy: p.y + jy,
                r,
            };
            changed |= layer.draw(&grain, &style.paint, alpha, style.mode);
        }
    }
    changed
}

fn stamp_neon(style: &StrokeStyle, from: Pos2, to: Pos2, layer: &mut Layer) -> bool {
    let r = style.unit * 0.45;
    let spread = style.unit.max(6.0);
    let halo_paint = Paint::Solid(style.glow);
    let mut changed = false;
    for p in dab_positions(from, to, dab_step(style.unit)) {
        let halo = Geometry::Glow {
            cx: p.x,
            cy: p.y,
            r,
            spread,
        };
        changed |= layer.draw(&halo, &halo_paint, style.opacity, style.mode);
        let core = Geometry::Disc { cx: p.x, cy: p.y, r };
        changed |= layer.draw(&core, &style.paint, style.opacity, style.mode);
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;

    const BLUE: Rgba<u8> = Rgba([20, 40, 220, 255]);

    fn settings(brush: BrushKind) -> BrushSettings {
        BrushSettings {
            brush,
            color: BLUE,
            ..Default::default()
        }
    }

    fn style(brush: BrushKind, unit: f32) -> StrokeStyle {
        StrokeStyle::brush(&settings(brush), Paint::Solid(BLUE), unit)
    }

    #[test]
    fn opacity_percent_uses_square_root() {
        let mut s = BrushSettings::default();
        s.set_opacity_percent(25.0);
        assert!((s.opacity - 0.5).abs() < 1e-6);
        assert!((s.opacity_percent() - 25.0).abs() < 1e-3);
        s.set_opacity_percent(400.0);
        assert_eq!(s.opacity, 1.0);
    }

    #[test]
    fn pointer_down_draws_nothing() {
        let mut layer = Layer::new(32, 32);
        let mut engine = BrushEngine::with_seed(1);
        engine.begin_stroke(Pos2::new(10.0, 10.0), style(BrushKind::Pen, 6.0), &layer);
        assert!(engine.is_active());
        assert!(!layer.has_any_alpha());
        assert!(engine.stroke_to(Pos2::new(20.0, 10.0), &mut layer));
        assert_eq!(layer.pixel(15, 10), Some(BLUE));
    }

    #[test]
    fn overlapping_pen_segments_do_not_stack_opacity() {
        let mut layer = Layer::new(40, 20);
        let mut engine = BrushEngine::with_seed(1);
        let mut st = style(BrushKind::Pen, 6.0);
        st.opacity = 0.5;
        engine.begin_stroke(Pos2::new(5.0, 10.0), st, &layer);
        engine.stroke_to(Pos2::new(30.0, 10.0), &mut layer);
        let once = layer.pixel(15, 10);
        engine.stroke_to(Pos2::new(5.0, 10.0), &mut layer);
        engine.stroke_to(Pos2::new(30.0, 10.0), &mut layer);
        assert_eq!(layer.pixel(15, 10), once);
        assert_eq!(once.map(|p| p[3]), Some(128));
    }

    #[test]
    fn marker_is_wider_and_fixed_opacity() {
        let mut layer = Layer::new(40, 40);
        let mut engine = BrushEngine::with_seed(1);
        engine.begin_stroke(Pos2::new(5.0, 20.0), style(BrushKind::Marker, 10.0), &layer);
        engine.stroke_to(Pos2::new(35.0, 20.0), &mut layer);
        assert_eq!(layer.pixel(20, 20).map(|p| p[3]), Some(153));
        // 1.2 * 10 wide: covered 5.5 px off-centre, a pen would not be
        assert!(layer.pixel(20, 25).map(|p| p[3]).unwrap_or(0) > 100);
    }

    #[test]
    fn eraser_removes_paint_under_the_stroke_only() {
        let mut layer = Layer::filled(30, 30, BLUE);
        let mut engine = BrushEngine::with_seed(1);
        engine.begin_stroke(Pos2::new(0.0, 15.0), StrokeStyle::eraser(4.0), &layer);
        engine.stroke_to(Pos2::new(30.0, 15.0), &mut layer);
        assert_eq!(layer.pixel(10, 15).map(|p| p[3]), Some(0));
        assert_eq!(layer.pixel(10, 2), Some(BLUE));
    }

    #[test]
    fn zero_length_move_stamps_nothing_for_dab_brushes() {
        for brush in [BrushKind::Calligraphy, BrushKind::Crayon, BrushKind::Neon] {
            let mut layer = Layer::new(20, 20);
            let mut engine = BrushEngine::with_seed(7);
            engine.begin_stroke(Pos2::new(10.0, 10.0), style(brush, 6.0), &layer);
            assert!(!engine.stroke_to(Pos2::new(10.0, 10.0), &mut layer));
            assert!(!layer.has_any_alpha(), "{brush}");
        }
    }

    #[test]
    fn calligraphy_nib_is_angled() {
        let mut layer = Layer::new(60, 60);
        let mut engine = BrushEngine::with_seed(1);
        engine.begin_stroke(Pos2::new(30.0, 30.0), style(BrushKind::Calligraphy, 20.0), &layer);
        engine.stroke_to(Pos2::new(30.5, 30.0), &mut layer);
        // Major axis at -30 degrees: up-right is inked, down-right is not
        assert!(layer.pixel(41, 23).map(|p| p[3]).unwrap_or(0) > 200);
        assert_eq!(layer.pixel(41, 37).map(|p| p[3]), Some(0));
    }

    #[test]
    fn crayon_is_seeded_and_translucent() {
        let run = |seed| {
            let mut layer = Layer::new(50, 50);
            let mut engine = BrushEngine::with_seed(seed);
            engine.begin_stroke(Pos2::new(5.0, 25.0), style(BrushKind::Crayon, 10.0), &layer);
            engine.stroke_to(Pos2::new(45.0, 25.0), &mut layer);
            layer
        };
        let a = run(3);
        assert_eq!(a, run(3));
        assert!(a.has_any_alpha());
        assert!(a.image().pixels().all(|p| p[3] < 255));
    }

    #[test]
    fn neon_glows_past_its_core() {
        let mut layer = Layer::new(60, 60);
        let mut engine = BrushEngine::with_seed(1);
        engine.begin_stroke(Pos2::new(10.0, 30.0), style(BrushKind::Neon, 10.0), &layer);
        engine.stroke_to(Pos2::new(50.0, 30.0), &mut layer);
        assert_eq!(layer.pixel(30, 30), Some(BLUE));
        let halo = layer.pixel(30, 42).map(|p| p[3]).unwrap_or(0);
        assert!(halo > 0 && halo < 255);
    }

    #[test]
    fn end_stroke_commits_once() {
        let mut layer = Layer::new(20, 20);
        let mut history = HistoryManager::default();
        history.snapshot(&layer);
        let mut engine = BrushEngine::with_seed(1);
        engine.begin_stroke(Pos2::new(2.0, 2.0), style(BrushKind::Pen, 3.0), &layer);
        for x in 3..18 {
            engine.stroke_to(Pos2::new(x as f32, 2.0), &mut layer);
        }
        assert_eq!(history.undo_count(), 1);
        assert!(engine.end_stroke(&layer, &mut history));
        assert_eq!(history.undo_count(), 2);
        assert!(!engine.end_stroke(&layer, &mut history));
        assert_eq!(history.undo_count(), 2);
    }
}
