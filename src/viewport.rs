use egui::{Pos2, Vec2};

pub const MIN_SCALE: f32 = 0.2;
pub const MAX_SCALE: f32 = 10.0;
/// Step used by the toolbar zoom buttons.
pub const ZOOM_STEP: f32 = 1.2;
/// Step used per mouse wheel notch.
pub const WHEEL_ZOOM_STEP: f32 = 1.1;

// ============================================================================
// VIEWPORT: screen (CSS) <-> scene (device pixel) transform
// ============================================================================

/// Display transform of the painting surface.
///
/// Screen coordinates are CSS pixels relative to the top-left of the canvas
/// area. Scene coordinates are device pixels of the layer buffers. The two are
/// related by `scene = (screen - pan) / scale * dpr`.
#[derive(Clone, Debug, PartialEq)]
pub struct Viewport {
    scale: f32,
    pan: Vec2,
    dpr: f32,
    css_size: Vec2,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            scale: 1.0,
            pan: Vec2::ZERO,
            dpr: 1.0,
            css_size: Vec2::ZERO,
        }
    }
}

impl Viewport {
    pub fn new(css_w: f32, css_h: f32, dpr: f32) -> Self {
        let mut vp = Self::default();
        vp.resize_to_display(css_w, css_h, dpr);
        vp
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    pub fn pan(&self) -> Vec2 {
        self.pan
    }

    pub fn device_pixel_ratio(&self) -> f32 {
        self.dpr
    }

    pub fn css_size(&self) -> Vec2 {
        self.css_size
    }

    /// Device buffer size, `round(css * dpr)` on each axis.
    pub fn buffer_size(&self) -> (u32, u32) {
        buffer_dim(self.css_size.x, self.css_size.y, self.dpr)
    }

    pub fn screen_to_scene(&self, p: Pos2) -> Pos2 {
        let v = (p.to_vec2() - self.pan) / self.scale * self.dpr;
        v.to_pos2()
    }

    pub fn scene_to_screen(&self, s: Pos2) -> Pos2 {
        let v = s.to_vec2() / self.dpr * self.scale + self.pan;
        v.to_pos2()
    }

    /// Device-pixel width that appears as `size` CSS pixels at the current zoom.
    pub fn stroke_unit(&self, size: f32) -> f32 {
        size * self.dpr / self.scale
    }

    /// Set the zoom level, keeping the scene point under `anchor` fixed on screen.
    pub fn set_zoom(&mut self, new_scale: f32, anchor: Pos2) {
        if !new_scale.is_finite() {
            return;
        }
        let logical = (anchor.to_vec2() - self.pan) / self.scale;
        self.scale = new_scale.clamp(MIN_SCALE, MAX_SCALE);
        self.pan = anchor.to_vec2() - logical * self.scale;
    }

    pub fn set_pan(&mut self, x: f32, y: f32) {
        self.pan = Vec2::new(x, y);
    }

    pub fn pan_by(&mut self, delta: Vec2) {
        self.pan += delta;
    }

    fn css_centre(&self) -> Pos2 {
        (self.css_size * 0.5).to_pos2()
    }

    pub fn zoom_in(&mut self) {
        self.set_zoom(self.scale * ZOOM_STEP, self.css_centre());
    }

    pub fn zoom_out(&mut self) {
        self.set_zoom(self.scale / ZOOM_STEP, self.css_centre());
    }

    /// Wheel zoom: negative `delta_y` (scroll up) zooms in.
    pub fn zoom_wheel(&mut self, delta_y: f32, anchor: Pos2) {
        if delta_y == 0.0 {
            return;
        }
        let factor = if delta_y < 0.0 {
            WHEEL_ZOOM_STEP
        } else {
            1.0 / WHEEL_ZOOM_STEP
        };
        self.set_zoom(self.scale * factor, anchor);
    }

    /// Two-contact pinch from `prev` to `cur` contact positions (screen space).
    pub fn pinch(&mut self, prev: (Pos2, Pos2), cur: (Pos2, Pos2)) {
        let prev_dist = prev.0.distance(prev.1);
        let cur_dist = cur.0.distance(cur.1);
        let prev_centre = prev.0.lerp(prev.1, 0.5);
        let cur_centre = cur.0.lerp(cur.1, 0.5);
        if prev_dist > f32::EPSILON {
            self.set_zoom(self.scale * (cur_dist / prev_dist), cur_centre);
        }
        self.pan_by(cur_centre - prev_centre);
    }

    pub fn reset_view(&mut self) {
        self.scale = 1.0;
        self.pan = Vec2::ZERO;
    }

    /// Adopt a new display size. The view transform resets to identity.
    pub fn resize_to_display(&mut self, css_w: f32, css_h: f32, dpr: f32) {
        self.dpr = if dpr.is_finite() { dpr.max(1.0) } else { 1.0 };
        self.css_size = Vec2::new(css_w.max(0.0), css_h.max(0.0));
        self.reset_view();
    }
}

fn buffer_dim(css_w: f32, css_h: f32, dpr: f32) -> (u32, u32) {
    (
        (css_w * dpr).round().max(0.0) as u32,
        (css_h * dpr).round().max(0.0) as u32,
    )
}
