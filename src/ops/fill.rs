use image::{Rgba, RgbaImage};

use crate::canvas::{Paint, PaintSurface};
use crate::components::history::HistoryManager;
use crate::log_info;

/// Euclidean RGBA distance a pixel may differ from the seed and still fill.
pub const DEFAULT_TOLERANCE: f32 = 120.0;

// ============================================================================
// MATCHING
// ============================================================================

/// Dark, mostly opaque pixels are line art and stop the fill.
#[inline]
pub fn is_boundary(p: [u8; 4]) -> bool {
    (p[0] as u32 + p[1] as u32 + p[2] as u32) < 80 && p[3] > 30
}

#[inline]
pub fn color_distance(a: [u8; 4], b: [u8; 4]) -> f32 {
    let d = |i: usize| a[i] as f32 - b[i] as f32;
    (d(0) * d(0) + d(1) * d(1) + d(2) * d(2) + d(3) * d(3)).sqrt()
}

// ============================================================================
// MASK
// ============================================================================

/// Region selected by a flood fill.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FillMask {
    pub width: u32,
    pub height: u32,
    /// `width * height` bytes, 1 = filled.
    pub mask: Vec<u8>,
    pub count: usize,
    /// `(min_x, min_y, max_x, max_y)`, inclusive. `None` when nothing filled.
    pub bbox: Option<(u32, u32, u32, u32)>,
}

impl FillMask {
    fn empty(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            mask: vec![0; width as usize * height as usize],
            count: 0,
            bbox: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn contains(&self, x: u32, y: u32) -> bool {
        x < self.width && y < self.height && self.mask[y as usize * self.width as usize + x as usize] != 0
    }
}

/// Scanline flood fill over a flattened image.
///
/// Grows the 4-connected region around `(seed_x, seed_y)` whose pixels are not
/// boundary and lie within `tolerance` of the seed colour. Each popped seed is
/// extended left and right into a run; every contiguous matching stretch in
/// the rows above and below the run pushes one new seed.
pub fn compute_fill_mask(flat: &RgbaImage, seed_x: i64, seed_y: i64, tolerance: f32) -> FillMask {
    let (w, h) = flat.dimensions();
    let mut out = FillMask::empty(w, h);
    if seed_x < 0 || seed_y < 0 || seed_x >= w as i64 || seed_y >= h as i64 {
        return out;
    }

    let wu = w as usize;
    let raw = flat.as_raw();

    #[inline(always)]
    fn pix(raw: &[u8], idx: usize) -> [u8; 4] {
        let o = idx * 4;
        [raw[o], raw[o + 1], raw[o + 2], raw[o + 3]]
    }

    let target = pix(raw, seed_y as usize * wu + seed_x as usize);
    if is_boundary(target) {
        return out;
    }
    let matches = |idx: usize| {
        let p = pix(raw, idx);
        !is_boundary(p) && color_distance(p, target) <= tolerance
    };

    let mask = &mut out.mask;
    let (mut min_x, mut min_y, mut max_x, mut max_y) = (u32::MAX, u32::MAX, 0u32, 0u32);
    let mut count = 0usize;

    let mut stack: Vec<(u32, u32)> = Vec::with_capacity(256);
    stack.push((seed_x as u32, seed_y as u32));

    while let Some((x0, y)) = stack.pop() {
        let row = y as usize * wu;
        if mask[row + x0 as usize] != 0 || !matches(row + x0 as usize) {
            continue;
        }

        let mut left = x0 as usize;
        while left > 0 && mask[row + left - 1] == 0 && matches(row + left - 1) {
            left -= 1;
        }
        let mut right = x0 as usize;
        while right + 1 < wu && mask[row + right + 1] == 0 && matches(row + right + 1) {
            right += 1;
        }

        for x in left..=right {
            mask[row + x] = 1;
        }
        count += right - left + 1;
        min_x = min_x.min(left as u32);
        max_x = max_x.max(right as u32);
        min_y = min_y.min(y);
        max_y = max_y.max(y);

        let scan = |ny: u32, stack: &mut Vec<(u32, u32)>| {
            let nrow = ny as usize * wu;
            let mut in_run = false;
            for x in left..=right {
                let ok = mask[nrow + x] == 0 && matches(nrow + x);
                if ok && !in_run {
                    stack.push((x as u32, ny));
                }
                in_run = ok;
            }
        };
        if y > 0 {
            scan(y - 1, &mut stack);
        }
        if y + 1 < h {
            scan(y + 1, &mut stack);
        }
    }

    out.count = count;
    if count > 0 {
        out.bbox = Some((min_x, min_y, max_x, max_y));
    }
    out
}

// ============================================================================
// ENGINE
// ============================================================================

#[derive(Clone, Debug, PartialEq)]
pub struct FloodFillEngine {
    tolerance: f32,
}

impl Default for FloodFillEngine {
    fn default() -> Self {
        Self::new(DEFAULT_TOLERANCE)
    }
}

impl FloodFillEngine {
    pub fn new(tolerance: f32) -> Self {
        Self {
            tolerance: tolerance.max(0.0),
        }
    }

    pub fn tolerance(&self) -> f32 {
        self.tolerance
    }

    pub fn set_tolerance(&mut self, tolerance: f32) {
        self.tolerance = tolerance.max(0.0);
    }

    /// Fill the region under `(x, y)` (scene pixels) into the paint layer.
    ///
    /// Solid paint is written opaque; a pattern writes its tile pixel as-is.
    /// Returns `true` when something was filled and one snapshot committed.
    pub fn fill(
        &self,
        surface: &mut PaintSurface,
        x: i64,
        y: i64,
        paint: &Paint,
        history: &mut HistoryManager,
    ) -> bool {
        let flat = surface.flatten();
        let region = compute_fill_mask(&flat, x, y, self.tolerance);
        let Some((min_x, min_y, max_x, max_y)) = region.bbox else {
            log_info!("Fill at ({}, {}) selected nothing", x, y);
            return false;
        };

        let layer = surface.paint_mut().image_mut();
        for py in min_y..=max_y {
            for px in min_x..=max_x {
                if !region.contains(px, py) {
                    continue;
                }
                let src = match paint {
                    Paint::Solid(c) => Rgba([c[0], c[1], c[2], 255]),
                    Paint::Pattern(_) => paint.sample(px, py),
                };
                layer.put_pixel(px, py, src);
            }
        }

        history.snapshot(surface.paint());
        true
    }
}
