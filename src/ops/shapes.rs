use rayon::prelude::*;

// ============================================================================
// GEOMETRY: everything a brush, pattern or template can put on a layer
// ============================================================================

/// A primitive that can be rasterized to an anti-aliased coverage mask.
///
/// All coordinates are in layer (device) pixels, with pixel centres at `+0.5`.
#[derive(Clone, Debug, PartialEq)]
pub enum Geometry {
    /// Filled circle.
    Disc { cx: f32, cy: f32, r: f32 },
    /// Filled ellipse rotated by `rotation` radians around its centre.
    Ellipse {
        cx: f32,
        cy: f32,
        rx: f32,
        ry: f32,
        rotation: f32,
    },
    /// Line segment with round caps (a stadium).
    Capsule {
        ax: f32,
        ay: f32,
        bx: f32,
        by: f32,
        half_width: f32,
    },
    /// Disc with a soft halo that fades out over `spread` pixels.
    Glow {
        cx: f32,
        cy: f32,
        r: f32,
        spread: f32,
    },
    /// Filled polygon (even-odd rule, any winding).
    Polygon(Vec<(f32, f32)>),
    /// Stroked path with round joins.
    Polyline {
        points: Vec<(f32, f32)>,
        closed: bool,
        half_width: f32,
    },
    /// Stroked ellipse outline.
    EllipseOutline {
        cx: f32,
        cy: f32,
        rx: f32,
        ry: f32,
        rotation: f32,
        half_width: f32,
    },
    /// Stroked axis-aligned rectangle, `(x, y)` is the top-left corner.
    RectOutline {
        x: f32,
        y: f32,
        w: f32,
        h: f32,
        half_width: f32,
    },
}

/// How far the glow halo reaches past the core, in multiples of `spread`.
const GLOW_REACH: f32 = 1.5;

impl Geometry {
    /// Axis-aligned bounds `(min_x, min_y, max_x, max_y)`, including AA padding.
    pub fn bounds(&self) -> (f32, f32, f32, f32) {
        let (x0, y0, x1, y1) = match self {
            Geometry::Disc { cx, cy, r } => (cx - r, cy - r, cx + r, cy + r),
            Geometry::Ellipse { cx, cy, rx, ry, .. } => {
                let m = rx.max(*ry);
                (cx - m, cy - m, cx + m, cy + m)
            }
            Geometry::Capsule {
                ax,
                ay,
                bx,
                by,
                half_width,
            } => (
                ax.min(*bx) - half_width,
                ay.min(*by) - half_width,
                ax.max(*bx) + half_width,
                ay.max(*by) + half_width,
            ),
            Geometry::Glow { cx, cy, r, spread } => {
                let m = r + GLOW_REACH * spread.max(0.0);
                (cx - m, cy - m, cx + m, cy + m)
            }
            Geometry::Polygon(verts) => points_bounds(verts, 0.0),
            Geometry::Polyline {
                points, half_width, ..
            } => points_bounds(points, *half_width),
            Geometry::EllipseOutline {
                cx,
                cy,
                rx,
                ry,
                half_width,
                ..
            } => {
                let m = rx.max(*ry) + half_width;
                (cx - m, cy - m, cx + m, cy + m)
            }
            Geometry::RectOutline {
                x,
                y,
                w,
                h,
                half_width,
            } => (x - half_width, y - half_width, x + w + half_width, y + h + half_width),
        };
        (x0 - 1.0, y0 - 1.0, x1 + 1.0, y1 + 1.0)
    }

    /// Coverage in `[0, 1]` of the pixel whose centre is `(px, py)`.
    pub fn coverage_at(&self, px: f32, py: f32) -> f32 {
        match self {
            Geometry::Disc { cx, cy, r } => {
                let d = ((px - cx) * (px - cx) + (py - cy) * (py - cy)).sqrt() - r;
                edge_coverage(d)
            }
            Geometry::Ellipse {
                cx,
                cy,
                rx,
                ry,
                rotation,
            } => {
                let (lx, ly) = to_local(px - cx, py - cy, *rotation);
                edge_coverage(sdf_ellipse(lx, ly, *rx, *ry))
            }
            Geometry::Capsule {
                ax,
                ay,
                bx,
                by,
                half_width,
            } => edge_coverage(sdf_line_segment(px, py, *ax, *ay, *bx, *by) - half_width),
            Geometry::Glow { cx, cy, r, spread } => {
                let d = ((px - cx) * (px - cx) + (py - cy) * (py - cy)).sqrt() - r;
                let core = edge_coverage(d);
                if d <= 0.0 || *spread <= 0.0 {
                    return core;
                }
                // Gaussian falloff, sigma = spread / 2, shifted to reach 0 at the bounds
                let sigma = spread * 0.5;
                let gauss = |t: f32| (-(t * t) / (2.0 * sigma * sigma)).exp();
                let floor = gauss(GLOW_REACH * spread);
                let halo = ((gauss(d) - floor) / (1.0 - floor)).max(0.0);
                core.max(halo)
            }
            Geometry::Polygon(verts) => {
                if verts.len() < 3 {
                    return 0.0;
                }
                edge_coverage(sdf_polygon(verts, px, py))
            }
            Geometry::Polyline {
                points,
                closed,
                half_width,
            } => {
                let d = polyline_distance(points, *closed, px, py);
                edge_coverage(d - half_width)
            }
            Geometry::EllipseOutline {
                cx,
                cy,
                rx,
                ry,
                rotation,
                half_width,
            } => {
                let (lx, ly) = to_local(px - cx, py - cy, *rotation);
                let band = sdf_ellipse(lx, ly, *rx, *ry).abs() - half_width;
                edge_coverage(band)
            }
            Geometry::RectOutline {
                x,
                y,
                w,
                h,
                half_width,
            } => {
                let hx = w * 0.5;
                let hy = h * 0.5;
                let band = sdf_box(px - (x + hx), py - (y + hy), hx, hy).abs() - half_width;
                edge_coverage(band)
            }
        }
    }
}

fn points_bounds(points: &[(f32, f32)], pad: f32) -> (f32, f32, f32, f32) {
    if points.is_empty() {
        return (0.0, 0.0, 0.0, 0.0);
    }
    let mut min_x = f32::MAX;
    let mut min_y = f32::MAX;
    let mut max_x = f32::MIN;
    let mut max_y = f32::MIN;
    for &(x, y) in points {
        min_x = min_x.min(x);
        min_y = min_y.min(y);
        max_x = max_x.max(x);
        max_y = max_y.max(y);
    }
    (min_x - pad, min_y - pad, max_x + pad, max_y + pad)
}

#[inline]
fn to_local(dx: f32, dy: f32, rotation: f32) -> (f32, f32) {
    let (sin_r, cos_r) = rotation.sin_cos();
    (dx * cos_r + dy * sin_r, -dx * sin_r + dy * cos_r)
}

/// One-pixel anti-aliased edge for a signed distance.
#[inline]
fn edge_coverage(d: f32) -> f32 {
    smoothstep(0.5, -0.5, d)
}

// ============================================================================
// SDF functions: return signed distance (negative = inside)
// ============================================================================

/// SDF for a box centred at origin with half-extents (hx, hy).
#[inline]
fn sdf_box(px: f32, py: f32, hx: f32, hy: f32) -> f32 {
    let dx = px.abs() - hx;
    let dy = py.abs() - hy;
    let outside = (dx.max(0.0) * dx.max(0.0) + dy.max(0.0) * dy.max(0.0)).sqrt();
    let inside = dx.max(dy).min(0.0);
    outside + inside
}

/// SDF for an ellipse (approximation).
#[inline]
fn sdf_ellipse(px: f32, py: f32, rx: f32, ry: f32) -> f32 {
    let rx = rx.max(1e-3);
    let ry = ry.max(1e-3);
    let nx = px / rx;
    let ny = py / ry;
    let len = (nx * nx + ny * ny).sqrt();
    if len < 1e-8 {
        return -rx.min(ry);
    }
    let scale = (rx * rx * ny * ny + ry * ry * nx * nx).sqrt() / (rx * ry * len);
    (len - 1.0) / scale
}

/// Distance to a line segment (unsigned).
#[inline]
fn sdf_line_segment(px: f32, py: f32, ax: f32, ay: f32, bx: f32, by: f32) -> f32 {
    let dx = bx - ax;
    let dy = by - ay;
    let len_sq = dx * dx + dy * dy;
    let t = if len_sq > 1e-12 {
        (((px - ax) * dx + (py - ay) * dy) / len_sq).clamp(0.0, 1.0)
    } else {
        0.0
    };
    let cx = ax + t * dx;
    let cy = ay + t * dy;
    ((px - cx) * (px - cx) + (py - cy) * (py - cy)).sqrt()
}

/// Signed distance to an arbitrary simple polygon (crossing-test sign).
fn sdf_polygon(verts: &[(f32, f32)], px: f32, py: f32) -> f32 {
    let n = verts.len();
    let mut d = (px - verts[0].0) * (px - verts[0].0) + (py - verts[0].1) * (py - verts[0].1);
    let mut s: f32 = 1.0;
    let mut j = n - 1;
    for i in 0..n {
        let ex = verts[j].0 - verts[i].0;
        let ey = verts[j].1 - verts[i].1;
        let wx = px - verts[i].0;
        let wy = py - verts[i].1;
        let len_sq = ex * ex + ey * ey;
        let t = if len_sq > 1e-12 {
            ((wx * ex + wy * ey) / len_sq).clamp(0.0, 1.0)
        } else {
            0.0
        };
        let bx = wx - ex * t;
        let by = wy - ey * t;
        d = d.min(bx * bx + by * by);
        let c1 = py >= verts[i].1;
        let c2 = py < verts[j].1;
        let c3 = ex * wy > ey * wx;
        if (c1 && c2 && c3) || (!c1 && !c2 && !c3) {
            s = -s;
        }
        j = i;
    }
    s * d.sqrt()
}

fn polyline_distance(points: &[(f32, f32)], closed: bool, px: f32, py: f32) -> f32 {
    match points.len() {
        0 => f32::MAX,
        1 => ((px - points[0].0).powi(2) + (py - points[0].1).powi(2)).sqrt(),
        n => {
            let mut best = f32::MAX;
            for w in points.windows(2) {
                best = best.min(sdf_line_segment(px, py, w[0].0, w[0].1, w[1].0, w[1].1));
            }
            if closed {
                let (a, b) = (points[n - 1], points[0]);
                best = best.min(sdf_line_segment(px, py, a.0, a.1, b.0, b.1));
            }
            best
        }
    }
}

/// Smoothstep between edge0 and edge1.
#[inline]
pub fn smoothstep(edge0: f32, edge1: f32, x: f32) -> f32 {
    let t = ((x - edge0) / (edge1 - edge0)).clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

// ============================================================================
// PATH BUILDERS
// ============================================================================

/// Vertices of an `spikes`-pointed star, first point straight up.
pub fn star_points(cx: f32, cy: f32, outer: f32, inner: f32, spikes: u32) -> Vec<(f32, f32)> {
    let step = std::f32::consts::PI / spikes as f32;
    let mut rot = std::f32::consts::FRAC_PI_2 * 3.0;
    let mut pts = Vec::with_capacity(spikes as usize * 2);
    for _ in 0..spikes {
        pts.push((cx + rot.cos() * outer, cy + rot.sin() * outer));
        rot += step;
        pts.push((cx + rot.cos() * inner, cy + rot.sin() * inner));
        rot += step;
    }
    pts
}

/// Heart outline built from two cubic beziers, tip pointing down.
pub fn heart_points(cx: f32, cy: f32, r: f32) -> Vec<(f32, f32)> {
    let tip = (cx, cy + r * 0.6);
    let notch = (cx, cy - r * 0.2);
    let mut pts = vec![tip];
    flatten_cubic(
        &mut pts,
        tip,
        (cx + r, cy + r * 0.1),
        (cx + r * 0.9, cy - r * 0.6),
        notch,
        16,
    );
    flatten_cubic(
        &mut pts,
        notch,
        (cx - r * 0.9, cy - r * 0.6),
        (cx - r, cy + r * 0.1),
        tip,
        16,
    );
    // Closing point duplicates the tip
    pts.pop();
    pts
}

/// Append `segments` points of a cubic bezier (excluding `p0`) to `out`.
pub fn flatten_cubic(
    out: &mut Vec<(f32, f32)>,
    p0: (f32, f32),
    p1: (f32, f32),
    p2: (f32, f32),
    p3: (f32, f32),
    segments: u32,
) {
    let segments = segments.max(1);
    for i in 1..=segments {
        let t = i as f32 / segments as f32;
        let mt = 1.0 - t;
        let a = mt * mt * mt;
        let b = 3.0 * mt * mt * t;
        let c = 3.0 * mt * t * t;
        let d = t * t * t;
        out.push((
            a * p0.0 + b * p1.0 + c * p2.0 + d * p3.0,
            a * p0.1 + b * p1.1 + c * p2.1 + d * p3.1,
        ));
    }
}

// ============================================================================
// RASTERIZATION
// ============================================================================

/// Anti-aliased coverage of one primitive, clipped to a canvas.
#[derive(Clone, Debug, Default)]
pub struct Coverage {
    pub x0: i32,
    pub y0: i32,
    pub width: u32,
    pub height: u32,
    pub alpha: Vec<f32>,
}

impl Coverage {
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Iterate `(x, y, alpha)` in canvas coordinates over pixels with visible coverage.
    pub fn iter(&self) -> impl Iterator<Item = (u32, u32, f32)> + '_ {
        let w = self.width as usize;
        self.alpha.iter().enumerate().filter_map(move |(i, &a)| {
            if a > 0.001 {
                let x = self.x0 + (i % w) as i32;
                let y = self.y0 + (i / w) as i32;
                Some((x as u32, y as u32, a))
            } else {
                None
            }
        })
    }
}

/// Rasterize `geom` against a `canvas_w` × `canvas_h` canvas.
///
/// The returned mask covers only the clipped bounding box, so an off-canvas
/// primitive yields an empty mask.
pub fn rasterize(geom: &Geometry, canvas_w: u32, canvas_h: u32) -> Coverage {
    let (min_x, min_y, max_x, max_y) = geom.bounds();
    if !(min_x.is_finite() && min_y.is_finite() && max_x.is_finite() && max_y.is_finite()) {
        return Coverage::default();
    }

    let x0 = (min_x.floor() as i32).max(0);
    let y0 = (min_y.floor() as i32).max(0);
    let x1 = (max_x.ceil() as i32).min(canvas_w as i32);
    let y1 = (max_y.ceil() as i32).min(canvas_h as i32);
    let buf_w = (x1 - x0).max(0) as u32;
    let buf_h = (y1 - y0).max(0) as u32;

    if buf_w == 0 || buf_h == 0 {
        return Coverage::default();
    }

    let mut alpha = vec![0.0f32; buf_w as usize * buf_h as usize];
    alpha
        .par_chunks_mut(buf_w as usize)
        .enumerate()
        .for_each(|(row, row_buf)| {
            let py = (y0 + row as i32) as f32 + 0.5;
            for (col, out) in row_buf.iter_mut().enumerate() {
                let px = (x0 + col as i32) as f32 + 0.5;
                *out = geom.coverage_at(px, py);
            }
        });

    Coverage {
        x0,
        y0,
        width: buf_w,
        height: buf_h,
        alpha,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disc_centre_is_fully_covered() {
        let cov = rasterize(
            &Geometry::Disc {
                cx: 10.0,
                cy: 10.0,
                r: 4.0,
            },
            20,
            20,
        );
        let inside = cov.iter().find(|&(x, y, _)| x == 10 && y == 10);
        assert_eq!(inside.map(|p| p.2), Some(1.0));
        assert!(cov.iter().all(|(x, y, _)| (6..=14).contains(&x) && (6..=14).contains(&y)));
    }

    #[test]
    fn off_canvas_primitive_is_empty() {
        let cov = rasterize(
            &Geometry::Disc {
                cx: -50.0,
                cy: -50.0,
                r: 3.0,
            },
            20,
            20,
        );
        assert!(cov.is_empty());
    }

    #[test]
    fn zero_length_capsule_is_a_dot() {
        let g = Geometry::Capsule {
            ax: 5.0,
            ay: 5.0,
            bx: 5.0,
            by: 5.0,
            half_width: 2.0,
        };
        assert_eq!(g.coverage_at(5.5, 5.5), 1.0);
        assert_eq!(g.coverage_at(12.0, 5.0), 0.0);
    }

    #[test]
    fn star_has_alternating_radii() {
        let pts = star_points(0.0, 0.0, 10.0, 4.0, 5);
        assert_eq!(pts.len(), 10);
        assert!((pts[0].1 + 10.0).abs() < 1e-4);
        let r1 = (pts[1].0 * pts[1].0 + pts[1].1 * pts[1].1).sqrt();
        assert!((r1 - 4.0).abs() < 1e-4);
    }

    #[test]
    fn heart_contains_its_centre_and_not_the_notch_corners() {
        let g = Geometry::Polygon(heart_points(24.0, 24.0, 16.0));
        assert!(g.coverage_at(24.0, 26.0) > 0.99);
        assert!(g.coverage_at(8.0, 8.0) < 0.01);
    }

    #[test]
    fn rect_outline_leaves_interior_empty() {
        let g = Geometry::RectOutline {
            x: 10.0,
            y: 10.0,
            w: 20.0,
            h: 20.0,
            half_width: 1.0,
        };
        assert!(g.coverage_at(20.0, 20.0) < 0.01);
        assert!(g.coverage_at(10.0, 20.0) > 0.99);
    }

    #[test]
    fn glow_fades_with_distance() {
        let g = Geometry::Glow {
            cx: 0.0,
            cy: 0.0,
            r: 2.0,
            spread: 6.0,
        };
        let near = g.coverage_at(4.0, 0.0);
        let far = g.coverage_at(8.0, 0.0);
        assert!(near > far && far > 0.0);
    }

    #[test]
    fn glow_reaches_zero_inside_its_bounds() {
        let g = Geometry::Glow {
            cx: 50.0,
            cy: 50.0,
            r: 4.0,
            spread: 10.0,
        };
        let (min_x, _, max_x, _) = g.bounds();
        assert_eq!(g.coverage_at(min_x, 50.0), 0.0);
        assert_eq!(g.coverage_at(max_x, 50.0), 0.0);
        // 4 + 1.5 * 10 = 19 from the centre
        assert_eq!(g.coverage_at(50.0 + 19.0, 50.0), 0.0);
        let inner = g.coverage_at(50.0 + 17.0, 50.0);
        assert!(inner > 0.0 && inner < 0.05, "{inner}");
    }
}
