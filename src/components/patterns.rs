use image::{Rgba, RgbaImage};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::canvas::{BlendMode, Layer, Paint};
use crate::ops::shapes::{Geometry, heart_points, star_points};

/// Edge length of a generated tile, in pixels.
pub const TILE_SIZE: u32 = 48;

// ============================================================================
// PATTERN KIND
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PatternKind {
    Dots,
    Stripes,
    Star,
    Heart,
    Glitter,
}

impl PatternKind {
    pub fn all() -> &'static [PatternKind] {
        &[
            PatternKind::Dots,
            PatternKind::Stripes,
            PatternKind::Star,
            PatternKind::Heart,
            PatternKind::Glitter,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PatternKind::Dots => "dots",
            PatternKind::Stripes => "stripes",
            PatternKind::Star => "star",
            PatternKind::Heart => "heart",
            PatternKind::Glitter => "glitter",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            PatternKind::Dots => "Dots",
            PatternKind::Stripes => "Stripes",
            PatternKind::Star => "Stars",
            PatternKind::Heart => "Hearts",
            PatternKind::Glitter => "Glitter",
        }
    }
}

impl fmt::Display for PatternKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PatternKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PatternKind::all()
            .iter()
            .copied()
            .find(|k| k.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown pattern '{}'", s))
    }
}

// ============================================================================
// PATTERN TILE
// ============================================================================

/// One repeating tile, generated for a (kind, colour) pair.
#[derive(Clone, Debug, PartialEq)]
pub struct PatternTile {
    kind: PatternKind,
    color: Rgba<u8>,
    image: RgbaImage,
}

impl PatternTile {
    pub fn generate(kind: PatternKind, color: Rgba<u8>) -> Self {
        let s = TILE_SIZE as f32;
        let mut layer = Layer::new(TILE_SIZE, TILE_SIZE);
        let ink = Paint::Solid(color);

        match kind {
            PatternKind::Dots => {
                for y in (8..TILE_SIZE).step_by(16) {
                    for x in (8..TILE_SIZE).step_by(16) {
                        let dot = Geometry::Disc {
                            cx: x as f32,
                            cy: y as f32,
                            r: 3.0,
                        };
                        layer.draw(&dot, &ink, 1.0, BlendMode::Normal);
                    }
                }
            }
            PatternKind::Stripes => {
                // Starting one tile to the left keeps the diagonals seamless
                let mut x = -s;
                while x <= s {
                    let line = Geometry::Capsule {
                        ax: x,
                        ay: 0.0,
                        bx: x + s,
                        by: s,
                        half_width: 1.5,
                    };
                    layer.draw(&line, &ink, 1.0, BlendMode::Normal);
                    x += 8.0;
                }
            }
            PatternKind::Star => {
                for (cx, cy, outer, inner) in [
                    (s * 0.5, s * 0.5, 10.0, 4.0),
                    (10.0, 10.0, 5.0, 2.0),
                    (s - 10.0, 12.0, 5.0, 2.0),
                ] {
                    let star = Geometry::Polygon(star_points(cx, cy, outer, inner, 5));
                    layer.draw(&star, &ink, 1.0, BlendMode::Normal);
                }
            }
            PatternKind::Heart => {
                for (cx, cy, r) in [(s * 0.4, s * 0.4, 16.0), (s * 0.75, s * 0.7, 10.0)] {
                    let heart = Geometry::Polygon(heart_points(cx, cy, r));
                    layer.draw(&heart, &ink, 1.0, BlendMode::Normal);
                }
            }
            PatternKind::Glitter => {
                layer.fill(color);
                let mut rng = StdRng::seed_from_u64(glitter_seed(color));
                let count = (TILE_SIZE * TILE_SIZE / 20) as usize;
                for _ in 0..count {
                    let cx = rng.gen_range(0.0..s);
                    let cy = rng.gen_range(0.0..s);
                    let r = rng.gen_range(0.5..2.5);
                    let alpha = rng.gen_range(0.5..1.0);
                    let speck = Geometry::Disc { cx, cy, r };
                    layer.draw(
                        &speck,
                        &Paint::Solid(Rgba([255, 255, 255, 255])),
                        alpha,
                        BlendMode::Normal,
                    );
                }
            }
        }

        Self {
            kind,
            color,
            image: layer.into_image(),
        }
    }

    pub fn kind(&self) -> PatternKind {
        self.kind
    }

    pub fn color(&self) -> Rgba<u8> {
        self.color
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Tile pixel for layer position `(x, y)`, wrapping in both axes.
    #[inline]
    pub fn pixel_at(&self, x: u32, y: u32) -> Rgba<u8> {
        *self
            .image
            .get_pixel(x % self.image.width(), y % self.image.height())
    }
}

fn glitter_seed(color: Rgba<u8>) -> u64 {
    u32::from_be_bytes(color.0) as u64 ^ 0x9E37_79B9_7F4A_7C15
}

// ============================================================================
// CACHE: single slot keyed by (kind, colour)
// ============================================================================

#[derive(Clone, Debug, Default)]
pub struct PatternTileCache {
    slot: Option<Arc<PatternTile>>,
}

impl PatternTileCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tile for `(kind, color)`, generated on a miss.
    pub fn ensure(&mut self, kind: PatternKind, color: Rgba<u8>) -> Arc<PatternTile> {
        if let Some(tile) = &self.slot
            && tile.kind() == kind
            && tile.color() == color
        {
            return Arc::clone(tile);
        }
        let tile = Arc::new(PatternTile::generate(kind, color));
        self.slot = Some(Arc::clone(&tile));
        tile
    }

    pub fn is_cached(&self, kind: PatternKind, color: Rgba<u8>) -> bool {
        self.slot
            .as_ref()
            .is_some_and(|t| t.kind() == kind && t.color() == color)
    }

    pub fn invalidate(&mut self) {
        self.slot = None;
    }
}
