use image::Rgba;
use std::f32::consts::TAU;
use std::fmt;
use std::str::FromStr;

use crate::canvas::{BlendMode, Layer, Paint, WHITE};
use crate::ops::shapes::Geometry;

const INK: Rgba<u8> = Rgba([0, 0, 0, 255]);
/// Outline width in CSS pixels.
const LINE_WIDTH: f32 = 4.0;
/// How far the house roof overhangs the walls, in CSS pixels.
const ROOF_OVERHANG: f32 = 20.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum BuiltinTemplate {
    #[default]
    Flower,
    House,
    Fish,
    Blank,
}

impl BuiltinTemplate {
    pub fn all() -> &'static [BuiltinTemplate] {
        &[
            BuiltinTemplate::Flower,
            BuiltinTemplate::House,
            BuiltinTemplate::Fish,
            BuiltinTemplate::Blank,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BuiltinTemplate::Flower => "flower",
            BuiltinTemplate::House => "house",
            BuiltinTemplate::Fish => "fish",
            BuiltinTemplate::Blank => "blank",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            BuiltinTemplate::Flower => "Flower",
            BuiltinTemplate::House => "House",
            BuiltinTemplate::Fish => "Fish",
            BuiltinTemplate::Blank => "Blank",
        }
    }
}

impl fmt::Display for BuiltinTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BuiltinTemplate {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BuiltinTemplate::all()
            .iter()
            .copied()
            .find(|t| t.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown template '{}'", s))
    }
}

/// Outline primitives for `template` on a `w` × `h` device-pixel layer.
pub fn outline(template: BuiltinTemplate, w: f32, h: f32, dpr: f32) -> Vec<Geometry> {
    let half_width = LINE_WIDTH * dpr * 0.5;
    let m = w.min(h);
    let (cx, cy) = (w * 0.5, h * 0.5);

    match template {
        BuiltinTemplate::Flower => {
            let mut parts = vec![Geometry::EllipseOutline {
                cx,
                cy,
                rx: m * 0.09,
                ry: m * 0.09,
                rotation: 0.0,
                half_width,
            }];
            for i in 0..8 {
                let a = i as f32 / 8.0 * TAU;
                parts.push(Geometry::EllipseOutline {
                    cx: cx + a.cos() * m * 0.25,
                    cy: cy + a.sin() * m * 0.25,
                    rx: m * 0.07,
                    ry: m * 0.11,
                    rotation: a,
                    half_width,
                });
            }
            parts.push(Geometry::Capsule {
                ax: cx,
                ay: cy + m * 0.1,
                bx: cx,
                by: h * 0.9,
                half_width,
            });
            parts
        }
        BuiltinTemplate::House => {
            let bw = m * 0.45;
            let bx = cx - bw / 2.0;
            let by = cy;
            let overhang = ROOF_OVERHANG * dpr;
            vec![
                Geometry::RectOutline {
                    x: bx,
                    y: by,
                    w: bw,
                    h: bw * 0.7,
                    half_width,
                },
                Geometry::Polyline {
                    points: vec![(bx - overhang, by), (cx, by - bw * 0.35), (bx + bw + overhang, by)],
                    closed: true,
                    half_width,
                },
                Geometry::RectOutline {
                    x: bx + bw * 0.25,
                    y: by + bw * 0.2,
                    w: bw * 0.2,
                    h: bw * 0.2,
                    half_width,
                },
                Geometry::RectOutline {
                    x: bx + bw * 0.65,
                    y: by + bw * 0.3,
                    w: bw * 0.12,
                    h: bw * 0.4,
                    half_width,
                },
            ]
        }
        BuiltinTemplate::Fish => {
            let (rx, ry) = (w * 0.48, h * 0.5);
            let (rw, rh) = (m * 0.36, m * 0.2);
            vec![
                Geometry::EllipseOutline {
                    cx: rx,
                    cy: ry,
                    rx: rw,
                    ry: rh,
                    rotation: 0.0,
                    half_width,
                },
                Geometry::Polyline {
                    points: vec![
                        (rx + rw, ry),
                        (rx + rw + rh, ry - rh * 0.5),
                        (rx + rw + rh, ry + rh * 0.5),
                    ],
                    closed: true,
                    half_width,
                },
                Geometry::EllipseOutline {
                    cx: rx - rw * 0.5,
                    cy: ry - rh * 0.25,
                    rx: rh * 0.12,
                    ry: rh * 0.12,
                    rotation: 0.0,
                    half_width,
                },
            ]
        }
        BuiltinTemplate::Blank => Vec::new(),
    }
}

/// Paint `template` onto `layer`: white ground, black outlines.
pub fn draw(layer: &mut Layer, template: BuiltinTemplate, dpr: f32) {
    layer.fill(WHITE);
    let ink = Paint::Solid(INK);
    for part in outline(template, layer.width() as f32, layer.height() as f32, dpr) {
        layer.draw(&part, &ink, 1.0, BlendMode::Normal);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ink_count(layer: &Layer) -> usize {
        layer.image().pixels().filter(|p| p[0] < 20).count()
    }

    #[test]
    fn blank_is_plain_white() {
        let mut layer = Layer::new(40, 30);
        draw(&mut layer, BuiltinTemplate::Blank, 1.0);
        assert!(layer.image().pixels().all(|p| *p == WHITE));
    }

    #[test]
    fn every_drawing_template_puts_down_ink() {
        for t in [BuiltinTemplate::Flower, BuiltinTemplate::House, BuiltinTemplate::Fish] {
            let mut layer = Layer::new(200, 200);
            draw(&mut layer, t, 1.0);
            let n = ink_count(&layer);
            assert!(n > 200, "{t} drew {n} ink pixels");
            assert!(layer.image().pixels().all(|p| p[3] == 255));
        }
    }

    #[test]
    fn outlines_leave_centres_open() {
        // Inside the flower centre and the fish body must stay fillable
        let mut flower = Layer::new(200, 200);
        draw(&mut flower, BuiltinTemplate::Flower, 1.0);
        assert_eq!(flower.pixel(100, 100), Some(WHITE));

        let mut fish = Layer::new(200, 200);
        draw(&mut fish, BuiltinTemplate::Fish, 1.0);
        assert_eq!(fish.pixel(110, 110), Some(WHITE));
    }

    #[test]
    fn line_width_follows_dpr() {
        let mut one = Layer::new(100, 100);
        draw(&mut one, BuiltinTemplate::House, 1.0);
        let mut two = Layer::new(200, 200);
        draw(&mut two, BuiltinTemplate::House, 2.0);
        let (a, b) = (ink_count(&one), ink_count(&two));
        assert!(b > a * 3, "{a} vs {b}");
    }

    #[test]
    fn names_round_trip() {
        for t in BuiltinTemplate::all() {
            assert_eq!(t.as_str().parse::<BuiltinTemplate>(), Ok(*t));
        }
    }
}
