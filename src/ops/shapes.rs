use image::{Rgb, Rgba, RgbaImage};
use rayon::prelude::*;

use crate::canvas::ImagePoint;
use crate::components::tools::{EditMode, Gesture};
use crate::raster::RasterBuffer;

// ============================================================================
// GEOMETRY
// ============================================================================

/// The resolved shape of a gesture. Preview and commit both rasterize this.
#[derive(Clone, Debug, PartialEq)]
pub enum ShapeGeometry {
    Segment { from: ImagePoint, to: ImagePoint },
    Rect { min: ImagePoint, max: ImagePoint },
    Circle { center: ImagePoint, radius: f32 },
    /// Free-hand stroke through every drag point.
    Polyline(Vec<ImagePoint>),
    /// Stroked box with `text` drawn inside it.
    TextBox {
        min: ImagePoint,
        max: ImagePoint,
        text: String,
    },
}

impl ShapeGeometry {
    /// `(width, height)` of rectangular shapes.
    pub fn size(&self) -> Option<(f32, f32)> {
        match self {
            ShapeGeometry::Rect { min, max } | ShapeGeometry::TextBox { min, max, .. } => {
                Some((max.x - min.x, max.y - min.y))
            }
            _ => None,
        }
    }
}

/// Normalised corners of the box spanned by `a` and `b`.
pub fn rect_corners(a: ImagePoint, b: ImagePoint) -> (ImagePoint, ImagePoint) {
    (
        ImagePoint::new(a.x.min(b.x), a.y.min(b.y)),
        ImagePoint::new(a.x.max(b.x), a.y.max(b.y)),
    )
}

/// Shape for `mode` given the current gesture. `Idle` has no shape.
pub fn geometry(mode: EditMode, gesture: &Gesture, text: &str) -> Option<ShapeGeometry> {
    let a = gesture.anchor;
    let b = gesture.current;
    let shape = match mode {
        EditMode::Idle => return None,
        EditMode::Rectangle => {
            let (min, max) = rect_corners(a, b);
            ShapeGeometry::Rect { min, max }
        }
        EditMode::Circle => ShapeGeometry::Circle {
            center: a.midpoint(b),
            // Half the Manhattan distance between the two corners.
            radius: ((b.x - a.x).abs() + (b.y - a.y).abs()) * 0.5,
        },
        EditMode::HorizontalLine => ShapeGeometry::Segment {
            from: a,
            to: ImagePoint::new(b.x, a.y),
        },
        EditMode::VerticalLine => ShapeGeometry::Segment {
            from: a,
            to: ImagePoint::new(a.x, b.y),
        },
        EditMode::DiagonalLine => ShapeGeometry::Segment { from: a, to: b },
        EditMode::FreeLine => ShapeGeometry::Polyline(gesture.path.clone()),
        EditMode::Text => {
            let (min, max) = rect_corners(a, b);
            ShapeGeometry::TextBox {
                min,
                max,
                text: text.to_string(),
            }
        }
    };
    Some(shape)
}

// ============================================================================
// SDF functions - unsigned distance to the stroke's centre line
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

#[inline]
fn sdf_line_segment(px: f32, py: f32, ax: f32, ay: f32, bx: f32, by: f32) -> f32 {
    let dx = bx - ax;
    let dy = by - ay;
    let len_sq = dx * dx + dy * dy;
    if len_sq < 1e-12 {
        return ((px - ax) * (px - ax) + (py - ay) * (py - ay)).sqrt();
    }
    let t = (((px - ax) * dx + (py - ay) * dy) / len_sq).clamp(0.0, 1.0);
    let cx = ax + t * dx;
    let cy = ay + t * dy;
    ((px - cx) * (px - cx) + (py - cy) * (py - cy)).sqrt()
}

// ============================================================================
// RASTERIZER
// ============================================================================

/// Paint `shape` onto `buffer` with an opaque pen.
///
/// Hard-edged: a pixel centre is painted when it lies within `brush / 2` of
/// the outline. The result depends only on the inputs, so a preview on a
/// copy and the commit on the real buffer produce the same pixels.
pub fn rasterize(buffer: &mut RasterBuffer, shape: &ShapeGeometry, color: Rgb<u8>, brush: u32) {
    let pen = Rgba([color[0], color[1], color[2], 255]);
    let half = brush.max(1) as f32 * 0.5;
    let pixels = buffer.pixels_mut();

    match shape {
        ShapeGeometry::Segment { from, to } => stroke_segment(pixels, *from, *to, half, pen),
        ShapeGeometry::Polyline(points) => match points.as_slice() {
            [] => {}
            [only] => stroke_segment(pixels, *only, *only, half, pen),
            _ => {
                for pair in points.windows(2) {
                    stroke_segment(pixels, pair[0], pair[1], half, pen);
                }
            }
        },
        ShapeGeometry::Rect { min, max } => stroke_rect(pixels, *min, *max, half, pen),
        ShapeGeometry::Circle { center, radius } => {
            let (cx, cy, r) = (center.x, center.y, *radius);
            paint_band(pixels, (cx - r, cy - r, cx + r, cy + r), half, pen, |px, py| {
                let dx = px - cx;
                let dy = py - cy;
                ((dx * dx + dy * dy).sqrt() - r).abs()
            });
        }
        ShapeGeometry::TextBox { min, max, text } => {
            stroke_rect(pixels, *min, *max, half, pen);
            crate::ops::text::draw_text(pixels, *min, *max, text, color, brush);
        }
    }
}

fn stroke_segment(pixels: &mut RgbaImage, a: ImagePoint, b: ImagePoint, half: f32, pen: Rgba<u8>) {
    let bounds = (a.x.min(b.x), a.y.min(b.y), a.x.max(b.x), a.y.max(b.y));
    paint_band(pixels, bounds, half, pen, |px, py| {
        sdf_line_segment(px, py, a.x, a.y, b.x, b.y)
    });
}

fn stroke_rect(pixels: &mut RgbaImage, min: ImagePoint, max: ImagePoint, half: f32, pen: Rgba<u8>) {
    let cx = (min.x + max.x) * 0.5;
    let cy = (min.y + max.y) * 0.5;
    let hx = (max.x - min.x) * 0.5;
    let hy = (max.y - min.y) * 0.5;
    paint_band(pixels, (min.x, min.y, max.x, max.y), half, pen, |px, py| {
        sdf_box(px - cx, py - cy, hx, hy).abs()
    });
}

/// Paint every pixel within `half` of the outline described by `dist`,
/// restricted to `bounds` (min_x, min_y, max_x, max_y) grown by the stroke.
fn paint_band<F>(pixels: &mut RgbaImage, bounds: (f32, f32, f32, f32), half: f32, pen: Rgba<u8>, dist: F)
where
    F: Fn(f32, f32) -> f32 + Sync,
{
    let (w, h) = pixels.dimensions();
    if w == 0 || h == 0 {
        return;
    }
    let pad = half + 1.0;
    let x0 = ((bounds.0 - pad).floor() as i64).max(0);
    let y0 = ((bounds.1 - pad).floor() as i64).max(0);
    let x1 = ((bounds.2 + pad).ceil() as i64).min(w as i64 - 1);
    let y1 = ((bounds.3 + pad).ceil() as i64).min(h as i64 - 1);
    if x1 < x0 || y1 < y0 {
        return;
    }

    let row_bytes = w as usize * 4;
    let (x0, x1) = (x0 as usize, x1 as usize);
    let (y0, y1) = (y0 as usize, y1 as usize);
    let raw: &mut [u8] = pixels;

    raw[y0 * row_bytes..(y1 + 1) * row_bytes]
        .par_chunks_mut(row_bytes)
        .enumerate()
        .for_each(|(row, row_buf)| {
            let py = (y0 + row) as f32;
            for x in x0..=x1 {
                if dist(x as f32, py) - half <= 0.0 {
                    let idx = x * 4;
                    row_buf[idx..idx + 4].copy_from_slice(&pen.0);
                }
            }
        });
}
