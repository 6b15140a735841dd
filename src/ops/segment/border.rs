use image::{Rgb, RgbImage, RgbaImage};
use std::collections::VecDeque;

use super::Segmenter;
use crate::error::EditError;

/// Model-free background key: flood-fills inward from the photo border over
/// pixels close to the border's dominant color and makes them transparent.
///
/// Works for clinical shots against a uniform backdrop (contrast card, cheek
/// retractor background); busy backgrounds need the ONNX segmenter.
pub struct BorderKeySegmenter {
    /// 0–100 color distance.
    tolerance: f32,
}

impl BorderKeySegmenter {
    pub fn new(tolerance: f32) -> Self {
        Self {
            tolerance: tolerance.clamp(0.0, 100.0),
        }
    }
}

impl Segmenter for BorderKeySegmenter {
    fn name(&self) -> &'static str {
        "border-key"
    }

    fn cut_out(&self, image: &RgbImage) -> Result<RgbaImage, EditError> {
        let mask = background_mask(image, self.tolerance);
        let w = image.width();
        Ok(RgbaImage::from_fn(image.width(), image.height(), |x, y| {
            let p = image.get_pixel(x, y);
            let alpha = if mask[(y * w + x) as usize] { 0 } else { 255 };
            image::Rgba([p[0], p[1], p[2], alpha])
        }))
    }
}

/// Per-channel median of the border ring.
fn dominant_border_color(image: &RgbImage) -> Rgb<u8> {
    let (w, h) = image.dimensions();
    let mut channels: [Vec<u8>; 3] = [Vec::new(), Vec::new(), Vec::new()];
    for (x, y) in border_coords(w, h) {
        let p = image.get_pixel(x, y);
        for c in 0..3 {
            channels[c].push(p[c]);
        }
    }
    let mut out = [0u8; 3];
    for (c, values) in channels.iter_mut().enumerate() {
        if values.is_empty() {
            continue;
        }
        values.sort_unstable();
        out[c] = values[values.len() / 2];
    }
    Rgb(out)
}

fn border_coords(w: u32, h: u32) -> impl Iterator<Item = (u32, u32)> {
    let top_bottom = (0..w).flat_map(move |x| {
        let bottom = if h > 1 { Some((x, h - 1)) } else { None };
        std::iter::once((x, 0)).chain(bottom)
    });
    let sides = (1..h.saturating_sub(1)).flat_map(move |y| {
        let right = if w > 1 { Some((w - 1, y)) } else { None };
        std::iter::once((0, y)).chain(right)
    });
    top_bottom.chain(sides).filter(move |_| w > 0 && h > 0)
}

#[inline]
fn color_dist_sq(p: &Rgb<u8>, key: &[f32; 3]) -> f32 {
    let dr = p[0] as f32 - key[0];
    let dg = p[1] as f32 - key[1];
    let db = p[2] as f32 - key[2];
    dr * dr + dg * dg + db * db
}

/// `true` for background pixels: reachable from the border through pixels
/// within `tolerance` of the dominant border color.
pub fn background_mask(image: &RgbImage, tolerance: f32) -> Vec<bool> {
    let (w, h) = image.dimensions();
    let mut mask = vec![false; (w as usize) * (h as usize)];
    if w == 0 || h == 0 {
        return mask;
    }
    let key = dominant_border_color(image);
    let key = [key[0] as f32, key[1] as f32, key[2] as f32];
    let tol_sq = (tolerance * 2.55) * (tolerance * 2.55); // 0-100 → 0-255 range, squared

    let mut queue = VecDeque::with_capacity(1024);
    for (x, y) in border_coords(w, h) {
        let idx = (y * w + x) as usize;
        if !mask[idx] && color_dist_sq(image.get_pixel(x, y), &key) <= tol_sq {
            mask[idx] = true;
            queue.push_back((x, y));
        }
    }

    while let Some((px, py)) = queue.pop_front() {
        let neighbors = [
            (px.wrapping_sub(1), py),
            (px + 1, py),
            (px, py.wrapping_sub(1)),
            (px, py + 1),
        ];
        for (nx, ny) in neighbors {
            if nx >= w || ny >= h {
                continue;
            }
            let idx = (ny * w + nx) as usize;
            if mask[idx] {
                continue;
            }
            if color_dist_sq(image.get_pixel(nx, ny), &key) <= tol_sq {
                mask[idx] = true;
                queue.push_back((nx, ny));
            }
        }
    }
    mask
}
