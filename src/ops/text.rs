use ab_glyph::{point, Font, FontArc, GlyphId, ScaleFont};
use image::{Rgb, RgbaImage};
use std::sync::OnceLock;

use crate::canvas::ImagePoint;

/// Caption size relative to the pen width.
pub const FONT_SCALE_PER_BRUSH: f32 = 3.0;

static CAPTION_FONT: OnceLock<Option<FontArc>> = OnceLock::new();

/// The bold serif face used for captions, looked up once per process.
pub fn caption_font() -> Option<&'static FontArc> {
    CAPTION_FONT.get_or_init(load_caption_font).as_ref()
}

fn load_caption_font() -> Option<FontArc> {
    use font_kit::family_name::FamilyName;
    use font_kit::properties::{Properties, Weight};
    use font_kit::source::SystemSource;

    let mut props = Properties::new();
    props.weight = Weight::BOLD;

    let families = [
        FamilyName::Title("Times New Roman".to_string()),
        FamilyName::Serif,
    ];
    let font = SystemSource::new()
        .select_best_match(&families, &props)
        .ok()
        .and_then(|handle| handle.load().ok())
        .and_then(|font| font.copy_font_data())
        .and_then(|bytes| FontArc::try_from_vec((*bytes).clone()).ok());

    if font.is_none() {
        crate::log_warn!("No serif font found; text annotations will only draw their box");
    }
    font
}

/// Lay out one line, returning `(glyph, x)` pairs from the line start.
pub fn layout_line(font: &FontArc, line: &str, font_size: f32) -> Vec<(GlyphId, f32)> {
    let scaled = font.as_scaled(font_size);
    let mut glyphs = Vec::with_capacity(line.len());
    let mut cursor_x = 0.0f32;
    let mut last: Option<GlyphId> = None;
    for ch in line.chars() {
        let id = font.glyph_id(ch);
        if let Some(prev) = last {
            cursor_x += scaled.kern(prev, id);
        }
        glyphs.push((id, cursor_x));
        cursor_x += scaled.h_advance(id);
        last = Some(id);
    }
    glyphs
}

/// Draw `text` inside the box `min`..`max`, top-left aligned and inset by
/// the pen width. Glyph pixels outside the box are dropped.
pub fn draw_text(
    pixels: &mut RgbaImage,
    min: ImagePoint,
    max: ImagePoint,
    text: &str,
    color: Rgb<u8>,
    brush: u32,
) {
    if text.is_empty() {
        return;
    }
    if let Some(font) = caption_font() {
        draw_text_with(font, pixels, min, max, text, color, brush);
    }
}

pub fn draw_text_with(
    font: &FontArc,
    pixels: &mut RgbaImage,
    min: ImagePoint,
    max: ImagePoint,
    text: &str,
    color: Rgb<u8>,
    brush: u32,
) {
    let brush = brush.max(1);
    let font_size = brush as f32 * FONT_SCALE_PER_BRUSH;
    let scaled = font.as_scaled(font_size);
    let line_height = scaled.height() + scaled.line_gap();
    let inset = brush as f32;

    let (w, h) = pixels.dimensions();
    let clip_x0 = min.x.max(0.0);
    let clip_y0 = min.y.max(0.0);
    let clip_x1 = max.x.min(w as f32 - 1.0);
    let clip_y1 = max.y.min(h as f32 - 1.0);
    if clip_x1 < clip_x0 || clip_y1 < clip_y0 {
        return;
    }

    for (line_idx, line) in text.split('\n').enumerate() {
        let baseline = min.y + inset + scaled.ascent() + line_idx as f32 * line_height;
        for (id, x) in layout_line(font, line, font_size) {
            let glyph = id.with_scale_and_position(font_size, point(min.x + inset + x, baseline));
            let Some(outlined) = font.outline_glyph(glyph) else {
                continue;
            };
            let bounds = outlined.px_bounds();
            outlined.draw(|gx, gy, cov| {
                let px = bounds.min.x + gx as f32;
                let py = bounds.min.y + gy as f32;
                if cov <= 0.0 || px < clip_x0 || py < clip_y0 || px > clip_x1 || py > clip_y1 {
                    return;
                }
                let p = pixels.get_pixel_mut(px as u32, py as u32);
                let cov = cov.min(1.0);
                for c in 0..3 {
                    let v = p[c] as f32 * (1.0 - cov) + color[c] as f32 * cov;
                    p[c] = v.round().clamp(0.0, 255.0) as u8;
                }
                p[3] = (p[3] as f32 + (255.0 - p[3] as f32) * cov).round().min(255.0) as u8;
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn empty_text_changes_nothing() {
        let mut img = RgbaImage::from_pixel(20, 20, Rgba([255, 255, 255, 255]));
        let before = img.clone();
        draw_text(
            &mut img,
            ImagePoint::new(0.0, 0.0),
            ImagePoint::new(19.0, 19.0),
            "",
            Rgb([0, 0, 0]),
            4,
        );
        assert_eq!(img, before);
    }

    #[test]
    fn text_never_leaves_its_box() {
        let mut img = RgbaImage::from_pixel(80, 80, Rgba([255, 255, 255, 255]));
        draw_text(
            &mut img,
            ImagePoint::new(10.0, 10.0),
            ImagePoint::new(30.0, 20.0),
            "Molar 36\nfracture",
            Rgb([0, 0, 0]),
            5,
        );
        for (x, y, p) in img.enumerate_pixels() {
            let inside = (10..=30).contains(&x) && (10..=20).contains(&y);
            if !inside {
                assert_eq!(p, &Rgba([255, 255, 255, 255]), "({x},{y}) painted outside box");
            }
        }
    }
}
