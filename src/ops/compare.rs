use image::{Rgba, RgbaImage};

/// Width of the divider drawn at the split column.
pub const DIVIDER_WIDTH: u32 = 3;

/// Side-by-side comparison: columns left of `split × width / 100` come from
/// `before`, the rest from `after`, with a white divider centred on the split
/// column.
///
/// Returns `None` when the two images differ in size.
pub fn before_after(before: &RgbaImage, after: &RgbaImage, split: u8) -> Option<RgbaImage> {
    if before.dimensions() != after.dimensions() {
        return None;
    }
    let (w, h) = before.dimensions();
    let split_x = split.min(100) as u32 * w / 100;
    let half = DIVIDER_WIDTH / 2;
    let white = Rgba([255, 255, 255, 255]);

    let out = RgbaImage::from_fn(w, h, |x, y| {
        if x.abs_diff(split_x) <= half {
            white
        } else if x < split_x {
            *before.get_pixel(x, y)
        } else {
            *after.get_pixel(x, y)
        }
    });
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    const B: Rgba<u8> = Rgba([10, 10, 10, 255]);
    const A: Rgba<u8> = Rgba([200, 0, 0, 255]);
    const W: Rgba<u8> = Rgba([255, 255, 255, 255]);

    #[test]
    fn split_picks_sides_and_draws_divider() {
        let before = RgbaImage::from_pixel(100, 4, B);
        let after = RgbaImage::from_pixel(100, 4, A);
        let out = before_after(&before, &after, 40).unwrap();
        assert_eq!(out.get_pixel(38, 0), &B);
        assert_eq!(out.get_pixel(39, 1), &W);
        assert_eq!(out.get_pixel(40, 2), &W);
        assert_eq!(out.get_pixel(41, 3), &W);
        assert_eq!(out.get_pixel(42, 0), &A);
    }

    #[test]
    fn edge_splits_show_half_a_divider() {
        let before = RgbaImage::from_pixel(10, 2, B);
        let after = RgbaImage::from_pixel(10, 2, A);
        let out = before_after(&before, &after, 100).unwrap();
        assert_eq!(out.get_pixel(8, 0), &B);
        assert_eq!(out.get_pixel(9, 0), &W);
        let out = before_after(&before, &after, 0).unwrap();
        assert_eq!(out.get_pixel(0, 0), &W);
        assert_eq!(out.get_pixel(1, 0), &W);
        assert_eq!(out.get_pixel(2, 0), &A);
    }

    #[test]
    fn size_mismatch_is_rejected() {
        let before = RgbaImage::new(10, 2);
        let after = RgbaImage::new(2, 10);
        assert!(before_after(&before, &after, 50).is_none());
    }
}
