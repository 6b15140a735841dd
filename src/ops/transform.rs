// ============================================================================
// TRANSFORM OPERATIONS: flip and quarter-turn rotation of the whole photo
// ============================================================================

use image::imageops;

use crate::raster::RasterBuffer;

/// A whole-image geometric operation. Only rotation changes the dimensions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transform {
    FlipHorizontal,
    FlipVertical,
    RotateCw,
    RotateCcw,
}

impl Transform {
    pub fn label(&self) -> &'static str {
        match self {
            Transform::FlipHorizontal => "Flip Horizontal",
            Transform::FlipVertical => "Flip Vertical",
            Transform::RotateCw => "Rotate 90° CW",
            Transform::RotateCcw => "Rotate 90° CCW",
        }
    }

    pub fn all() -> &'static [Transform] {
        &[
            Transform::FlipHorizontal,
            Transform::FlipVertical,
            Transform::RotateCw,
            Transform::RotateCcw,
        ]
    }

    pub fn apply(&self, buffer: &mut RasterBuffer) {
        match self {
            Transform::FlipHorizontal => flip_horizontal(buffer),
            Transform::FlipVertical => flip_vertical(buffer),
            Transform::RotateCw => rotate_90cw(buffer),
            Transform::RotateCcw => rotate_90ccw(buffer),
        }
    }
}

/// Net flip/rotation applied since load: an optional horizontal mirror
/// followed by `quarter_turns` clockwise rotations.
///
/// Background toggling uses it to bring the cached load-time buffers into
/// the committed buffer's orientation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct Orientation {
    pub mirrored: bool,
    pub quarter_turns: u8,
}

impl Orientation {
    /// Orientation after additionally applying `t`.
    pub fn then(self, t: Transform) -> Orientation {
        let k = self.quarter_turns % 4;
        match t {
            Transform::RotateCw => Orientation {
                mirrored: self.mirrored,
                quarter_turns: (k + 1) % 4,
            },
            Transform::RotateCcw => Orientation {
                mirrored: self.mirrored,
                quarter_turns: (k + 3) % 4,
            },
            // H·R^k = R^-k·H
            Transform::FlipHorizontal => Orientation {
                mirrored: !self.mirrored,
                quarter_turns: (4 - k) % 4,
            },
            // V = R^2·H
            Transform::FlipVertical => Orientation {
                mirrored: !self.mirrored,
                quarter_turns: (6 - k) % 4,
            },
        }
    }

    pub fn is_identity(&self) -> bool {
        !self.mirrored && self.quarter_turns % 4 == 0
    }

    /// Bring a load-time buffer into this orientation.
    pub fn apply(&self, buffer: &mut RasterBuffer) {
        if self.mirrored {
            flip_horizontal(buffer);
        }
        for _ in 0..self.quarter_turns % 4 {
            rotate_90cw(buffer);
        }
    }
}

/// Mirror left↔right.
pub fn flip_horizontal(buffer: &mut RasterBuffer) {
    imageops::flip_horizontal_in_place(buffer.pixels_mut());
}

/// Mirror top↔bottom.
pub fn flip_vertical(buffer: &mut RasterBuffer) {
    imageops::flip_vertical_in_place(buffer.pixels_mut());
}

/// Rotate 90° clockwise (swaps W↔H).
pub fn rotate_90cw(buffer: &mut RasterBuffer) {
    let rotated = imageops::rotate90(buffer.pixels());
    *buffer = RasterBuffer::with_layout(rotated, buffer.layout());
}

/// Rotate 90° counter-clockwise (swaps W↔H).
pub fn rotate_90ccw(buffer: &mut RasterBuffer) {
    let rotated = imageops::rotate270(buffer.pixels());
    *buffer = RasterBuffer::with_layout(rotated, buffer.layout());
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, Rgba};

    fn marked() -> RasterBuffer {
        // 4×2, red pixel at top-left.
        let mut buf = RasterBuffer::filled(4, 2, Rgb([255, 255, 255]));
        buf.pixels_mut().put_pixel(0, 0, Rgba([255, 0, 0, 255]));
        buf
    }

    const RED: Rgba<u8> = Rgba([255, 0, 0, 255]);

    #[test]
    fn flips_keep_dimensions() {
        let mut buf = marked();
        flip_horizontal(&mut buf);
        assert_eq!(buf.dimensions(), (4, 2));
        assert_eq!(buf.pixels().get_pixel(3, 0), &RED);

        let mut buf = marked();
        flip_vertical(&mut buf);
        assert_eq!(buf.dimensions(), (4, 2));
        assert_eq!(buf.pixels().get_pixel(0, 1), &RED);
    }

    #[test]
    fn rotations_swap_dimensions() {
        let mut cw = marked();
        rotate_90cw(&mut cw);
        assert_eq!(cw.dimensions(), (2, 4));
        assert_eq!(cw.pixels().get_pixel(1, 0), &RED);

        let mut ccw = marked();
        rotate_90ccw(&mut ccw);
        assert_eq!(ccw.dimensions(), (2, 4));
        assert_eq!(ccw.pixels().get_pixel(0, 3), &RED);
    }

    #[test]
    fn orientation_tracks_any_sequence() {
        // Asymmetric 3×2 image so every orientation is distinguishable.
        let mut base = RasterBuffer::filled(3, 2, Rgb([0, 0, 0]));
        for (i, (x, y)) in [(0, 0), (1, 0), (2, 0), (0, 1), (1, 1), (2, 1)].into_iter().enumerate() {
            base.pixels_mut().put_pixel(x, y, Rgba([i as u8 * 40, 0, 0, 255]));
        }
        let sequences: &[&[Transform]] = &[
            &[Transform::FlipHorizontal],
            &[Transform::FlipVertical],
            &[Transform::RotateCw, Transform::FlipHorizontal],
            &[Transform::FlipVertical, Transform::RotateCcw, Transform::RotateCcw],
            &[Transform::RotateCw, Transform::FlipVertical, Transform::RotateCw, Transform::FlipHorizontal],
        ];
        for seq in sequences {
            let mut direct = base.clone();
            let mut orientation = Orientation::default();
            for t in seq.iter() {
                t.apply(&mut direct);
                orientation = orientation.then(*t);
            }
            let mut replayed = base.clone();
            orientation.apply(&mut replayed);
            assert_eq!(replayed, direct, "sequence {:?}", seq);
        }
    }

    #[test]
    fn double_flip_is_identity_orientation() {
        let o = Orientation::default()
            .then(Transform::FlipVertical)
            .then(Transform::FlipVertical);
        assert!(o.is_identity());
    }

    #[test]
    fn cw_then_ccw_is_identity() {
        let mut buf = marked();
        Transform::RotateCw.apply(&mut buf);
        Transform::RotateCcw.apply(&mut buf);
        assert_eq!(buf, marked());
    }
}
