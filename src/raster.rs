// ============================================================================
// RASTER BUFFER: the pixel grid every edit operates on
// ============================================================================

use image::{DynamicImage, Rgb, RgbImage, Rgba, RgbaImage};

/// Which channels of a buffer carry meaning.
///
/// Pixels are always stored as RGBA so the rasterizers have one code path;
/// the layout decides how the buffer is exported and whether alpha matters.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChannelLayout {
    /// Opaque color, as loaded from a photo.
    Rgb,
    /// Color plus alpha, produced by background removal.
    Rgba,
}

impl ChannelLayout {
    pub fn channel_count(&self) -> usize {
        match self {
            ChannelLayout::Rgb => 3,
            ChannelLayout::Rgba => 4,
        }
    }
}

/// Owned 2D pixel buffer with an explicit channel layout.
#[derive(Clone, Debug, PartialEq)]
pub struct RasterBuffer {
    pixels: RgbaImage,
    layout: ChannelLayout,
}

impl RasterBuffer {
    /// Opaque buffer filled with one color.
    pub fn filled(width: u32, height: u32, color: Rgb<u8>) -> Self {
        let fill = Rgba([color[0], color[1], color[2], 255]);
        Self {
            pixels: RgbaImage::from_pixel(width, height, fill),
            layout: ChannelLayout::Rgb,
        }
    }

    pub fn from_rgb(image: &RgbImage) -> Self {
        Self {
            pixels: DynamicImage::ImageRgb8(image.clone()).to_rgba8(),
            layout: ChannelLayout::Rgb,
        }
    }

    pub fn from_rgba(pixels: RgbaImage) -> Self {
        Self {
            pixels,
            layout: ChannelLayout::Rgba,
        }
    }

    /// Wrap already-expanded pixels with an explicit layout.
    pub fn with_layout(pixels: RgbaImage, layout: ChannelLayout) -> Self {
        Self { pixels, layout }
    }

    /// Decoded photos become `Rgb` unless the file itself carried alpha.
    pub fn from_dynamic(image: DynamicImage) -> Self {
        let layout = if image.color().has_alpha() {
            ChannelLayout::Rgba
        } else {
            ChannelLayout::Rgb
        };
        Self {
            pixels: image.to_rgba8(),
            layout,
        }
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.pixels.dimensions()
    }

    pub fn layout(&self) -> ChannelLayout {
        self.layout
    }

    pub fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }

    pub fn pixels_mut(&mut self) -> &mut RgbaImage {
        &mut self.pixels
    }

    pub fn into_pixels(self) -> RgbaImage {
        self.pixels
    }

    /// `true` when `(x, y)` lies inside the pixel grid.
    pub fn contains(&self, x: f32, y: f32) -> bool {
        x >= 0.0 && y >= 0.0 && x < self.width() as f32 && y < self.height() as f32
    }

    /// Heap bytes held by the pixel data.
    pub fn byte_size(&self) -> usize {
        self.pixels.as_raw().len()
    }

    /// Opaque copy of the color channels.
    pub fn to_rgb(&self) -> RgbImage {
        DynamicImage::ImageRgba8(self.pixels.clone()).to_rgb8()
    }

    /// Export in the buffer's own layout (alpha dropped for `Rgb`).
    pub fn to_dynamic(&self) -> DynamicImage {
        match self.layout {
            ChannelLayout::Rgb => DynamicImage::ImageRgb8(self.to_rgb()),
            ChannelLayout::Rgba => DynamicImage::ImageRgba8(self.pixels.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rgb_photo_has_three_channel_layout() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(4, 3, Rgb([1, 2, 3])));
        let buf = RasterBuffer::from_dynamic(img);
        assert_eq!(buf.layout(), ChannelLayout::Rgb);
        assert_eq!(buf.dimensions(), (4, 3));
        assert_eq!(buf.pixels().get_pixel(0, 0), &Rgba([1, 2, 3, 255]));
        assert_eq!(buf.byte_size(), 4 * 3 * 4);
    }

    #[test]
    fn export_respects_layout() {
        let rgb = RasterBuffer::filled(2, 2, Rgb([9, 9, 9]));
        assert!(!rgb.to_dynamic().color().has_alpha());

        let rgba = RasterBuffer::from_rgba(RgbaImage::from_pixel(2, 2, Rgba([1, 1, 1, 0])));
        assert!(rgba.to_dynamic().color().has_alpha());
        assert_eq!(rgba.layout().channel_count(), 4);
    }

    #[test]
    fn contains_is_half_open() {
        let buf = RasterBuffer::filled(10, 5, Rgb([0, 0, 0]));
        assert!(buf.contains(0.0, 0.0));
        assert!(buf.contains(9.9, 4.9));
        assert!(!buf.contains(10.0, 2.0));
        assert!(!buf.contains(-0.1, 2.0));
    }
}
