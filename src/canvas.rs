// ============================================================================
// CANVAS: display-space ↔ image-space mapping and the viewport zoom
// ============================================================================

/// Zoom bounds and wheel step for the image surface.
pub const MIN_ZOOM: f32 = 0.1;
pub const MAX_ZOOM: f32 = 100.0;
pub const ZOOM_STEP: f32 = 1.2;

/// A point in pixel coordinates of the committed buffer.
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub struct ImagePoint {
    pub x: f32,
    pub y: f32,
}

impl ImagePoint {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Clamp onto the pixel grid of a `width` × `height` buffer.
    pub fn clamped(self, width: u32, height: u32) -> Self {
        let max_x = (width.max(1) - 1) as f32;
        let max_y = (height.max(1) - 1) as f32;
        Self {
            x: self.x.clamp(0.0, max_x),
            y: self.y.clamp(0.0, max_y),
        }
    }

    pub fn midpoint(self, other: ImagePoint) -> ImagePoint {
        ImagePoint::new((self.x + other.x) * 0.5, (self.y + other.y) * 0.5)
    }
}

/// Map a pointer position, relative to the top-left of the displayed image,
/// into image space. Each axis scales independently.
///
/// Returns `None` when the displayed size is zero or not finite; the caller
/// drops the event.
pub fn map_to_image(
    pointer: (f32, f32),
    displayed: (f32, f32),
    buffer: (u32, u32),
) -> Option<ImagePoint> {
    let (dw, dh) = displayed;
    if !(dw.is_finite() && dh.is_finite()) || dw <= 0.0 || dh <= 0.0 {
        return None;
    }
    if !(pointer.0.is_finite() && pointer.1.is_finite()) {
        return None;
    }
    let sx = buffer.0 as f32 / dw;
    let sy = buffer.1 as f32 / dh;
    Some(ImagePoint::new(pointer.0 * sx, pointer.1 * sy))
}

/// Per-session zoom. The displayed size is the fit-to-container size times
/// the zoom factor.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Viewport {
    pub zoom: f32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self { zoom: 1.0 }
    }
}

impl Viewport {
    pub fn zoom_in(&mut self) {
        self.apply_zoom(ZOOM_STEP);
    }

    pub fn zoom_out(&mut self) {
        self.apply_zoom(1.0 / ZOOM_STEP);
    }

    pub fn reset_zoom(&mut self) {
        self.zoom = 1.0;
    }

    pub fn apply_zoom(&mut self, zoom_factor: f32) {
        self.zoom = (self.zoom * zoom_factor).clamp(MIN_ZOOM, MAX_ZOOM);
    }

    /// Scroll-wheel input: one step per notch, direction from the sign.
    pub fn scroll(&mut self, delta_y: f32) {
        if delta_y > 0.0 {
            self.zoom_in();
        } else if delta_y < 0.0 {
            self.zoom_out();
        }
    }

    /// Displayed size of a `buffer`-sized image inside `container`, keeping
    /// the aspect ratio, scaled by the zoom.
    pub fn displayed_size(&self, buffer: (u32, u32), container: (f32, f32)) -> (f32, f32) {
        let (bw, bh) = (buffer.0 as f32, buffer.1 as f32);
        if bw <= 0.0 || bh <= 0.0 || container.0 <= 0.0 || container.1 <= 0.0 {
            return (0.0, 0.0);
        }
        let fit = (container.0 / bw).min(container.1 / bh);
        (bw * fit * self.zoom, bh * fit * self.zoom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_with_independent_axis_scale() {
        let p = map_to_image((100.0, 100.0), (500.0, 250.0), (1000, 500)).unwrap();
        assert_eq!(p, ImagePoint::new(200.0, 200.0));

        let q = map_to_image((50.0, 50.0), (100.0, 400.0), (200, 200)).unwrap();
        assert_eq!(q, ImagePoint::new(100.0, 25.0));
    }

    #[test]
    fn zero_or_nan_display_gives_no_point() {
        assert!(map_to_image((1.0, 1.0), (0.0, 250.0), (1000, 500)).is_none());
        assert!(map_to_image((1.0, 1.0), (500.0, 0.0), (1000, 500)).is_none());
        assert!(map_to_image((1.0, 1.0), (f32::NAN, 10.0), (1000, 500)).is_none());
        assert!(map_to_image((f32::INFINITY, 1.0), (10.0, 10.0), (1000, 500)).is_none());
    }

    #[test]
    fn clamped_point_stays_on_grid() {
        let p = ImagePoint::new(-5.0, 120.0).clamped(100, 50);
        assert_eq!(p, ImagePoint::new(0.0, 49.0));
    }

    #[test]
    fn zoom_clamps_to_bounds() {
        let mut v = Viewport::default();
        for _ in 0..100 {
            v.zoom_in();
        }
        assert_eq!(v.zoom, MAX_ZOOM);
        for _ in 0..200 {
            v.scroll(-1.0);
        }
        assert_eq!(v.zoom, MIN_ZOOM);
        v.reset_zoom();
        assert_eq!(v.zoom, 1.0);
    }

    #[test]
    fn displayed_size_fits_container() {
        let v = Viewport::default();
        assert_eq!(v.displayed_size((1000, 500), (500.0, 500.0)), (500.0, 250.0));
        let mut zoomed = v;
        zoomed.zoom = 2.0;
        assert_eq!(zoomed.displayed_size((1000, 500), (500.0, 500.0)), (1000.0, 500.0));
        assert_eq!(v.displayed_size((0, 500), (500.0, 500.0)), (0.0, 0.0));
    }
}
