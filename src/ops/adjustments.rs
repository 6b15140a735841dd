// ============================================================================
// CHANNEL GAINS: per-channel multiplier for red, green and blue
// ============================================================================

use rayon::prelude::*;

use crate::raster::RasterBuffer;

pub const MAX_GAIN: u8 = 100;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Channel {
    Red,
    Green,
    Blue,
}

impl Channel {
    pub fn label(&self) -> &'static str {
        match self {
            Channel::Red => "Red",
            Channel::Green => "Green",
            Channel::Blue => "Blue",
        }
    }

    pub fn all() -> &'static [Channel] {
        &[Channel::Red, Channel::Green, Channel::Blue]
    }

    fn index(&self) -> usize {
        match self {
            Channel::Red => 0,
            Channel::Green => 1,
            Channel::Blue => 2,
        }
    }
}

/// One slider: disabled channels pass through untouched.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChannelGain {
    pub enabled: bool,
    /// Percentage, 0..=100.
    pub value: u8,
}

impl Default for ChannelGain {
    fn default() -> Self {
        Self {
            enabled: false,
            value: MAX_GAIN,
        }
    }
}

/// The gain table of a session, keyed by the closed `Channel` enum.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ChannelGains {
    gains: [ChannelGain; 3],
}

impl ChannelGains {
    pub fn get(&self, channel: Channel) -> ChannelGain {
        self.gains[channel.index()]
    }

    pub fn set_enabled(&mut self, channel: Channel, enabled: bool) {
        self.gains[channel.index()].enabled = enabled;
    }

    pub fn set_value(&mut self, channel: Channel, value: u8) {
        self.gains[channel.index()].value = value.min(MAX_GAIN);
    }

    /// Enable `channel` at `value`.
    pub fn set(&mut self, channel: Channel, value: u8) {
        self.set_enabled(channel, true);
        self.set_value(channel, value);
    }

    /// `true` when applying the table would change some pixel.
    pub fn is_identity(&self) -> bool {
        self.gains.iter().all(|g| !g.enabled || g.value == MAX_GAIN)
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    fn factors(&self) -> [f32; 3] {
        let mut f = [1.0f32; 3];
        for (i, g) in self.gains.iter().enumerate() {
            if g.enabled {
                f[i] = g.value as f32 / MAX_GAIN as f32;
            }
        }
        f
    }

    /// Multiply each enabled channel of `buffer` by `value / 100`. Alpha is kept.
    pub fn apply(&self, buffer: &mut RasterBuffer) {
        if self.is_identity() {
            return;
        }
        let [fr, fg, fb] = self.factors();
        let w = buffer.width() as usize;
        if w == 0 {
            return;
        }
        let stride = w * 4;
        let raw: &mut [u8] = buffer.pixels_mut();
        raw.par_chunks_mut(stride).for_each(|row| {
            for px in row.chunks_exact_mut(4) {
                px[0] = (px[0] as f32 * fr).round().clamp(0.0, 255.0) as u8;
                px[1] = (px[1] as f32 * fg).round().clamp(0.0, 255.0) as u8;
                px[2] = (px[2] as f32 * fb).round().clamp(0.0, 255.0) as u8;
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, Rgba};

    #[test]
    fn defaults_are_disabled_full_gain() {
        let gains = ChannelGains::default();
        for &c in Channel::all() {
            assert_eq!(gains.get(c), ChannelGain { enabled: false, value: 100 });
        }
        assert!(gains.is_identity());
    }

    #[test]
    fn only_enabled_channels_scale() {
        let mut buf = RasterBuffer::filled(3, 3, Rgb([200, 100, 50]));
        let mut gains = ChannelGains::default();
        gains.set_value(Channel::Red, 50);
        gains.set(Channel::Green, 25);
        gains.apply(&mut buf);
        assert_eq!(buf.pixels().get_pixel(1, 1), &Rgba([200, 25, 50, 255]));
    }

    #[test]
    fn zero_gain_clears_channel_and_keeps_alpha() {
        let mut buf = RasterBuffer::from_rgba(image::RgbaImage::from_pixel(2, 2, Rgba([10, 20, 30, 40])));
        let mut gains = ChannelGains::default();
        gains.set(Channel::Blue, 0);
        gains.apply(&mut buf);
        assert_eq!(buf.pixels().get_pixel(0, 0), &Rgba([10, 20, 0, 40]));
    }

    #[test]
    fn value_is_capped_and_reset_restores_defaults() {
        let mut gains = ChannelGains::default();
        gains.set(Channel::Red, 250);
        assert_eq!(gains.get(Channel::Red).value, 100);
        gains.set(Channel::Red, 30);
        assert!(!gains.is_identity());
        gains.reset();
        assert_eq!(gains, ChannelGains::default());
    }
}
