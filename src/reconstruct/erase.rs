use crate::surface::{PixelRect, Rgb, Surface};

use super::{PixelRegion, SamplingConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleOutcome {
    /// Mean of the light border pixels.
    Sampled(Rgb),
    /// No usable border pixel; the region is painted white.
    Fallback,
}

impl SampleOutcome {
    pub fn color(&self) -> Rgb {
        match self {
            SampleOutcome::Sampled(color) => *color,
            SampleOutcome::Fallback => Rgb::WHITE,
        }
    }
}

#[derive(Default)]
struct ColorAccumulator {
    r: u64,
    g: u64,
    b: u64,
    count: u64,
}

impl ColorAccumulator {
    fn add(&mut self, pixel: Rgb) {
        self.r += pixel.r as u64;
        self.g += pixel.g as u64;
        self.b += pixel.b as u64;
        self.count += 1;
    }

    fn mean(&self) -> Option<Rgb> {
        if self.count == 0 {
            return None;
        }
        let channel = |sum: u64| (sum as f64 / self.count as f64).round().clamp(0.0, 255.0) as u8;
        Some(Rgb::new(channel(self.r), channel(self.g), channel(self.b)))
    }
}

/// Repaints the padded region with a flat color estimated from its border.
pub fn erase<S: Surface>(
    surface: &mut S,
    region: &PixelRegion,
    padding: f32,
    sampling: &SamplingConfig,
) -> SampleOutcome {
    let padded = padded_rect(region, padding);
    let outcome = sample_border_color(surface, padded, sampling);
    surface.fill_rect(padded, outcome.color());
    outcome
}

/// Region grown by `padding` on every side, snapped outwards to whole pixels.
pub(crate) fn padded_rect(region: &PixelRegion, padding: f32) -> PixelRect {
    let padding = if padding.is_finite() { padding.max(0.0) } else { 0.0 };
    let left = (region.x - padding).floor() as i64;
    let top = (region.y - padding).floor() as i64;
    let right = (region.x + region.w + padding).ceil() as i64;
    let bottom = (region.y + region.h + padding).ceil() as i64;
    PixelRect::new(left, top, right - left, bottom - top)
}

/// Averages the pixels brighter than the threshold in the four strips just
/// outside `rect`. A strip reaching past the surface is skipped whole.
pub fn sample_border_color<S: Surface>(
    surface: &S,
    rect: PixelRect,
    sampling: &SamplingConfig,
) -> SampleOutcome {
    let t = sampling.strip_thickness as i64;
    if t == 0 {
        return SampleOutcome::Fallback;
    }
    let strips = [
        PixelRect::new(rect.x, rect.y - t, rect.w, t),
        PixelRect::new(rect.x, rect.bottom(), rect.w, t),
        PixelRect::new(rect.x - t, rect.y, t, rect.h),
        PixelRect::new(rect.right(), rect.y, t, rect.h),
    ];

    let mut acc = ColorAccumulator::default();
    for strip in strips {
        let Some((x, y, w, h)) = strip.within(surface.width(), surface.height()) else {
            continue;
        };
        for pixel in surface.read_block(x, y, w, h) {
            if pixel.brightness() > sampling.brightness_threshold {
                acc.add(pixel);
            }
        }
    }

    match acc.mean() {
        Some(color) => SampleOutcome::Sampled(color),
        None => SampleOutcome::Fallback,
    }
}
