pub mod erase;
pub mod layout;

use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::surface::Surface;

pub use erase::{SampleOutcome, erase, sample_border_color};
pub use layout::{Alignment, Fitting, LayoutPlan, alignment_for, layout, plan_layout, try_fit};

/// Scale of the box coordinates returned by the annotator.
pub const BOX_SCALE: f32 = 1000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Category {
    Text,
    Technical,
}

/// `[ymin, xmin, ymax, xmax]` on a 0..=1000 scale relative to the image.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f32; 4]", into = "[f32; 4]")]
pub struct NormalizedBox {
    pub ymin: f32,
    pub xmin: f32,
    pub ymax: f32,
    pub xmax: f32,
}

impl From<[f32; 4]> for NormalizedBox {
    fn from([ymin, xmin, ymax, xmax]: [f32; 4]) -> Self {
        Self {
            ymin,
            xmin,
            ymax,
            xmax,
        }
    }
}

impl From<NormalizedBox> for [f32; 4] {
    fn from(value: NormalizedBox) -> Self {
        [value.ymin, value.xmin, value.ymax, value.xmax]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnotatedRegion {
    pub original_text: String,
    pub translated_text: String,
    #[serde(rename = "box_2d", alias = "box")]
    pub bbox: NormalizedBox,
    pub category: Category,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PixelRegion {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

impl PixelRegion {
    pub fn is_empty(&self) -> bool {
        !(self.w > 0.0 && self.h > 0.0)
    }
}

/// Border sampling constants for the eraser. Empirical; kept adjustable.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplingConfig {
    pub brightness_threshold: f32,
    pub strip_thickness: u32,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            brightness_threshold: 120.0,
            strip_thickness: 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReconstructionConfig {
    pub min_font_size: f32,
    pub max_font_size: f32,
    pub padding: f32,
    pub sampling: SamplingConfig,
}

impl Default for ReconstructionConfig {
    fn default() -> Self {
        Self {
            min_font_size: 10.0,
            max_font_size: 40.0,
            padding: 3.0,
            sampling: SamplingConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconstructionReport {
    pub processed: usize,
    pub skipped: usize,
    pub fallback_fills: usize,
    pub overflowed: usize,
    pub draw_failures: usize,
}

/// Only translated prose that actually changed is repainted.
pub fn should_process(region: &AnnotatedRegion) -> bool {
    if region.category != Category::Text {
        return false;
    }
    let translated = region.translated_text.trim();
    !translated.is_empty() && translated != region.original_text.trim()
}

pub fn denormalize(bbox: &NormalizedBox, width: u32, height: u32) -> PixelRegion {
    let (ymin, ymax) = ordered(clamp_coord(bbox.ymin), clamp_coord(bbox.ymax));
    let (xmin, xmax) = ordered(clamp_coord(bbox.xmin), clamp_coord(bbox.xmax));
    let width = width as f32;
    let height = height as f32;
    PixelRegion {
        x: xmin / BOX_SCALE * width,
        y: ymin / BOX_SCALE * height,
        w: (xmax - xmin) / BOX_SCALE * width,
        h: (ymax - ymin) / BOX_SCALE * height,
    }
}

fn clamp_coord(value: f32) -> f32 {
    if value.is_finite() {
        value.clamp(0.0, BOX_SCALE)
    } else {
        0.0
    }
}

fn ordered(a: f32, b: f32) -> (f32, f32) {
    if a <= b { (a, b) } else { (b, a) }
}

/// Erases every selected region, then draws every translation. Regions are
/// independent; a failure to draw one never stops the others.
pub fn reconstruct<S: Surface>(
    surface: &mut S,
    regions: &[AnnotatedRegion],
    config: &ReconstructionConfig,
) -> Result<ReconstructionReport> {
    let (width, height) = (surface.width(), surface.height());
    if width == 0 || height == 0 {
        return Err(anyhow!(
            "rendering surface is unavailable ({}x{})",
            width,
            height
        ));
    }

    let mut report = ReconstructionReport::default();
    let mut targets = Vec::new();
    for (idx, region) in regions.iter().enumerate() {
        if !should_process(region) {
            debug!(
                "region {}: kept ({:?}, unchanged or empty translation)",
                idx, region.category
            );
            report.skipped += 1;
            continue;
        }
        let pixel_region = denormalize(&region.bbox, width, height);
        if pixel_region.is_empty() {
            debug!("region {}: kept (empty box {:?})", idx, region.bbox);
            report.skipped += 1;
            continue;
        }
        targets.push((idx, region, pixel_region));
    }

    for (idx, _, pixel_region) in &targets {
        let outcome = erase(surface, pixel_region, config.padding, &config.sampling);
        if matches!(outcome, SampleOutcome::Fallback) {
            report.fallback_fills += 1;
        }
        debug!("region {}: erased with {:?}", idx, outcome);
    }

    for (idx, region, pixel_region) in &targets {
        match layout(surface, &region.translated_text, pixel_region, config) {
            Ok(fitting) => {
                if fitting.is_overflow() {
                    report.overflowed += 1;
                }
                debug!(
                    "region {}: drew {} line(s) at {}px",
                    idx,
                    fitting.lines().len(),
                    fitting.font_size()
                );
            }
            Err(err) => {
                report.draw_failures += 1;
                warn!("region {}: failed to draw translation: {}", idx, err);
            }
        }
    }

    report.processed = targets.len();
    info!(
        "reconstruction: processed={} skipped={} fallback_fills={} overflowed={}",
        report.processed, report.skipped, report.fallback_fills, report.overflowed
    );
    Ok(report)
}
