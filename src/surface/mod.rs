mod font;
mod pixmap;
#[cfg(test)]
pub(crate) mod testing;

use anyhow::Result;

pub use font::{
    FontMetrics, ResolvedFont, load_font_database, load_font_metrics, measure_text_width_px,
    resolve_fonts,
};
pub use pixmap::{PixmapSurface, TextStyle};

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const WHITE: Rgb = Rgb::new(255, 255, 255);
    pub const BLACK: Rgb = Rgb::new(0, 0, 0);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Unweighted mean of the three channels.
    pub fn brightness(&self) -> f32 {
        (self.r as f32 + self.g as f32 + self.b as f32) / 3.0
    }
}

/// Integer rectangle in pixel space. May extend past the surface on any side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelRect {
    pub x: i64,
    pub y: i64,
    pub w: i64,
    pub h: i64,
}

impl PixelRect {
    pub fn new(x: i64, y: i64, w: i64, h: i64) -> Self {
        Self { x, y, w, h }
    }

    pub fn right(&self) -> i64 {
        self.x + self.w
    }

    pub fn bottom(&self) -> i64 {
        self.y + self.h
    }

    /// Returns the rectangle as unsigned coordinates only when it lies
    /// entirely inside a `width` x `height` surface.
    pub fn within(&self, width: u32, height: u32) -> Option<(u32, u32, u32, u32)> {
        if self.w <= 0 || self.h <= 0 || self.x < 0 || self.y < 0 {
            return None;
        }
        if self.right() > width as i64 || self.bottom() > height as i64 {
            return None;
        }
        Some((self.x as u32, self.y as u32, self.w as u32, self.h as u32))
    }

    /// Intersection with a `width` x `height` surface.
    pub fn clamp_to(&self, width: u32, height: u32) -> Option<(u32, u32, u32, u32)> {
        let x0 = self.x.clamp(0, width as i64);
        let y0 = self.y.clamp(0, height as i64);
        let x1 = self.right().clamp(0, width as i64);
        let y1 = self.bottom().clamp(0, height as i64);
        if x1 <= x0 || y1 <= y0 {
            return None;
        }
        Some((x0 as u32, y0 as u32, (x1 - x0) as u32, (y1 - y0) as u32))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextAnchor {
    Start,
    Middle,
}

/// One line of text. `y` is the vertical middle of the glyph box.
#[derive(Debug, Clone, PartialEq)]
pub struct TextRun {
    pub text: String,
    pub x: f32,
    pub y: f32,
    pub font_size: f32,
    pub anchor: TextAnchor,
}

/// Mutable raster target the reconstruction passes paint on.
pub trait Surface {
    fn width(&self) -> u32;

    fn height(&self) -> u32;

    /// Reads a block in row-major order. The block must lie inside the surface.
    fn read_block(&self, x: u32, y: u32, w: u32, h: u32) -> Vec<Rgb>;

    /// Fills `rect` with an opaque color; the part outside the surface is ignored.
    fn fill_rect(&mut self, rect: PixelRect, color: Rgb);

    fn measure_text(&self, text: &str, font_size: f32) -> f32;

    fn draw_text(&mut self, runs: &[TextRun]) -> Result<()>;
}
