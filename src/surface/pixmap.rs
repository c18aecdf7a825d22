use anyhow::{Context, Result, anyhow};
use image::{DynamicImage, ImageFormat, RgbaImage};
use resvg::render;
use std::io::Cursor;
use std::sync::Arc;
use tiny_skia::{ColorU8, Paint, Pixmap, Rect, Transform};
use usvg::{Options, Tree, fontdb};

use super::font::{FontMetrics, measure_text_width_px};
use super::{PixelRect, Rgb, Surface, TextAnchor, TextRun};

#[derive(Debug, Clone)]
pub struct TextStyle {
    pub color: String,
    pub font_families: Vec<String>,
    /// Measurement chain in fallback order; empty means estimated widths.
    pub fonts: Vec<FontMetrics>,
}

impl Default for TextStyle {
    fn default() -> Self {
        Self {
            color: "#000000".to_string(),
            font_families: vec!["monospace".to_string()],
            fonts: Vec::new(),
        }
    }
}

/// Raster surface backed by a `tiny_skia::Pixmap`. Text is drawn by rendering
/// an SVG text fragment over the existing pixels.
pub struct PixmapSurface {
    pixmap: Pixmap,
    style: TextStyle,
    fontdb: Arc<fontdb::Database>,
}

impl PixmapSurface {
    pub fn new(
        width: u32,
        height: u32,
        style: TextStyle,
        fontdb: Arc<fontdb::Database>,
    ) -> Result<Self> {
        let pixmap = Pixmap::new(width, height)
            .ok_or_else(|| anyhow!("cannot create a {}x{} rendering surface", width, height))?;
        Ok(Self {
            pixmap,
            style,
            fontdb,
        })
    }

    pub fn from_image_bytes(
        bytes: &[u8],
        style: TextStyle,
        fontdb: Arc<fontdb::Database>,
    ) -> Result<Self> {
        let image = image::load_from_memory(bytes).with_context(|| "failed to decode image")?;
        Self::from_rgba(&image.to_rgba8(), style, fontdb)
    }

    pub fn from_rgba(
        image: &RgbaImage,
        style: TextStyle,
        fontdb: Arc<fontdb::Database>,
    ) -> Result<Self> {
        let mut surface = Self::new(image.width(), image.height(), style, fontdb)?;
        for (dst, src) in surface.pixmap.pixels_mut().iter_mut().zip(image.pixels()) {
            let [r, g, b, a] = src.0;
            *dst = ColorU8::from_rgba(r, g, b, a).premultiply();
        }
        Ok(surface)
    }

    pub fn to_rgba_image(&self) -> Result<RgbaImage> {
        let mut data = Vec::with_capacity(self.pixmap.data().len());
        for pixel in self.pixmap.pixels() {
            let color = pixel.demultiply();
            data.extend_from_slice(&[color.red(), color.green(), color.blue(), color.alpha()]);
        }
        RgbaImage::from_raw(self.pixmap.width(), self.pixmap.height(), data)
            .ok_or_else(|| anyhow!("failed to build image buffer from surface"))
    }

    pub fn encode(&self, format: ImageFormat) -> Result<Vec<u8>> {
        let rgba = self.to_rgba_image()?;
        let image = match format {
            ImageFormat::Jpeg | ImageFormat::Bmp => {
                DynamicImage::ImageRgb8(DynamicImage::ImageRgba8(rgba).to_rgb8())
            }
            _ => DynamicImage::ImageRgba8(rgba),
        };
        let mut bytes = Vec::new();
        let mut cursor = Cursor::new(&mut bytes);
        image
            .write_to(&mut cursor, format)
            .with_context(|| format!("failed to encode surface as {:?}", format))?;
        Ok(bytes)
    }

    fn text_svg(&self, runs: &[TextRun]) -> String {
        let mut svg = String::new();
        svg.push_str(&format!(
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}">"#,
            w = self.pixmap.width(),
            h = self.pixmap.height()
        ));
        let family = font_family_attr(&self.style);
        for run in runs {
            let anchor = match run.anchor {
                TextAnchor::Start => "start",
                TextAnchor::Middle => "middle",
            };
            svg.push_str(&format!(
                r#"<text x="{x}" y="{y}" font-size="{size}" fill="{color}" font-family="{family}" text-anchor="{anchor}" dominant-baseline="middle" xml:space="preserve">{text}</text>"#,
                x = run.x,
                y = run.y,
                size = run.font_size,
                color = escape_xml(&self.style.color),
                family = family,
                anchor = anchor,
                text = escape_xml(&run.text)
            ));
        }
        svg.push_str("</svg>");
        svg
    }
}

impl Surface for PixmapSurface {
    fn width(&self) -> u32 {
        self.pixmap.width()
    }

    fn height(&self) -> u32 {
        self.pixmap.height()
    }

    fn read_block(&self, x: u32, y: u32, w: u32, h: u32) -> Vec<Rgb> {
        let mut block = Vec::with_capacity((w as usize) * (h as usize));
        for row in y..y + h {
            for col in x..x + w {
                if let Some(pixel) = self.pixmap.pixel(col, row) {
                    let color = pixel.demultiply();
                    block.push(Rgb::new(color.red(), color.green(), color.blue()));
                }
            }
        }
        block
    }

    fn fill_rect(&mut self, rect: PixelRect, color: Rgb) {
        let Some((x, y, w, h)) = rect.clamp_to(self.width(), self.height()) else {
            return;
        };
        let Some(rect) = Rect::from_xywh(x as f32, y as f32, w as f32, h as f32) else {
            return;
        };
        let mut paint = Paint::default();
        paint.set_color_rgba8(color.r, color.g, color.b, 255);
        paint.anti_alias = false;
        self.pixmap
            .fill_rect(rect, &paint, Transform::identity(), None);
    }

    fn measure_text(&self, text: &str, font_size: f32) -> f32 {
        measure_text_width_px(text, font_size, &self.style.fonts)
    }

    fn draw_text(&mut self, runs: &[TextRun]) -> Result<()> {
        if runs.is_empty() {
            return Ok(());
        }
        let svg = self.text_svg(runs);
        let options = Options {
            fontdb: self.fontdb.clone(),
            ..Options::default()
        };
        let tree = Tree::from_str(&svg, &options).with_context(|| "failed to parse text SVG")?;
        let mut pixmap_mut = self.pixmap.as_mut();
        render(&tree, Transform::identity(), &mut pixmap_mut);
        Ok(())
    }
}

fn font_family_attr(style: &TextStyle) -> String {
    let mut families: Vec<String> = Vec::new();
    let resolved = style.fonts.iter().filter_map(|font| font.family());
    for family in resolved.chain(style.font_families.iter().map(String::as_str)) {
        let quoted = quote_family(family);
        if !families.contains(&quoted) {
            families.push(quoted);
        }
    }
    escape_xml(&families.join(", "))
}

fn quote_family(family: &str) -> String {
    let trimmed = family.trim();
    match trimmed.to_ascii_lowercase().as_str() {
        "monospace" | "sans-serif" | "serif" | "cursive" | "fantasy" => trimmed.to_string(),
        _ => format!("'{}'", trimmed.replace('\'', "")),
    }
}

fn escape_xml(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}
