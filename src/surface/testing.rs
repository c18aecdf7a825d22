use anyhow::{Result, anyhow};

use super::{PixelRect, Rgb, Surface, TextRun};

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Op {
    Fill(PixelRect, Rgb),
    Draw(Vec<TextRun>),
}

/// In-memory surface with a fixed per-character advance that records every
/// mutation in order.
pub(crate) struct RecordingSurface {
    pub(crate) width: u32,
    pub(crate) height: u32,
    pub(crate) pixels: Vec<Rgb>,
    pub(crate) ops: Vec<Op>,
    pub(crate) char_advance: f32,
    pub(crate) fail_draws: bool,
}

impl RecordingSurface {
    pub(crate) fn new(width: u32, height: u32, background: Rgb) -> Self {
        Self {
            width,
            height,
            pixels: vec![background; (width as usize) * (height as usize)],
            ops: Vec::new(),
            char_advance: 0.5,
            fail_draws: false,
        }
    }

    pub(crate) fn set(&mut self, x: u32, y: u32, color: Rgb) {
        let idx = (y * self.width + x) as usize;
        self.pixels[idx] = color;
    }

    pub(crate) fn get(&self, x: u32, y: u32) -> Rgb {
        self.pixels[(y * self.width + x) as usize]
    }

    pub(crate) fn paint_rect(&mut self, x: u32, y: u32, w: u32, h: u32, color: Rgb) {
        for row in y..y + h {
            for col in x..x + w {
                self.set(col, row, color);
            }
        }
    }

    pub(crate) fn fills(&self) -> Vec<(PixelRect, Rgb)> {
        self.ops
            .iter()
            .filter_map(|op| match op {
                Op::Fill(rect, color) => Some((*rect, *color)),
                Op::Draw(_) => None,
            })
            .collect()
    }

    pub(crate) fn draws(&self) -> Vec<Vec<TextRun>> {
        self.ops
            .iter()
            .filter_map(|op| match op {
                Op::Draw(runs) => Some(runs.clone()),
                Op::Fill(..) => None,
            })
            .collect()
    }
}

impl Surface for RecordingSurface {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn read_block(&self, x: u32, y: u32, w: u32, h: u32) -> Vec<Rgb> {
        let mut block = Vec::new();
        for row in y..y + h {
            for col in x..x + w {
                block.push(self.get(col, row));
            }
        }
        block
    }

    fn fill_rect(&mut self, rect: PixelRect, color: Rgb) {
        self.ops.push(Op::Fill(rect, color));
        if let Some((x, y, w, h)) = rect.clamp_to(self.width, self.height) {
            self.paint_rect(x, y, w, h, color);
        }
    }

    fn measure_text(&self, text: &str, font_size: f32) -> f32 {
        text.chars().filter(|ch| *ch != '\n').count() as f32 * font_size * self.char_advance
    }

    fn draw_text(&mut self, runs: &[TextRun]) -> Result<()> {
        if self.fail_draws {
            return Err(anyhow!("draw refused"));
        }
        self.ops.push(Op::Draw(runs.to_vec()));
        Ok(())
    }
}
