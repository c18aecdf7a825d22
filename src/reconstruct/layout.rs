use anyhow::Result;
use regex::Regex;
use std::sync::LazyLock;

use crate::surface::{Surface, TextAnchor, TextRun};

use super::{PixelRegion, ReconstructionConfig};

pub const LINE_HEIGHT_RATIO: f32 = 1.2;
/// Middle-baseline rendering sits slightly low; each line is lifted by this share of the font size.
pub const BASELINE_CORRECTION_RATIO: f32 = 0.1;

static LIST_ITEM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(?:\d+\.|[-–—•·*])").expect("list item pattern"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Alignment {
    Left,
    Center,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Fitting {
    /// Largest size in range at which every line fits the region.
    Fit { font_size: f32, lines: Vec<String> },
    /// Nothing fitted; drawn at the minimum size and may spill out of the region.
    Overflow { font_size: f32, lines: Vec<String> },
}

impl Fitting {
    pub fn font_size(&self) -> f32 {
        match self {
            Fitting::Fit { font_size, .. } | Fitting::Overflow { font_size, .. } => *font_size,
        }
    }

    pub fn lines(&self) -> &[String] {
        match self {
            Fitting::Fit { lines, .. } | Fitting::Overflow { lines, .. } => lines,
        }
    }

    pub fn is_overflow(&self) -> bool {
        matches!(self, Fitting::Overflow { .. })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LayoutPlan {
    pub alignment: Alignment,
    pub fitting: Fitting,
}

/// Notes and lists are left-aligned; short labels are centered.
pub fn alignment_for(text: &str) -> Alignment {
    if text.contains('\n') || LIST_ITEM.is_match(text) {
        Alignment::Left
    } else {
        Alignment::Center
    }
}

fn paragraphs(text: &str) -> impl Iterator<Item = &str> {
    text.split('\n')
        .map(|line| line.trim_end_matches('\r'))
        .filter(|line| !line.trim().is_empty())
}

/// Greedy wrap of one paragraph. Words when the paragraph has spaces,
/// single characters otherwise. Runs of spaces count as one separator.
/// `None` when one token is wider than `max_width`.
pub fn wrap_paragraph<S: Surface>(
    surface: &S,
    paragraph: &str,
    max_width: f32,
    font_size: f32,
) -> Option<Vec<String>> {
    let (tokens, separator): (Vec<&str>, &str) = if paragraph.contains(' ') {
        (
            paragraph.split(' ').filter(|token| !token.is_empty()).collect(),
            " ",
        )
    } else {
        (
            paragraph
                .char_indices()
                .map(|(idx, ch)| &paragraph[idx..idx + ch.len_utf8()])
                .collect(),
            "",
        )
    };

    let mut lines = Vec::new();
    let mut current = String::new();
    for token in tokens {
        if surface.measure_text(token, font_size) > max_width {
            return None;
        }
        if current.is_empty() {
            current.push_str(token);
            continue;
        }
        let candidate = format!("{}{}{}", current, separator, token);
        if surface.measure_text(&candidate, font_size) <= max_width {
            current = candidate;
        } else {
            lines.push(std::mem::replace(&mut current, token.to_string()));
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }
    Some(lines)
}

/// Wraps every paragraph at `font_size`; explicit line breaks always start a new line.
pub fn wrap_text<S: Surface>(
    surface: &S,
    text: &str,
    max_width: f32,
    font_size: f32,
) -> Option<Vec<String>> {
    let mut lines = Vec::new();
    for paragraph in paragraphs(text) {
        lines.extend(wrap_paragraph(surface, paragraph, max_width, font_size)?);
    }
    Some(lines)
}

/// Feasibility test for a single candidate size.
pub fn try_fit<S: Surface>(
    surface: &S,
    text: &str,
    region: &PixelRegion,
    font_size: f32,
) -> Option<Vec<String>> {
    let lines = wrap_text(surface, text, region.w, font_size)?;
    let block_height = lines.len() as f32 * font_size * LINE_HEIGHT_RATIO;
    if block_height <= region.h {
        Some(lines)
    } else {
        None
    }
}

/// Largest useful first candidate: sizes well above what one line of the
/// region height allows can never fit, so the descent starts near that bound
/// while staying on the whole-unit grid below `max_font_size`.
fn first_candidate(max_font_size: f32, region: &PixelRegion) -> Option<f32> {
    let limit = region.h / LINE_HEIGHT_RATIO + 1.0;
    if !limit.is_finite() || max_font_size.is_nan() {
        return None;
    }
    if max_font_size <= limit {
        return Some(max_font_size);
    }
    let start = max_font_size - (max_font_size - limit).ceil();
    if start <= limit && start > limit - 1.0 {
        Some(start)
    } else {
        // the grid is not representable at this magnitude
        Some(limit.floor())
    }
}

pub fn plan_layout<S: Surface>(
    surface: &S,
    text: &str,
    region: &PixelRegion,
    config: &ReconstructionConfig,
) -> LayoutPlan {
    let alignment = alignment_for(text);
    if let Some(start) = first_candidate(config.max_font_size, region)
        && start >= config.min_font_size
        && start > 0.0
    {
        let steps = (start - config.min_font_size).floor() as u32;
        for step in 0..=steps {
            let font_size = start - step as f32;
            if font_size <= 0.0 {
                break;
            }
            if let Some(lines) = try_fit(surface, text, region, font_size) {
                return LayoutPlan {
                    alignment,
                    fitting: Fitting::Fit { font_size, lines },
                };
            }
        }
    }

    let font_size = config.min_font_size;
    let lines = match wrap_text(surface, text, region.w, font_size) {
        Some(lines) if !lines.is_empty() => lines,
        // drawn as one run; a line break inside it renders as a space
        _ => vec![text.to_string()],
    };
    LayoutPlan {
        alignment,
        fitting: Fitting::Overflow { font_size, lines },
    }
}

/// Places each line: the block is centered vertically, lines start at the
/// left edge or sit on the horizontal center.
pub fn position_lines(plan: &LayoutPlan, region: &PixelRegion) -> Vec<TextRun> {
    let font_size = plan.fitting.font_size();
    let line_height = font_size * LINE_HEIGHT_RATIO;
    let lines = plan.fitting.lines();
    let block_height = lines.len() as f32 * line_height;
    let top = region.y + (region.h - block_height) / 2.0;
    let (x, anchor) = match plan.alignment {
        Alignment::Left => (region.x, TextAnchor::Start),
        Alignment::Center => (region.x + region.w / 2.0, TextAnchor::Middle),
    };
    lines
        .iter()
        .enumerate()
        .map(|(idx, line)| TextRun {
            text: line.clone(),
            x,
            y: top + idx as f32 * line_height + line_height / 2.0
                - font_size * BASELINE_CORRECTION_RATIO,
            font_size,
            anchor,
        })
        .collect()
}

pub fn layout<S: Surface>(
    surface: &mut S,
    text: &str,
    region: &PixelRegion,
    config: &ReconstructionConfig,
) -> Result<Fitting> {
    let plan = plan_layout(surface, text, region, config);
    let runs = position_lines(&plan, region);
    surface.draw_text(&runs)?;
    Ok(plan.fitting)
}
