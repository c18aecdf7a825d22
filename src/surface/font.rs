use anyhow::{Context, Result, anyhow};
use std::path::Path;
use std::sync::Arc;
use ttf_parser::Face;
use ttf_parser::name_id;
use usvg::fontdb;

/// Glyph-advance metrics of a single face, used to measure text before drawing.
#[derive(Clone)]
pub struct FontMetrics {
    data: Arc<Vec<u8>>,
    units_per_em: u16,
    space_advance: u16,
    family: Option<String>,
    face_index: u32,
}

impl std::fmt::Debug for FontMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FontMetrics")
            .field("family", &self.family)
            .field("units_per_em", &self.units_per_em)
            .field("face_index", &self.face_index)
            .finish()
    }
}

impl FontMetrics {
    pub fn family(&self) -> Option<&str> {
        self.family.as_deref()
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedFont {
    pub metrics: FontMetrics,
    pub family: String,
}

pub fn load_font_metrics(path: &Path) -> Result<FontMetrics> {
    let data =
        std::fs::read(path).with_context(|| format!("failed to read font: {}", path.display()))?;
    load_font_metrics_from_data(&data, None)
        .map_err(|err| anyhow!("failed to parse font: {} ({})", path.display(), err))
}

/// System fonts plus an optional user-supplied face.
pub fn load_font_database(extra_font: Option<&[u8]>) -> fontdb::Database {
    let mut db = fontdb::Database::new();
    db.load_system_fonts();
    if let Some(data) = extra_font {
        db.load_font_data(data.to_vec());
    }
    db
}

/// Builds the ordered face chain used for measurement: an explicit font file
/// first, then every family of `families` present in `db`. Faces already in
/// the chain are not added twice.
pub fn resolve_fonts(
    db: &fontdb::Database,
    font_path: Option<&Path>,
    families: &[String],
) -> Result<Vec<ResolvedFont>> {
    let mut resolved: Vec<ResolvedFont> = Vec::new();
    if let Some(path) = font_path {
        let metrics = load_font_metrics(path)?;
        let family = metrics
            .family()
            .map(|name| name.to_string())
            .unwrap_or_else(|| path.display().to_string());
        resolved.push(ResolvedFont { metrics, family });
    }

    for candidate in families {
        let Ok(font) = load_font_metrics_from_family(db, candidate) else {
            continue;
        };
        if resolved
            .iter()
            .any(|known| known.family.eq_ignore_ascii_case(&font.family))
        {
            continue;
        }
        resolved.push(font);
    }

    if resolved.is_empty() {
        return Err(anyhow!("none of the configured font families is installed"));
    }
    Ok(resolved)
}

/// Width of `text` at `font_size`. Each character is measured with the first
/// face in `fonts` that maps it, the same fallback order the renderer walks.
/// Characters no face maps, and all text when `fonts` is empty, use a
/// per-character estimate.
pub fn measure_text_width_px(text: &str, font_size: f32, fonts: &[FontMetrics]) -> f32 {
    let faces: Vec<(&FontMetrics, Face<'_>)> = fonts
        .iter()
        .filter_map(|font| {
            Face::parse(&font.data, font.face_index)
                .ok()
                .map(|face| (font, face))
        })
        .collect();
    if faces.is_empty() {
        return estimate_text_width_units(text) * font_size;
    }

    let em: f32 = text
        .chars()
        .filter(|ch| *ch != '\n')
        .map(|ch| char_advance_em(ch, &faces))
        .sum();
    em * font_size
}

fn char_advance_em(ch: char, faces: &[(&FontMetrics, Face<'_>)]) -> f32 {
    if ch == ' '
        && let Some((font, _)) = faces.first()
    {
        return font.space_advance as f32 / font.units_per_em.max(1) as f32;
    }
    for (font, face) in faces {
        if let Some(advance) = face
            .glyph_index(ch)
            .and_then(|glyph| face.glyph_hor_advance(glyph))
        {
            return advance as f32 / font.units_per_em.max(1) as f32;
        }
    }
    estimate_char_units(ch)
}

fn estimate_char_units(ch: char) -> f32 {
    if ch.is_whitespace() {
        0.25
    } else if ch.is_ascii_alphanumeric() {
        0.55
    } else if ch.is_ascii() {
        0.35
    } else if is_wide(ch) {
        1.0
    } else {
        0.9
    }
}

fn is_wide(ch: char) -> bool {
    matches!(
        ch as u32,
        0x3000..=0x303F | 0x3040..=0x30FF | 0x31F0..=0x31FF | 0x4E00..=0x9FFF | 0xAC00..=0xD7AF | 0xFF00..=0xFFEF
    )
}

fn estimate_text_width_units(text: &str) -> f32 {
    text.chars()
        .filter(|ch| *ch != '\n')
        .map(estimate_char_units)
        .sum()
}

fn load_font_metrics_from_data(data: &[u8], preferred_family: Option<&str>) -> Result<FontMetrics> {
    let mut fallback = None;
    let shared = Arc::new(data.to_vec());
    let count = ttf_parser::fonts_in_collection(data).unwrap_or(1);
    for index in 0..count {
        let Ok(face) = Face::parse(data, index) else {
            continue;
        };
        let family = extract_family_name(&face);
        let units_per_em = face.units_per_em().max(1);
        let space_advance = face
            .glyph_index(' ')
            .and_then(|id| face.glyph_hor_advance(id))
            .unwrap_or(units_per_em / 2);
        let metrics = FontMetrics {
            data: shared.clone(),
            units_per_em,
            space_advance,
            family: family.clone(),
            face_index: index,
        };
        if let (Some(preferred), Some(found)) = (preferred_family, &family)
            && found.eq_ignore_ascii_case(preferred)
        {
            return Ok(metrics);
        }
        if fallback.is_none() {
            fallback = Some(metrics);
        }
    }
    fallback.ok_or_else(|| anyhow!("failed to parse font data"))
}

fn generic_family(name: &str) -> Option<fontdb::Family<'_>> {
    match name.trim().to_ascii_lowercase().as_str() {
        "monospace" => Some(fontdb::Family::Monospace),
        "sans-serif" => Some(fontdb::Family::SansSerif),
        "serif" => Some(fontdb::Family::Serif),
        _ => None,
    }
}

fn load_font_metrics_from_family(db: &fontdb::Database, family: &str) -> Result<ResolvedFont> {
    let families = match generic_family(family) {
        Some(generic) => vec![generic],
        None => vec![fontdb::Family::Name(family)],
    };
    let query = fontdb::Query {
        families: &families,
        ..Default::default()
    };
    let id = db
        .query(&query)
        .ok_or_else(|| anyhow!("font not found: {}", family))?;
    let (data, face_index) = db
        .with_face_data(id, |data, index| (data.to_vec(), index))
        .ok_or_else(|| anyhow!("failed to load font data: {}", family))?;
    let mut metrics = load_font_metrics_from_data(&data, None)?;
    if let Ok(face) = Face::parse(&data, face_index) {
        metrics.face_index = face_index;
        metrics.family = extract_family_name(&face);
        metrics.units_per_em = face.units_per_em().max(1);
        metrics.space_advance = face
            .glyph_index(' ')
            .and_then(|id| face.glyph_hor_advance(id))
            .unwrap_or(metrics.units_per_em / 2);
    }
    let resolved_family = metrics
        .family()
        .map(|name| name.to_string())
        .unwrap_or_else(|| family.to_string());
    Ok(ResolvedFont {
        metrics,
        family: resolved_family,
    })
}

fn extract_family_name(face: &Face<'_>) -> Option<String> {
    let mut fallback = None;
    for name in face.names() {
        if name.name_id == name_id::TYPOGRAPHIC_FAMILY {
            if let Some(value) = name.to_string() {
                return Some(value);
            }
        } else if name.name_id == name_id::FAMILY && fallback.is_none() {
            fallback = name.to_string();
        }
    }
    fallback
}
