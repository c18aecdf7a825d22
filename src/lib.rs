use anyhow::{Context, Result, anyhow};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

pub mod annotate;
pub mod data;
pub mod logging;
pub mod reconstruct;
pub mod session;
pub mod settings;
pub mod surface;
mod test_util;

pub use annotate::{AnnotationRequest, Annotator, GeminiAnnotator, StaticAnnotator};
pub use reconstruct::{
    AnnotatedRegion, Category, ReconstructionConfig, ReconstructionReport, reconstruct,
};
pub use session::{Session, SessionOutcome, Stage};
pub use surface::{PixmapSurface, Surface, TextStyle};

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub image: PathBuf,
    pub output: PathBuf,
    pub regions: Option<PathBuf>,
    pub dump_regions: Option<PathBuf>,
    pub lang: Option<String>,
    pub source_lang: Option<String>,
    pub model: Option<String>,
    pub key: Option<String>,
    pub settings_path: Option<String>,
    pub min_font_size: Option<f32>,
    pub max_font_size: Option<f32>,
    pub padding: Option<f32>,
}

pub async fn run(config: Config) -> Result<String> {
    let settings_path = config.settings_path.as_deref().map(Path::new);
    let mut settings = settings::load_settings(settings_path)?;
    apply_overrides(&mut settings, &config)?;

    let image = data::load_image(&config.image)?;
    let output_format = data::output_format_for_path(&config.output)?;
    let mut surface = build_surface(&image, &settings)?;
    info!(
        "image: {} ({}, {}x{})",
        config.image.display(),
        image.mime,
        surface.width(),
        surface.height()
    );

    let mut session = match config.regions.as_deref() {
        Some(path) => Session::new(StaticAnnotator::from_path(path)?),
        None => {
            let key = annotate::resolve_key(config.key.as_deref())?;
            Session::new(GeminiAnnotator::new(key).with_model(settings.model.clone()))
        }
    };
    let request = AnnotationRequest {
        image_bytes: image.bytes,
        image_mime: image.mime,
        source_lang: settings.source_lang.clone(),
        target_lang: settings.target_lang.clone(),
    };
    let outcome = session
        .run(&mut surface, request, &settings.reconstruction_config())
        .await?;

    if let Some(path) = config.dump_regions.as_deref() {
        annotate::save_regions(path, &outcome.regions)?;
    }
    let bytes = surface.encode(output_format)?;
    std::fs::write(&config.output, bytes)
        .with_context(|| format!("failed to write output: {}", config.output.display()))?;

    Ok(format_report(&outcome.report, &config.output))
}

fn apply_overrides(settings: &mut settings::Settings, config: &Config) -> Result<()> {
    if let Some(size) = config.min_font_size {
        settings.min_font_size = positive("--min-font-size", size)?;
    }
    if let Some(size) = config.max_font_size {
        settings.max_font_size = positive("--max-font-size", size)?;
    }
    if let Some(padding) = config.padding {
        if !padding.is_finite() || padding < 0.0 {
            return Err(anyhow!("--padding must be zero or positive (got {})", padding));
        }
        settings.padding = padding;
    }
    if let Some(lang) = config.lang.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
        settings.target_lang = lang.to_string();
    }
    if let Some(lang) = config
        .source_lang
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
    {
        settings.source_lang = lang.to_string();
    }
    if let Some(model) = config.model.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
        settings.model = model.to_string();
    }
    Ok(())
}

fn positive(flag: &str, value: f32) -> Result<f32> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(anyhow!("{} must be positive (got {})", flag, value))
    }
}

fn build_surface(image: &data::ImageData, settings: &settings::Settings) -> Result<PixmapSurface> {
    let font_path = settings.font_path.as_deref().map(Path::new);
    let font_data = match font_path {
        Some(path) => Some(
            std::fs::read(path)
                .with_context(|| format!("failed to read font: {}", path.display()))?,
        ),
        None => None,
    };
    let db = surface::load_font_database(font_data.as_deref());
    let resolved = surface::resolve_fonts(&db, font_path, &settings.font_families);
    let fonts: Vec<surface::FontMetrics> = match resolved {
        Ok(resolved) => {
            let names: Vec<&str> = resolved.iter().map(|font| font.family.as_str()).collect();
            info!("font: measuring with {}", names.join(", "));
            resolved.into_iter().map(|font| font.metrics).collect()
        }
        Err(err) => {
            warn!("font: {}; falling back to estimated widths", err);
            Vec::new()
        }
    };
    let style = TextStyle {
        color: settings.text_color.clone(),
        font_families: settings.font_families.clone(),
        fonts,
    };
    PixmapSurface::from_image_bytes(&image.bytes, style, Arc::new(db))
}

fn format_report(report: &ReconstructionReport, output: &Path) -> String {
    let mut line = format!(
        "wrote {} (replaced {} region(s), kept {}",
        output.display(),
        report.processed,
        report.skipped
    );
    if report.overflowed > 0 {
        line.push_str(&format!(", {} overflowing", report.overflowed));
    }
    if report.draw_failures > 0 {
        line.push_str(&format!(", {} failed to draw", report.draw_failures));
    }
    line.push(')');
    line
}
