use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::reconstruct::{ReconstructionConfig, SamplingConfig};

const DEFAULT_SETTINGS_TOML: &str = include_str!("../settings.toml");

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub min_font_size: f32,
    pub max_font_size: f32,
    pub padding: f32,
    pub brightness_threshold: f32,
    pub strip_thickness: u32,
    pub text_color: String,
    pub font_families: Vec<String>,
    pub font_path: Option<String>,
    pub model: String,
    pub target_lang: String,
    pub source_lang: String,
}

impl Default for Settings {
    fn default() -> Self {
        let reconstruct = ReconstructionConfig::default();
        Self {
            min_font_size: reconstruct.min_font_size,
            max_font_size: reconstruct.max_font_size,
            padding: reconstruct.padding,
            brightness_threshold: reconstruct.sampling.brightness_threshold,
            strip_thickness: reconstruct.sampling.strip_thickness,
            text_color: "#000000".to_string(),
            font_families: vec!["monospace".to_string(), "sans-serif".to_string()],
            font_path: None,
            model: crate::annotate::DEFAULT_MODEL.to_string(),
            target_lang: "zh".to_string(),
            source_lang: "auto".to_string(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct SettingsFile {
    reconstruct: Option<ReconstructSettings>,
    render: Option<RenderSettings>,
    annotate: Option<AnnotateSettings>,
}

#[derive(Debug, Default, Deserialize)]
struct ReconstructSettings {
    min_font_size: Option<f32>,
    max_font_size: Option<f32>,
    padding: Option<f32>,
    brightness_threshold: Option<f32>,
    strip_thickness: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct RenderSettings {
    text_color: Option<String>,
    font_families: Option<Vec<String>>,
    font_path: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct AnnotateSettings {
    model: Option<String>,
    target_lang: Option<String>,
    source_lang: Option<String>,
}

pub fn load_settings(extra_path: Option<&Path>) -> Result<Settings> {
    let mut settings = Settings::default();
    let defaults: SettingsFile =
        toml::from_str(DEFAULT_SETTINGS_TOML).with_context(|| "failed to parse default settings")?;
    settings.merge(defaults);
    ensure_home_settings_file()?;

    let mut ordered_paths = vec![
        PathBuf::from("settings.toml"),
        PathBuf::from("settings.local.toml"),
    ];

    if let Some(home) = home_dir() {
        ordered_paths.push(home.join("settings.toml"));
        ordered_paths.push(home.join("settings.local.toml"));
    }

    if let Some(extra) = extra_path {
        if !extra.exists() {
            return Err(anyhow!("settings file not found: {}", extra.display()));
        }
        ordered_paths.push(extra.to_path_buf());
    }

    for path in ordered_paths {
        if path.exists() {
            let content = fs::read_to_string(&path)
                .with_context(|| format!("failed to read settings: {}", path.display()))?;
            let parsed: SettingsFile = toml::from_str(&content)
                .with_context(|| format!("failed to parse settings: {}", path.display()))?;
            settings.merge(parsed);
        }
    }

    Ok(settings)
}

impl Settings {
    pub fn reconstruction_config(&self) -> ReconstructionConfig {
        ReconstructionConfig {
            min_font_size: self.min_font_size,
            max_font_size: self.max_font_size,
            padding: self.padding,
            sampling: SamplingConfig {
                brightness_threshold: self.brightness_threshold,
                strip_thickness: self.strip_thickness,
            },
        }
    }

    fn merge(&mut self, incoming: SettingsFile) {
        if let Some(reconstruct) = incoming.reconstruct {
            if let Some(size) = reconstruct.min_font_size.filter(|v| v.is_finite() && *v > 0.0) {
                self.min_font_size = size;
            }
            if let Some(size) = reconstruct.max_font_size.filter(|v| v.is_finite() && *v > 0.0) {
                self.max_font_size = size;
            }
            if let Some(padding) = reconstruct.padding.filter(|v| v.is_finite() && *v >= 0.0) {
                self.padding = padding;
            }
            if let Some(threshold) = reconstruct
                .brightness_threshold
                .filter(|v| v.is_finite() && *v >= 0.0)
            {
                self.brightness_threshold = threshold;
            }
            if let Some(thickness) = reconstruct.strip_thickness.filter(|v| *v > 0) {
                self.strip_thickness = thickness;
            }
        }
        if let Some(render) = incoming.render {
            if let Some(color) = render.text_color.filter(|v| !v.trim().is_empty()) {
                self.text_color = color;
            }
            if let Some(families) = render.font_families {
                let families: Vec<String> = families
                    .into_iter()
                    .map(|family| family.trim().to_string())
                    .filter(|family| !family.is_empty())
                    .collect();
                if !families.is_empty() {
                    self.font_families = families;
                }
            }
            if let Some(path) = render.font_path.filter(|v| !v.trim().is_empty()) {
                self.font_path = Some(path);
            }
        }
        if let Some(annotate) = incoming.annotate {
            if let Some(model) = annotate.model.filter(|v| !v.trim().is_empty()) {
                self.model = model;
            }
            if let Some(lang) = annotate.target_lang.filter(|v| !v.trim().is_empty()) {
                self.target_lang = lang;
            }
            if let Some(lang) = annotate.source_lang.filter(|v| !v.trim().is_empty()) {
                self.source_lang = lang;
            }
        }
    }
}

fn ensure_home_settings_file() -> Result<()> {
    let Some(home) = home_dir() else {
        return Ok(());
    };
    fs::create_dir_all(&home)
        .with_context(|| format!("failed to create settings directory: {}", home.display()))?;
    let path = home.join("settings.toml");
    if !path.exists() {
        fs::write(&path, DEFAULT_SETTINGS_TOML)
            .with_context(|| format!("failed to write settings: {}", path.display()))?;
    }
    Ok(())
}

fn home_dir() -> Option<PathBuf> {
    std::env::var("HOME").ok().and_then(|home| {
        let home = home.trim();
        if home.is_empty() {
            None
        } else {
            Some(Path::new(home).join(".drawing-translator"))
        }
    })
}
