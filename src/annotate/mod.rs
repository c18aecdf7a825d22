use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use serde_json::{Value, json};
use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use tera::{Context as TeraContext, Tera};

use crate::reconstruct::AnnotatedRegion;

mod gemini;
mod retry;

pub use gemini::{DEFAULT_MODEL, GeminiAnnotator, resolve_key};

pub const TOOL_NAME: &str = "deliver_regions";

const SYSTEM_PROMPT_TEMPLATE: &str = include_str!("prompts/system_prompt.tera");

#[derive(Debug, Clone)]
pub struct AnnotationRequest {
    pub image_bytes: Vec<u8>,
    pub image_mime: String,
    pub source_lang: String,
    pub target_lang: String,
}

#[derive(Debug, Clone)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

pub type AnnotateFuture = Pin<Box<dyn Future<Output = Result<Vec<AnnotatedRegion>>> + Send>>;

/// Source of annotated regions for one image.
pub trait Annotator {
    fn annotate(&self, request: AnnotationRequest) -> AnnotateFuture;
}

/// Serves a fixed list of regions, e.g. loaded from a previous run.
#[derive(Debug, Clone)]
pub struct StaticAnnotator {
    regions: Vec<AnnotatedRegion>,
}

impl StaticAnnotator {
    pub fn new(regions: Vec<AnnotatedRegion>) -> Self {
        Self { regions }
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        Ok(Self::new(load_regions(path)?))
    }
}

impl Annotator for StaticAnnotator {
    fn annotate(&self, _request: AnnotationRequest) -> AnnotateFuture {
        let regions = self.regions.clone();
        Box::pin(async move { Ok(regions) })
    }
}

pub fn tool_spec() -> ToolSpec {
    let parameters = json!({
        "type": "object",
        "properties": {
            "regions": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "originalText": {"type": "string"},
                        "translatedText": {"type": "string"},
                        "box_2d": {
                            "type": "array",
                            "items": {"type": "number"}
                        },
                        "category": {"type": "string", "enum": ["TEXT", "TECHNICAL"]}
                    },
                    "required": ["originalText", "translatedText", "box_2d", "category"]
                }
            }
        },
        "required": ["regions"]
    });
    ToolSpec {
        name: TOOL_NAME.to_string(),
        description: "Return every text block of the drawing with its translation.".to_string(),
        parameters,
    }
}

pub fn render_system_prompt(request: &AnnotationRequest, tool_name: &str) -> Result<String> {
    let mut context = TeraContext::new();
    let source_lang = request.source_lang.trim();
    let source_lang = if source_lang.is_empty() {
        "auto"
    } else {
        source_lang
    };
    context.insert("source_lang", source_lang);
    context.insert("target_lang", request.target_lang.trim());
    context.insert("tool_name", tool_name);
    Tera::one_off(SYSTEM_PROMPT_TEMPLATE, &context, false)
        .with_context(|| "failed to render annotation prompt")
}

#[derive(Debug, Deserialize)]
struct ToolArgs {
    regions: Vec<AnnotatedRegion>,
}

pub fn parse_tool_args(value: Value) -> Result<Vec<AnnotatedRegion>> {
    let args: ToolArgs = serde_json::from_value(value)
        .map_err(|err| anyhow!("invalid {} arguments: {}", TOOL_NAME, err))?;
    Ok(args.regions)
}

/// Reads regions from JSON: either a bare array or `{"regions": [...]}`.
pub fn load_regions(path: &Path) -> Result<Vec<AnnotatedRegion>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read regions: {}", path.display()))?;
    let value: Value = serde_json::from_str(&content)
        .with_context(|| format!("failed to parse regions: {}", path.display()))?;
    let regions = if value.is_array() {
        serde_json::from_value(value)
            .with_context(|| format!("failed to parse regions: {}", path.display()))?
    } else {
        parse_tool_args(value)?
    };
    Ok(regions)
}

pub fn save_regions(path: &Path, regions: &[AnnotatedRegion]) -> Result<()> {
    let json = serde_json::to_vec_pretty(regions)?;
    std::fs::write(path, json)
        .with_context(|| format!("failed to write regions: {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconstruct::Category;
    use insta::assert_json_snapshot;
    use tempfile::tempdir;

    fn request(source_lang: &str) -> AnnotationRequest {
        AnnotationRequest {
            image_bytes: Vec::new(),
            image_mime: "image/png".to_string(),
            source_lang: source_lang.to_string(),
            target_lang: "zh".to_string(),
        }
    }

    #[test]
    fn tool_args_parse_into_regions() {
        let args = json!({
            "regions": [
                {
                    "originalText": "Material: Steel",
                    "translatedText": "材质：钢",
                    "box_2d": [0, 0, 100, 1000],
                    "category": "TEXT"
                },
                {
                    "originalText": "Ø12 H7",
                    "translatedText": "Ø12 H7",
                    "box_2d": [500, 250, 540, 330],
                    "category": "TECHNICAL"
                }
            ]
        });
        let regions = parse_tool_args(args).expect("parse");
        assert_json_snapshot!(regions, @r###"
        [
          {
            "originalText": "Material: Steel",
            "translatedText": "材质：钢",
            "box_2d": [
              0.0,
              0.0,
              100.0,
              1000.0
            ],
            "category": "TEXT"
          },
          {
            "originalText": "Ø12 H7",
            "translatedText": "Ø12 H7",
            "box_2d": [
              500.0,
              250.0,
              540.0,
              330.0
            ],
            "category": "TECHNICAL"
          }
        ]
        "###);
    }

    #[test]
    fn unknown_category_is_rejected() {
        let args = json!({
            "regions": [{
                "originalText": "a",
                "translatedText": "b",
                "box_2d": [0, 0, 1, 1],
                "category": "LOGO"
            }]
        });
        let err = parse_tool_args(args).unwrap_err();
        assert!(err.to_string().contains(TOOL_NAME));
    }

    #[test]
    fn prompt_mentions_languages_and_tool() {
        let prompt = render_system_prompt(&request("auto"), TOOL_NAME).expect("prompt");
        assert!(prompt.contains("\"zh\""));
        assert!(prompt.contains("Detect the source language"));
        assert!(prompt.contains("`deliver_regions`"));

        let prompt = render_system_prompt(&request("de"), TOOL_NAME).expect("prompt");
        assert!(prompt.contains("The source language is \"de\"."));
    }

    #[test]
    fn tool_spec_requires_every_region_field() {
        let spec = tool_spec();
        let required = &spec.parameters["properties"]["regions"]["items"]["required"];
        assert_eq!(
            required,
            &json!(["originalText", "translatedText", "box_2d", "category"])
        );
    }

    #[test]
    fn regions_round_trip_through_files() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("regions.json");
        let regions = vec![AnnotatedRegion {
            original_text: "Note".to_string(),
            translated_text: "注".to_string(),
            bbox: [10.0, 20.0, 30.0, 40.0].into(),
            category: Category::Text,
        }];
        save_regions(&path, &regions).expect("save");
        assert_eq!(load_regions(&path).expect("load"), regions);

        let wrapped = dir.path().join("wrapped.json");
        std::fs::write(
            &wrapped,
            r#"{"regions":[{"originalText":"Note","translatedText":"注","box":[10,20,30,40],"category":"TEXT"}]}"#,
        )
        .expect("write");
        assert_eq!(load_regions(&wrapped).expect("load"), regions);
    }

    #[tokio::test]
    async fn static_annotator_returns_its_regions() {
        let regions = vec![AnnotatedRegion {
            original_text: "A".to_string(),
            translated_text: "B".to_string(),
            bbox: [0.0, 0.0, 1.0, 1.0].into(),
            category: Category::Technical,
        }];
        let annotator = StaticAnnotator::new(regions.clone());
        let got = annotator.annotate(request("auto")).await.expect("annotate");
        assert_eq!(got, regions);
    }
}
