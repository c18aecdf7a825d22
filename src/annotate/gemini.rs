use anyhow::{Result, anyhow};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::info;

use super::retry::{
    RATE_LIMIT_BASE_DELAY, RATE_LIMIT_MAX_RETRIES, is_rate_limited, retry_after, wait_with_backoff,
};
use super::{AnnotateFuture, AnnotationRequest, Annotator, TOOL_NAME, parse_tool_args};
use super::{render_system_prompt, tool_spec};
use crate::reconstruct::AnnotatedRegion;

const BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

/// Annotates drawings with the Gemini `generateContent` API using a forced
/// function call.
#[derive(Debug, Clone)]
pub struct GeminiAnnotator {
    key: String,
    model: String,
}

impl GeminiAnnotator {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            model: DEFAULT_MODEL.to_string(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        let model = model.into();
        let model = model.trim();
        let model = model.strip_prefix("gemini:").unwrap_or(model);
        if !model.is_empty() {
            self.model = model.to_string();
        }
        self
    }

    fn request_body(&self, request: &AnnotationRequest) -> Result<Value> {
        let tool = tool_spec();
        let system_prompt = render_system_prompt(request, &tool.name)?;
        let encoded = BASE64.encode(&request.image_bytes);
        Ok(json!({
            "contents": [
                {
                    "role": "user",
                    "parts": [
                        {"text": format!("Translate the text of this drawing into {}.", request.target_lang)},
                        {
                            "inline_data": {
                                "mime_type": request.image_mime,
                                "data": encoded
                            }
                        }
                    ]
                }
            ],
            "systemInstruction": {"parts": [{"text": system_prompt}]},
            "tools": [
                {
                    "function_declarations": [
                        {
                            "name": tool.name,
                            "description": tool.description,
                            "parameters": tool.parameters
                        }
                    ]
                }
            ],
            "tool_config": {
                "function_calling_config": {
                    "mode": "ANY",
                    "allowed_function_names": [tool.name]
                }
            }
        }))
    }
}

impl Annotator for GeminiAnnotator {
    fn annotate(&self, request: AnnotationRequest) -> AnnotateFuture {
        let this = self.clone();
        Box::pin(async move {
            let body = this.request_body(&request)?;
            let client = reqwest::Client::new();
            let url = format!("{}/{}:generateContent", BASE_URL, this.model);
            info!(
                "annotate: requesting regions from {} ({} bytes, {})",
                this.model,
                request.image_bytes.len(),
                request.image_mime
            );

            let mut attempt = 0usize;
            let mut delay = RATE_LIMIT_BASE_DELAY;
            loop {
                attempt += 1;
                let response = client
                    .post(&url)
                    .header("x-goog-api-key", this.key.clone())
                    .json(&body)
                    .send()
                    .await?;

                let status = response.status();
                let retry_after = retry_after(response.headers());
                let text = response.text().await.unwrap_or_default();
                if status.is_success() {
                    let regions = extract_regions(&text, TOOL_NAME)?;
                    info!("annotate: received {} region(s)", regions.len());
                    return Ok(regions);
                }
                if is_rate_limited(status, &text) && attempt < RATE_LIMIT_MAX_RETRIES {
                    delay = wait_with_backoff("Gemini", attempt, delay, retry_after).await;
                    continue;
                }
                return Err(anyhow!(
                    "Gemini API error ({}): {}",
                    status,
                    extract_gemini_error(&text).unwrap_or(text)
                ));
            }
        })
    }
}

/// `--key` first, then `GEMINI_API_KEY`, then `GOOGLE_API_KEY`.
pub fn resolve_key(override_key: Option<&str>) -> Result<String> {
    if let Some(key) = override_key.map(str::trim).filter(|key| !key.is_empty()) {
        return Ok(key.to_string());
    }
    get_env("GEMINI_API_KEY")
        .or_else(|| get_env("GOOGLE_API_KEY"))
        .ok_or_else(|| anyhow!("no API key found (checked --key, GEMINI_API_KEY, GOOGLE_API_KEY)"))
}

fn get_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
}

fn extract_regions(text: &str, tool_name: &str) -> Result<Vec<AnnotatedRegion>> {
    let payload: GeminiResponse = serde_json::from_str(text)
        .map_err(|err| anyhow!("failed to parse Gemini response JSON: {}", err))?;
    let candidate = payload
        .candidates
        .first()
        .and_then(|candidate| candidate.content.as_ref())
        .ok_or_else(|| anyhow!("no candidate returned from Gemini"))?;

    for part in &candidate.parts {
        if let Some(function_call) = &part.function_call
            && function_call.name == tool_name
        {
            return parse_tool_args(function_call.args.clone());
        }
    }

    Err(anyhow!("no tool call returned from Gemini"))
}

fn extract_gemini_error(body: &str) -> Option<String> {
    #[derive(Deserialize)]
    struct ErrorBody {
        error: Option<GeminiError>,
    }

    #[derive(Deserialize)]
    struct GeminiError {
        message: Option<String>,
        status: Option<String>,
        code: Option<i32>,
    }

    let parsed: ErrorBody = serde_json::from_str(body).ok()?;
    let error = parsed.error?;
    let mut parts = Vec::new();
    if let Some(message) = error.message.filter(|value| !value.trim().is_empty()) {
        parts.push(message);
    }
    if let Some(status) = error.status.filter(|value| !value.trim().is_empty()) {
        parts.push(format!("type: {}", status));
    }
    if let Some(code) = error.code {
        parts.push(format!("code: {}", code));
    }
    if parts.is_empty() {
        Some("unknown error".to_string())
    } else {
        Some(parts.join(" | "))
    }
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContent>,
}

#[derive(Debug, Deserialize)]
struct GeminiContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Deserialize)]
struct GeminiPart {
    #[serde(rename = "functionCall")]
    function_call: Option<GeminiFunctionCall>,
}

#[derive(Debug, Deserialize)]
struct GeminiFunctionCall {
    name: String,
    #[serde(default)]
    args: Value,
}
