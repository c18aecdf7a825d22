use anyhow::{Context, Result, anyhow};
use image::ImageFormat;
use std::path::Path;

pub const PNG_MIME: &str = "image/png";

#[derive(Debug, Clone)]
pub struct ImageData {
    pub bytes: Vec<u8>,
    pub mime: String,
}

pub fn load_image(path: &Path) -> Result<ImageData> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("failed to read image: {}", path.display()))?;
    let mime = detect_image_mime(&bytes, path)?;
    Ok(ImageData { bytes, mime })
}

pub fn detect_image_mime(bytes: &[u8], path: &Path) -> Result<String> {
    if let Some(kind) = infer::get(bytes) {
        let detected = kind.mime_type();
        if !detected.starts_with("image/") {
            return Err(anyhow!("expected image data (detected '{}')", detected));
        }
        return Ok(detected.to_string());
    }

    if let Some(mime) = extension_lower(path).as_deref().and_then(mime_from_extension) {
        return Ok(mime.to_string());
    }

    Err(anyhow!("unable to detect image type for '{}'", path.display()))
}

/// Encoder for the output path, chosen by extension.
pub fn output_format_for_path(path: &Path) -> Result<ImageFormat> {
    let ext = extension_lower(path)
        .ok_or_else(|| anyhow!("output path has no extension: {}", path.display()))?;
    mime_from_extension(&ext)
        .and_then(image_format_from_mime)
        .ok_or_else(|| anyhow!("unsupported output image type '.{}'", ext))
}

pub fn image_format_from_mime(mime: &str) -> Option<ImageFormat> {
    match mime {
        "image/png" => Some(ImageFormat::Png),
        "image/jpeg" | "image/jpg" => Some(ImageFormat::Jpeg),
        "image/gif" => Some(ImageFormat::Gif),
        "image/webp" => Some(ImageFormat::WebP),
        "image/bmp" => Some(ImageFormat::Bmp),
        "image/tiff" => Some(ImageFormat::Tiff),
        _ => None,
    }
}

fn extension_lower(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|value| value.to_str())
        .map(|value| value.to_lowercase())
}

fn mime_from_extension(ext: &str) -> Option<&'static str> {
    match ext {
        "png" => Some(PNG_MIME),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "webp" => Some("image/webp"),
        "gif" => Some("image/gif"),
        "bmp" => Some("image/bmp"),
        "tiff" | "tif" => Some("image/tiff"),
        _ => None,
    }
}
