//! Builtin operation: resize, convert or recompress an image.

use std::io::Cursor;
use std::path::Path;

use anyhow::Context;
use async_trait::async_trait;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat};
use serde_json::{json, Value};
use tracing::info;

use crate::operations::{
    blocking, ensure_parent, opt_str_arg, opt_u64_arg, str_arg, ArgKind, Operation,
    OperationContext, OperationError, Parameter,
};

pub const DEFAULT_QUALITY: u8 = 85;

/// Largest resize target, in pixels. Keeps an RGBA buffer well under the
/// decoder's default 512 MiB allocation limit.
pub const MAX_RESIZE_PIXELS: u64 = 40_000_000;

/// File extensions the matcher and extractor treat as images.
pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "bmp", "webp", "tiff"];

const PARAMETERS: &[Parameter] = &[
    Parameter::required("image_path", ArgKind::Path),
    Parameter::required("output_path", ArgKind::Path),
    Parameter::optional("resize", ArgKind::Json),
    Parameter::optional("format", ArgKind::Text),
    Parameter::optional("quality", ArgKind::Integer),
];

pub struct ImageTransformOperation;

/// `[width, height]`, both non-zero, at most [`MAX_RESIZE_PIXELS`] in area.
fn parse_resize(value: &Value) -> Result<Option<(u32, u32)>, OperationError> {
    let invalid = || {
        OperationError::InvalidArguments(format!(
            "resize must be [width, height] with positive integers, got {value}"
        ))
    };
    match value {
        Value::Null => Ok(None),
        Value::Array(dims) if dims.len() == 2 => {
            let side = |v: &Value| {
                v.as_u64()
                    .filter(|n| *n > 0)
                    .and_then(|n| u32::try_from(n).ok())
                    .ok_or_else(invalid)
            };
            let (width, height) = (side(&dims[0])?, side(&dims[1])?);
            if u64::from(width) * u64::from(height) > MAX_RESIZE_PIXELS {
                return Err(OperationError::InvalidArguments(format!(
                    "resize to {width}x{height} exceeds the {MAX_RESIZE_PIXELS} pixel limit"
                )));
            }
            Ok(Some((width, height)))
        }
        _ => Err(invalid()),
    }
}

/// Output format from the explicit `format` argument, else the output
/// file's extension.
fn output_format(format: Option<&str>, output_path: &Path) -> Result<ImageFormat, OperationError> {
    let name = match format {
        Some(f) => f.to_string(),
        None => output_path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_string)
            .ok_or_else(|| {
                OperationError::InvalidArguments(
                    "no format given and the output path has no extension".into(),
                )
            })?,
    };
    ImageFormat::from_extension(name.to_lowercase())
        .ok_or_else(|| OperationError::InvalidArguments(format!("unsupported image format '{name}'")))
}

fn encode(image: &DynamicImage, format: ImageFormat, quality: u8) -> anyhow::Result<Vec<u8>> {
    let mut buffer = Vec::new();
    if format == ImageFormat::Jpeg {
        let encoder = JpegEncoder::new_with_quality(&mut buffer, quality);
        DynamicImage::ImageRgb8(image.to_rgb8())
            .write_with_encoder(encoder)
            .context("encoding JPEG")?;
    } else {
        image
            .write_to(&mut Cursor::new(&mut buffer), format)
            .with_context(|| format!("encoding {format:?}"))?;
    }
    Ok(buffer)
}

#[async_trait]
impl Operation for ImageTransformOperation {
    fn name(&self) -> &str {
        "image_transform"
    }

    fn description(&self) -> &str {
        "Resize an image (Lanczos3) and/or convert it to another format; JPEG output \
         honours a quality setting (default 85)."
    }

    fn parameters(&self) -> &[Parameter] {
        PARAMETERS
    }

    async fn execute(&self, args: Value, context: &OperationContext) -> Result<Value, OperationError> {
        let image_path = context.path(str_arg(&args, "image_path")?);
        let output_path = context.path(str_arg(&args, "output_path")?);
        let resize = parse_resize(&args["resize"])?;
        let format = output_format(opt_str_arg(&args, "format")?, &output_path)?;
        let quality = match opt_u64_arg(&args, "quality")? {
            None => DEFAULT_QUALITY,
            Some(q @ 1..=100) => q as u8,
            Some(q) => {
                return Err(OperationError::InvalidArguments(format!(
                    "quality must be between 1 and 100, got {q}"
                )))
            }
        };

        blocking(move || {
            let bytes = std::fs::read(&image_path)
                .with_context(|| format!("reading {}", image_path.display()))?;
            let mut image = image::load_from_memory(&bytes)
                .with_context(|| format!("decoding {}", image_path.display()))?;

            if let Some((width, height)) = resize {
                image = image.resize_exact(width, height, FilterType::Lanczos3);
            }

            let encoded = encode(&image, format, quality)?;
            ensure_parent(&output_path)
                .with_context(|| format!("creating parent of {}", output_path.display()))?;
            std::fs::write(&output_path, &encoded)
                .with_context(|| format!("writing {}", output_path.display()))?;

            info!(
                "Image {} → {} ({}x{}, {format:?})",
                image_path.display(),
                output_path.display(),
                image.width(),
                image.height()
            );
            Ok(json!(true))
        })
        .await
    }
}
