use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use aws_sdk_bedrockruntime::types::{
    ContentBlock, DocumentBlock, DocumentFormat, DocumentSource, ImageBlock, ImageFormat,
    ImageSource,
};
use aws_smithy_types::Blob;
use base64::prelude::*;

use crate::request_types::{ReferenceImage, ReferenceImageSource};

/// Turns a local file into the Converse content block matching its extension:
/// an image block for picture formats, a document block for the formats the
/// Converse document API accepts.
pub fn content_block_for_file(path: &Path) -> Result<ContentBlock> {
    let extension = file_extension(path)?;
    let bytes = fs::read(path)
        .with_context(|| format!("failed to read attachment {}", path.display()))?;

    if let Ok(format) = image_format_from_extension(&extension) {
        let image = ImageBlock::builder()
            .format(format)
            .source(ImageSource::Bytes(Blob::new(bytes)))
            .build()?;
        return Ok(ContentBlock::Image(image));
    }

    let format = document_format_from_extension(&extension)?;
    let document = DocumentBlock::builder()
        .name(document_name(path))
        .format(format)
        .source(DocumentSource::Bytes(Blob::new(bytes)))
        .build()?;
    Ok(ContentBlock::Document(document))
}

/// Turns a local png/jpeg into the base64 reference image a Nova Reel
/// text-to-video request accepts.
pub fn reference_image_for_file(path: &Path) -> Result<ReferenceImage> {
    let extension = file_extension(path)?;
    let format = match extension.as_str() {
        "png" => "png",
        "jpeg" | "jpg" => "jpeg",
        other => bail!("video reference images must be .png or .jpeg, got .{other}"),
    };
    let bytes = fs::read(path)
        .with_context(|| format!("failed to read reference image {}", path.display()))?;
    Ok(ReferenceImage {
        format: format.to_owned(),
        source: ReferenceImageSource {
            bytes: BASE64_STANDARD.encode(bytes),
        },
    })
}

fn file_extension(path: &Path) -> Result<String> {
    let extension = path
        .extension()
        .and_then(|extension| extension.to_str())
        .with_context(|| format!("attachment {} has no file extension", path.display()))?;
    Ok(extension.to_lowercase())
}

/// Document names sent to Converse may only contain alphanumerics, spaces,
/// hyphens, parentheses and brackets.
fn document_name(path: &Path) -> String {
    let stem = path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("attachment");
    stem.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, ' ' | '-' | '(' | ')' | '[' | ']') {
                c
            } else {
                '-'
            }
        })
        .collect()
}

fn image_format_from_extension(extension: &str) -> Result<ImageFormat> {
    match extension {
        "png" => Ok(ImageFormat::Png),
        "jpeg" | "jpg" => Ok(ImageFormat::Jpeg),
        "gif" => Ok(ImageFormat::Gif),
        "webp" => Ok(ImageFormat::Webp),
        _ => bail!("no image format for extension: {extension}"),
    }
}

fn document_format_from_extension(extension: &str) -> Result<DocumentFormat> {
    match extension {
        "pdf" => Ok(DocumentFormat::Pdf),
        "csv" => Ok(DocumentFormat::Csv),
        "doc" => Ok(DocumentFormat::Doc),
        "docx" => Ok(DocumentFormat::Docx),
        "html" => Ok(DocumentFormat::Html),
        "md" => Ok(DocumentFormat::Md),
        "txt" => Ok(DocumentFormat::Txt),
        "xls" => Ok(DocumentFormat::Xls),
        "xlsx" => Ok(DocumentFormat::Xlsx),
        _ => bail!("unsupported attachment extension: {extension}"),
    }
}
