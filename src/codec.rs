//! Thin layer over the `image` and `webp` crates: decoding, measuring and
//! re-encoding images.

use std::io::{self, Cursor};
use std::path::Path;

use clap::ValueEnum;
use image::{
    codecs::{
        jpeg::JpegEncoder,
        png::{CompressionType, FilterType as PngFilterType, PngEncoder},
    },
    imageops::FilterType,
    DynamicImage, ImageReader,
};
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Webp,
    Jpeg,
    Png,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Webp => "webp",
            OutputFormat::Jpeg => "jpg",
            OutputFormat::Png => "png",
        }
    }

    /// Whether a file with this extension is already encoded in this format.
    pub fn matches_extension(self, extension: &str) -> bool {
        let extension = extension.to_ascii_lowercase();
        match self {
            OutputFormat::Webp => extension == "webp",
            OutputFormat::Jpeg => extension == "jpg" || extension == "jpeg",
            OutputFormat::Png => extension == "png",
        }
    }
}

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("could not decode image: {0}")]
    Image(#[from] image::ImageError),

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("WebP encoder failed: {0}")]
    WebpEncode(String),
}

pub fn open(path: &Path) -> Result<DynamicImage, CodecError> {
    Ok(ImageReader::open(path)?.with_guessed_format()?.decode()?)
}

/// Reads width and height from the image header without decoding pixels.
pub fn dimensions(bytes: &[u8]) -> Result<(u32, u32), CodecError> {
    Ok(ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()?
        .into_dimensions()?)
}

pub fn file_dimensions(path: &Path) -> Result<(u32, u32), CodecError> {
    Ok(ImageReader::open(path)?
        .with_guessed_format()?
        .into_dimensions()?)
}

/// Height that keeps the aspect ratio when scaling to `target_width`.
pub fn scaled_height(width: u32, height: u32, target_width: u32) -> u32 {
    if width == 0 {
        return height;
    }

    let scaled = f64::from(target_width) * f64::from(height) / f64::from(width);
    (scaled.round() as u32).max(1)
}

pub fn resize_to_width(image: &DynamicImage, target_width: u32) -> DynamicImage {
    let height = scaled_height(image.width(), image.height(), target_width);
    image.resize_exact(target_width, height, FilterType::Lanczos3)
}

/// Encodes `image` with the given quality (ignored for PNG, which always uses
/// the strongest compression).
pub fn encode(
    image: &DynamicImage,
    format: OutputFormat,
    quality: u8,
) -> Result<Vec<u8>, CodecError> {
    let mut buffer = Vec::new();

    match format {
        OutputFormat::Webp => {
            let rgba = image.to_rgba8();
            let encoder = webp::Encoder::from_rgba(&rgba, rgba.width(), rgba.height());

            let mut config = webp::WebPConfig::new()
                .map_err(|_| CodecError::WebpEncode("invalid encoder config".to_owned()))?;
            config.quality = f32::from(quality.min(100));
            // slowest method, smallest output
            config.method = 6;

            let encoded = encoder
                .encode_advanced(&config)
                .map_err(|err| CodecError::WebpEncode(format!("{:?}", err)))?;
            buffer.extend_from_slice(&encoded);
        }
        OutputFormat::Jpeg => {
            let encoder = JpegEncoder::new_with_quality(&mut buffer, quality.clamp(1, 100));
            DynamicImage::ImageRgb8(image.to_rgb8()).write_with_encoder(encoder)?;
        }
        OutputFormat::Png => {
            let encoder = PngEncoder::new_with_quality(
                &mut buffer,
                CompressionType::Best,
                PngFilterType::Adaptive,
            );
            image.write_with_encoder(encoder)?;
        }
    }

    Ok(buffer)
}
