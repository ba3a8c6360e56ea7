use std::path::{Path, PathBuf};

use anyhow::Result;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use clap::Args;
use fs_err as fs;
use lazy_static::lazy_static;
use log::{debug, error, info};
use regex::Regex;
use thiserror::Error;

use crate::{
    commands::extract_urls::read_html, config::Config, html::parse_images, options::Global,
};

lazy_static! {
    static ref DATA_URI: Regex = Regex::new(r"(?s)^data:image/(\w+);base64,(.*)$").unwrap();
}

#[derive(Debug, Args)]
pub struct ExtractInlineOptions {
    /// The HTML document containing base64-encoded images.
    pub html: PathBuf,

    /// The directory to write images into. Defaults to the configured output
    /// directory.
    #[clap(long)]
    pub output: Option<PathBuf>,
}

#[derive(Debug, Error)]
pub enum InlineError {
    #[error("source is not a base64 image data URI")]
    NotDataUri,

    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("could not write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct InlineSummary {
    /// Elements carrying the marker class, saved or not.
    pub matched: usize,
    pub saved: Vec<PathBuf>,
}

pub async fn extract_inline(global: Global, options: ExtractInlineOptions) -> Result<()> {
    let config = Config::load(global.config.as_deref())?;
    let html = read_html(&options.html)?;
    let output = options.output.unwrap_or_else(|| config.output_dir.clone());

    let summary = extract_inline_images(&html, &output, &config)?;

    info!(
        "found {} matching images, saved {} to {}",
        summary.matched,
        summary.saved.len(),
        output.display()
    );

    Ok(())
}

/// Saves every base64 image whose `class` is exactly the configured marker as
/// `<prefix><index>.<format>`, where the index counts matching elements from
/// zero.
pub fn extract_inline_images(html: &str, output: &Path, config: &Config) -> Result<InlineSummary> {
    fs::create_dir_all(output)?;

    let marked: Vec<Option<String>> = parse_images(html)
        .into_iter()
        .filter(|image| image.class.as_deref() == Some(config.inline_marker_class.as_str()))
        .map(|image| image.src)
        .collect();

    let mut summary = InlineSummary {
        matched: marked.len(),
        ..InlineSummary::default()
    };

    for (index, src) in marked.iter().enumerate() {
        let Some(src) = src else {
            debug!("image {} has no source, skipping", index);
            continue;
        };

        match save_data_uri(src, index, output, config) {
            Ok(path) => {
                info!("saved {}", path.display());
                summary.saved.push(path);
            }
            Err(InlineError::NotDataUri) => {
                debug!("image {} is not an inline base64 image, skipping", index);
            }
            Err(err) => error!("failed to extract image {}: {}", index, err),
        }
    }

    Ok(summary)
}

/// Splits `data:image/<format>;base64,<payload>` into the format and the
/// decoded bytes.
pub fn decode_data_uri(src: &str) -> Result<(String, Vec<u8>), InlineError> {
    let captures = DATA_URI.captures(src).ok_or(InlineError::NotDataUri)?;

    let payload: String = captures[2]
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();
    let bytes = STANDARD.decode(payload)?;

    Ok((captures[1].to_owned(), bytes))
}

fn save_data_uri(
    src: &str,
    index: usize,
    output: &Path,
    config: &Config,
) -> Result<PathBuf, InlineError> {
    let (format, bytes) = decode_data_uri(src)?;

    let path = output.join(format!("{}{}.{}", config.inline_file_prefix, index, format));
    fs::write(&path, bytes).map_err(|source| InlineError::Write {
        path: path.clone(),
        source,
    })?;

    Ok(path)
}
