use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use clap::Args;
use fs_err as fs;
use log::info;

use crate::{
    codec,
    config::Config,
    fetch::{HttpFetcher, ImageFetcher},
    html::{parse_images, ImgElement},
    options::Global,
};

#[derive(Debug, Args)]
pub struct ExtractUrlsOptions {
    /// The HTML document to read image references from.
    pub html: PathBuf,

    /// Determine each image's height by downloading it instead of trusting
    /// the `height` attribute and inline style. Slower, but catches tracking
    /// pixels that don't declare their size.
    #[clap(long)]
    pub probe: bool,
}

/// Absolute image URLs in document order, plus how many were dropped for
/// being too short.
#[derive(Debug, Default, PartialEq)]
pub struct Extraction {
    pub urls: Vec<String>,
    pub filtered: usize,
}

pub async fn extract_urls(global: Global, options: ExtractUrlsOptions) -> Result<()> {
    let config = Config::load(global.config.as_deref())?;
    let html = read_html(&options.html)?;

    let extraction = if options.probe {
        let fetcher = HttpFetcher::new(&config)?;
        extract_by_probing(&html, &config, &fetcher).await
    } else {
        extract_by_markup(&html, &config)
    };

    report_filtered(&extraction, &config);
    info!("found {} image URLs", extraction.urls.len());

    println!("{}", serde_json::to_string_pretty(&extraction.urls)?);

    Ok(())
}

pub fn read_html(path: &Path) -> Result<String> {
    if !path.is_file() {
        bail!("HTML file {} does not exist", path.display());
    }

    Ok(fs::read_to_string(path)?)
}

pub fn report_filtered(extraction: &Extraction, config: &Config) {
    if extraction.filtered > 0 {
        info!(
            "filtered out {} images shorter than {}px",
            extraction.filtered, config.min_height
        );
    }
}

/// Filters on the height declared in the markup. Images that don't declare a
/// height are kept.
pub fn extract_by_markup(html: &str, config: &Config) -> Extraction {
    let mut extraction = Extraction::default();

    for image in parse_images(html) {
        let Some(src) = image.source() else {
            continue;
        };

        if is_too_short(image.declared_height(), config) {
            log_filtered(&image, src);
            extraction.filtered += 1;
            continue;
        }

        extraction.urls.push(absolute_url(src, &config.host_prefix));
    }

    extraction
}

/// Filters on the real pixel height of each image, fetched over the network.
/// Images that can't be fetched or decoded are kept.
pub async fn extract_by_probing(
    html: &str,
    config: &Config,
    fetcher: &dyn ImageFetcher,
) -> Extraction {
    let candidates: Vec<String> = parse_images(html)
        .iter()
        .filter_map(ImgElement::source)
        .map(|src| absolute_url(src, &config.host_prefix))
        .collect();

    let mut extraction = Extraction::default();

    for url in candidates {
        let height = probe_height(&url, config, fetcher).await;

        if is_too_short(height.map(f64::from), config) {
            info!("filtered image {}px tall: {}", height.unwrap_or_default(), url);
            extraction.filtered += 1;
            continue;
        }

        extraction.urls.push(url);
    }

    extraction
}

async fn probe_height(url: &str, config: &Config, fetcher: &dyn ImageFetcher) -> Option<u32> {
    let fetched = match fetcher.fetch(url, config.probe_timeout()).await {
        Ok(fetched) => fetched,
        Err(err) => {
            log::warn!("could not probe {}: {}", url, err);
            return None;
        }
    };

    match codec::dimensions(&fetched.bytes) {
        Ok((width, height)) => {
            log::debug!("{} is {}x{}", url, width, height);
            Some(height)
        }
        Err(err) => {
            log::warn!("could not read dimensions of {}: {}", url, err);
            None
        }
    }
}

fn is_too_short(height: Option<f64>, config: &Config) -> bool {
    matches!(height, Some(height) if height < config.min_height)
}

fn log_filtered(image: &ImgElement, src: &str) {
    info!(
        "filtered image {}px tall: {}",
        image.declared_height().unwrap_or_default(),
        src
    );
}

/// Turns protocol-relative and root-relative sources into `https://` URLs.
/// Anything else is assumed to be absolute already.
pub fn absolute_url(src: &str, host_prefix: &str) -> String {
    if src.starts_with("//") {
        format!("https:{}", src)
    } else if src.starts_with('/') {
        format!("{}{}", host_prefix.trim_end_matches('/'), src)
    } else {
        src.to_owned()
    }
}
