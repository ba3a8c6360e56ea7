use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Args;
use fs_err as fs;
use log::{error, info};
use reqwest::Url;
use thiserror::Error;

use crate::{
    commands::extract_urls::{extract_by_markup, read_html, report_filtered},
    config::Config,
    fetch::{FetchError, HttpFetcher, ImageFetcher},
    options::Global,
};

const KNOWN_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "webp", "gif", "bmp", "avif", "tiff", "svg",
];

const FALLBACK_EXTENSION: &str = "jpg";

#[derive(Debug, Args)]
pub struct DownloadOptions {
    /// URLs to download.
    #[clap(conflicts_with_all(["from_json", "from_html"]))]
    pub urls: Vec<String>,

    /// Read URLs from a JSON array of strings, like the one printed by
    /// `extract-urls`.
    #[clap(long, conflicts_with("from_html"))]
    pub from_json: Option<PathBuf>,

    /// Extract URLs from an HTML document first, filtering short images by
    /// their declared height.
    #[clap(long)]
    pub from_html: Option<PathBuf>,

    /// The directory to save images into. Defaults to the configured output
    /// directory.
    #[clap(long)]
    pub output: Option<PathBuf>,
}

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("could not write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// What happened to a single URL.
#[derive(Debug)]
pub struct DownloadResult {
    pub url: String,
    pub outcome: Result<PathBuf, DownloadError>,
}

impl DownloadResult {
    pub fn succeeded(&self) -> bool {
        self.outcome.is_ok()
    }
}

pub async fn download(global: Global, options: DownloadOptions) -> Result<()> {
    let config = Config::load(global.config.as_deref())?;
    let urls = collect_urls(&options, &config)?;

    if urls.is_empty() {
        info!("no image URLs to download");
        return Ok(());
    }

    let output = options.output.unwrap_or_else(|| config.output_dir.clone());
    let fetcher = HttpFetcher::new(&config)?;

    let results = download_all(&urls, &output, &config, &fetcher).await?;
    let succeeded = results.iter().filter(|result| result.succeeded()).count();

    info!("downloaded {}/{} images", succeeded, results.len());

    for result in results.iter().filter(|result| !result.succeeded()) {
        log::warn!("not downloaded: {}", result.url);
    }

    Ok(())
}

fn collect_urls(options: &DownloadOptions, config: &Config) -> Result<Vec<String>> {
    if let Some(path) = &options.from_json {
        if !path.is_file() {
            bail!("URL list {} does not exist", path.display());
        }

        let contents = fs::read_to_string(path)?;
        let urls = serde_json::from_str(&contents)
            .with_context(|| format!("{} is not a JSON array of strings", path.display()))?;
        return Ok(urls);
    }

    if let Some(path) = &options.from_html {
        let html = read_html(path)?;
        let extraction = extract_by_markup(&html, config);
        report_filtered(&extraction, config);
        return Ok(extraction.urls);
    }

    Ok(options.urls.clone())
}

/// Downloads every URL into `dir`, one at a time. Only failing to create `dir`
/// stops the batch; every other failure is recorded against its URL.
pub async fn download_all(
    urls: &[String],
    dir: &Path,
    config: &Config,
    fetcher: &dyn ImageFetcher,
) -> Result<Vec<DownloadResult>> {
    fs::create_dir_all(dir)?;

    let mut results = Vec::with_capacity(urls.len());

    for (index, url) in urls.iter().enumerate() {
        info!("downloading {}/{}: {}", index + 1, urls.len(), url);

        let outcome = download_one(url, index + 1, dir, config, fetcher).await;
        match &outcome {
            Ok(path) => info!("saved {}", path.display()),
            Err(err) => error!("failed to download {}: {}", url, err),
        }

        results.push(DownloadResult {
            url: url.clone(),
            outcome,
        });
    }

    Ok(results)
}

async fn download_one(
    url: &str,
    sequence: usize,
    dir: &Path,
    config: &Config,
    fetcher: &dyn ImageFetcher,
) -> Result<PathBuf, DownloadError> {
    let image = fetcher.fetch(url, config.download_timeout()).await?;

    let name = file_name_for(url, sequence, image.content_type.as_deref());
    let path = dir.join(name);

    fs::write(&path, &image.bytes).map_err(|source| DownloadError::Write {
        path: path.clone(),
        source,
    })?;

    Ok(path)
}

/// The last path segment of `url` if it looks like an image file name,
/// otherwise `image_<sequence>.<ext>` with the extension taken from the
/// response's content type.
pub fn file_name_for(url: &str, sequence: usize, content_type: Option<&str>) -> String {
    if let Some(name) = url_file_name(url) {
        if has_known_extension(&name) {
            return name;
        }
    }

    format!(
        "image_{}.{}",
        sequence,
        extension_for_content_type(content_type.unwrap_or_default())
    )
}

fn url_file_name(url: &str) -> Option<String> {
    let url = Url::parse(url).ok()?;
    let name = url.path_segments()?.last()?;

    if name.is_empty() {
        None
    } else {
        Some(name.to_owned())
    }
}

fn has_known_extension(name: &str) -> bool {
    Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| KNOWN_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

fn extension_for_content_type(content_type: &str) -> &'static str {
    let content_type = content_type.to_ascii_lowercase();

    if content_type.contains("jpeg") || content_type.contains("jpg") {
        "jpg"
    } else if content_type.contains("png") {
        "png"
    } else if content_type.contains("webp") {
        "webp"
    } else if content_type.contains("gif") {
        "gif"
    } else {
        FALLBACK_EXTENSION
    }
}
