//! Tunables shared by every pipeline, loaded from an optional TOML file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use fs_err as fs;
use resolve_path::PathResolveExt;
use serde::Deserialize;

use crate::codec::OutputFormat;

/// Name of the config file picked up from the working directory when
/// `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "imgharvest.toml";

const CHROME_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Scheme and host prepended to root-relative image sources.
    pub host_prefix: String,

    /// Images whose height is known and strictly below this are dropped.
    pub min_height: f64,

    /// Directory that downloads and inline extractions land in, and the
    /// default directory for `normalize` and `inspect`.
    pub output_dir: PathBuf,

    pub user_agent: String,
    pub download_timeout_secs: u64,
    pub probe_timeout_secs: u64,

    pub target_width: u32,
    pub target_format: OutputFormat,
    pub quality: u8,

    pub normalize_extensions: Vec<String>,
    pub inspect_extensions: Vec<String>,

    /// Exact `class` attribute value identifying inline product images.
    pub inline_marker_class: String,
    pub inline_file_prefix: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host_prefix: "https://img.alicdn.com".to_owned(),
            min_height: 5.0,
            output_dir: PathBuf::from("images"),
            user_agent: CHROME_USER_AGENT.to_owned(),
            download_timeout_secs: 30,
            probe_timeout_secs: 10,
            target_width: 790,
            target_format: OutputFormat::Webp,
            quality: 95,
            normalize_extensions: extensions(&["jpg", "jpeg", "png", "webp"]),
            inspect_extensions: extensions(&[
                "jpg", "jpeg", "png", "webp", "avif", "bmp", "tiff", "gif",
            ]),
            inline_marker_class: "descV8-singleImage-image lazyload".to_owned(),
            inline_file_prefix: "img_".to_owned(),
        }
    }
}

fn extensions(list: &[&str]) -> Vec<String> {
    list.iter().map(|ext| ext.to_string()).collect()
}

impl Config {
    /// Loads the config named on the command line, or `imgharvest.toml` from
    /// the working directory if present, or the defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        match explicit {
            Some(path) => {
                let path = path.try_resolve()?;
                Self::read_from_file(&path)
            }
            None => {
                let path = Path::new(DEFAULT_CONFIG_FILE);
                if path.is_file() {
                    Self::read_from_file(path)
                } else {
                    log::debug!("no {} found, using default config", DEFAULT_CONFIG_FILE);
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn read_from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config = Self::from_toml(&contents)
            .with_context(|| format!("invalid config file {}", path.display()))?;

        log::debug!("loaded config from {}", path.display());
        Ok(config)
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_original_scripts() {
        let config = Config::default();

        assert_eq!(config.host_prefix, "https://img.alicdn.com");
        assert_eq!(config.min_height, 5.0);
        assert_eq!(config.target_width, 790);
        assert_eq!(config.target_format, OutputFormat::Webp);
        assert_eq!(config.download_timeout(), Duration::from_secs(30));
        assert_eq!(config.probe_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let config = Config::from_toml(
            r#"
            target_width = 1008
            target_format = "jpeg"
            host_prefix = "https://cdn.example.com"
            "#,
        )
        .unwrap();

        assert_eq!(config.target_width, 1008);
        assert_eq!(config.target_format, OutputFormat::Jpeg);
        assert_eq!(config.host_prefix, "https://cdn.example.com");
        assert_eq!(config.quality, 95);
        assert_eq!(config.output_dir, PathBuf::from("images"));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(Config::from_toml("target_widht = 10").is_err());
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");

        assert!(Config::load(Some(&missing)).is_err());
    }
}
