use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::Args;
use fs_err as fs;
use log::{error, info};

use crate::{
    codec::{self, CodecError},
    config::Config,
    options::Global,
    scan::image_files,
};

#[derive(Debug, Args)]
pub struct InspectOptions {
    /// The directory of images to list. Defaults to the configured output
    /// directory.
    pub dir: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalImageFile {
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
    pub byte_size: u64,
}

impl LocalImageFile {
    pub fn read(path: &Path) -> Result<Self, CodecError> {
        let (width, height) = codec::file_dimensions(path)?;
        let byte_size = fs::metadata(path)?.len();

        Ok(Self {
            path: path.to_owned(),
            width,
            height,
            byte_size,
        })
    }

    /// `790 x 1200 - 153.2 KB  name.webp`
    pub fn summary_line(&self) -> String {
        let name = self
            .path
            .file_name()
            .map(|name| name.to_string_lossy())
            .unwrap_or_default();

        format!(
            "{} x {} - {:.1} KB  {}",
            self.width,
            self.height,
            self.byte_size as f64 / 1024.0,
            name
        )
    }
}

pub async fn inspect(global: Global, options: InspectOptions) -> Result<()> {
    let config = Config::load(global.config.as_deref())?;
    let dir = options.dir.unwrap_or_else(|| config.output_dir.clone());

    let images = inspect_dir(&dir, &config)?;
    for image in &images {
        println!("{}", image.summary_line());
    }

    Ok(())
}

/// Reads the size of every image in `dir`, sorted by file name. Files that
/// can't be read are logged and left out.
pub fn inspect_dir(dir: &Path, config: &Config) -> Result<Vec<LocalImageFile>> {
    let files = image_files(dir, &config.inspect_extensions)?;

    if files.is_empty() {
        info!("no images found in {}", dir.display());
        return Ok(Vec::new());
    }

    info!("found {} images", files.len());

    let mut images = Vec::with_capacity(files.len());
    for path in files {
        match LocalImageFile::read(&path) {
            Ok(image) => images.push(image),
            Err(err) => error!("could not read {}: {}", path.display(), err),
        }
    }

    Ok(images)
}
