use std::io;
use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::Args;
use fs_err as fs;
use log::{debug, error, info, warn};
use thiserror::Error;

use crate::{
    codec::{self, CodecError, OutputFormat},
    config::Config,
    options::Global,
    scan::image_files,
};

#[derive(Debug, Args)]
pub struct NormalizeOptions {
    /// The directory of images to normalize. Defaults to the configured
    /// output directory.
    pub dir: Option<PathBuf>,

    /// Width every image is scaled to.
    #[clap(long)]
    pub width: Option<u32>,

    /// Format every image is re-encoded to.
    #[clap(long, value_enum)]
    pub format: Option<OutputFormat>,

    /// Encoder quality, 1 to 100.
    #[clap(long, value_parser(clap::value_parser!(u8).range(1..=100)))]
    pub quality: Option<u8>,

    /// Print what would change without touching any file.
    #[clap(long)]
    pub dry_run: bool,
}

/// What to do with one image file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Already the target width and format.
    Skip,

    Convert {
        output: PathBuf,
        /// Size after conversion; equal to the original when only the
        /// encoding changes.
        size: (u32, u32),
        resize: bool,
        delete_source: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    pub source: PathBuf,
    pub original: (u32, u32),
    pub action: Action,
}

#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("could not write {path}: {source}")]
    Write { path: PathBuf, source: io::Error },
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct NormalizeSummary {
    pub processed: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Converted files whose original could not be removed.
    pub originals_left: usize,
}

pub async fn normalize(global: Global, options: NormalizeOptions) -> Result<()> {
    let mut config = Config::load(global.config.as_deref())?;
    if let Some(width) = options.width {
        config.target_width = width;
    }
    if let Some(format) = options.format {
        config.target_format = format;
    }
    if let Some(quality) = options.quality {
        config.quality = quality;
    }

    let dir = options.dir.unwrap_or_else(|| config.output_dir.clone());
    let summary = normalize_dir(&dir, &config, options.dry_run)?;

    if options.dry_run {
        info!(
            "dry run: {} images would be processed, {} already normalized",
            summary.processed, summary.skipped
        );
    } else {
        info!(
            "normalized {} images ({} already normalized, {} failed)",
            summary.processed, summary.skipped, summary.failed
        );

        if summary.originals_left > 0 {
            warn!(
                "{} originals could not be removed and are still on disk",
                summary.originals_left
            );
        }
    }

    Ok(())
}

/// Brings every supported image in `dir` to the configured width and format.
/// With `dry_run` the plans are logged and counted but nothing is written.
pub fn normalize_dir(dir: &Path, config: &Config, dry_run: bool) -> Result<NormalizeSummary> {
    let files = image_files(dir, &config.normalize_extensions)?;

    if files.is_empty() {
        info!("no supported images found in {}", dir.display());
    }

    let mut summary = NormalizeSummary::default();

    for path in files {
        let plan = match plan_file(&path, config) {
            Ok(plan) => plan,
            Err(err) => {
                error!("failed to read {}: {}", path.display(), err);
                summary.failed += 1;
                continue;
            }
        };

        if plan.action == Action::Skip {
            debug!("{} is already normalized", path.display());
            summary.skipped += 1;
            continue;
        }

        if dry_run {
            describe(&plan, "would convert");
            summary.processed += 1;
            continue;
        }

        convert(&plan, config, &mut summary, |source| fs::remove_file(source));
    }

    Ok(summary)
}

/// Executes one plan and records the outcome. `remove_original` deletes the
/// source once the converted file is in place.
fn convert<F>(plan: &Plan, config: &Config, summary: &mut NormalizeSummary, remove_original: F)
where
    F: FnOnce(&Path) -> io::Result<()>,
{
    let delete_source = match execute(plan, config) {
        Ok(delete_source) => delete_source,
        Err(err) => {
            error!("failed to normalize {}: {}", plan.source.display(), err);
            summary.failed += 1;
            return;
        }
    };

    describe(plan, "converted");
    summary.processed += 1;

    if delete_source {
        if let Err(err) = remove_original(&plan.source) {
            warn!(
                "converted {} but could not remove the original: {}",
                plan.source.display(),
                err
            );
            summary.originals_left += 1;
        }
    }
}

/// Reads the image's size and decides what normalizing it involves.
pub fn plan_file(path: &Path, config: &Config) -> Result<Plan, NormalizeError> {
    let original = codec::file_dimensions(path)?;

    Ok(Plan {
        source: path.to_owned(),
        original,
        action: plan_action(path, original, config),
    })
}

pub fn plan_action(path: &Path, (width, height): (u32, u32), config: &Config) -> Action {
    let format = config.target_format;
    let in_target_format = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| format.matches_extension(ext))
        .unwrap_or(false);
    let resize = width != config.target_width;

    if in_target_format && !resize {
        return Action::Skip;
    }

    let output = if in_target_format {
        path.to_owned()
    } else {
        path.with_extension(format.extension())
    };

    let size = if resize {
        (
            config.target_width,
            codec::scaled_height(width, height, config.target_width),
        )
    } else {
        (width, height)
    };

    Action::Convert {
        delete_source: output != path,
        output,
        size,
        resize,
    }
}

/// Writes the converted image and returns whether the source should now be
/// removed.
fn execute(plan: &Plan, config: &Config) -> Result<bool, NormalizeError> {
    let Action::Convert {
        output,
        resize,
        delete_source,
        ..
    } = &plan.action
    else {
        return Ok(false);
    };

    let mut image = codec::open(&plan.source)?;
    if *resize {
        image = codec::resize_to_width(&image, config.target_width);
    }

    let encoded = codec::encode(&image, config.target_format, config.quality)?;
    replace_file(output, &encoded).map_err(|source| NormalizeError::Write {
        path: output.clone(),
        source,
    })?;

    Ok(*delete_source)
}

/// Writes to a hidden sibling first and renames it over `path`, so `path` is
/// never left half written.
fn replace_file(path: &Path, contents: &[u8]) -> io::Result<()> {
    let staging = staging_path(path);

    fs::write(&staging, contents)?;
    if let Err(err) = fs::rename(&staging, path) {
        let _ = fs::remove_file(&staging);
        return Err(err);
    }

    Ok(())
}

fn staging_path(path: &Path) -> PathBuf {
    path.with_file_name(format!(".{}.partial", file_name(path)))
}

fn describe(plan: &Plan, verb: &str) {
    let Action::Convert {
        output,
        size: (new_width, new_height),
        ..
    } = &plan.action
    else {
        return;
    };

    let (width, height) = plan.original;
    info!(
        "{} {} -> {} ({}x{} -> {}x{})",
        verb,
        file_name(&plan.source),
        file_name(output),
        width,
        height,
        new_width,
        new_height
    );
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::SystemTime;

    use image::{Rgb, RgbImage};

    fn write_image(dir: &Path, name: &str, width: u32, height: u32) -> PathBuf {
        let path = dir.join(name);
        RgbImage::from_pixel(width, height, Rgb([200, 40, 40]))
            .save(&path)
            .unwrap();
        path
    }

    fn small_config(width: u32) -> Config {
        Config {
            target_width: width,
            ..Config::default()
        }
    }

    fn snapshot(dir: &Path) -> Vec<(String, SystemTime, u64)> {
        let mut entries: Vec<_> = fs::read_dir(dir)
            .unwrap()
            .map(|entry| {
                let entry = entry.unwrap();
                let meta = entry.metadata().unwrap();
                (
                    entry.file_name().to_string_lossy().into_owned(),
                    meta.modified().unwrap(),
                    meta.len(),
                )
            })
            .collect();
        entries.sort();
        entries
    }

    #[test]
    fn plans_skip_only_for_target_width_and_format() {
        let config = small_config(790);

        assert_eq!(
            plan_action(Path::new("a.webp"), (790, 300), &config),
            Action::Skip
        );
        assert_eq!(
            plan_action(Path::new("a.png"), (790, 300), &config),
            Action::Convert {
                output: PathBuf::from("a.webp"),
                size: (790, 300),
                resize: false,
                delete_source: true,
            }
        );
        assert_eq!(
            plan_action(Path::new("a.webp"), (1000, 500), &config),
            Action::Convert {
                output: PathBuf::from("a.webp"),
                size: (790, 395),
                resize: true,
                delete_source: false,
            }
        );
    }

    #[test]
    fn converts_resizes_and_removes_originals() {
        let dir = tempfile::tempdir().unwrap();
        write_image(dir.path(), "wide.png", 120, 60);
        write_image(dir.path(), "narrow.jpg", 30, 90);

        let summary = normalize_dir(dir.path(), &small_config(60), false).unwrap();

        assert_eq!(summary.processed, 2);
        assert_eq!(summary.failed, 0);
        assert!(!dir.path().join("wide.png").exists());
        assert!(!dir.path().join("narrow.jpg").exists());

        let wide = codec::file_dimensions(&dir.path().join("wide.webp")).unwrap();
        assert_eq!(wide, (60, 30));

        let narrow = codec::file_dimensions(&dir.path().join("narrow.webp")).unwrap();
        assert_eq!(narrow.0, 60);
        assert!((i64::from(narrow.1) - 180).abs() <= 1);
    }

    #[test]
    fn second_run_changes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        write_image(dir.path(), "a.png", 100, 50);
        write_image(dir.path(), "b.webp", 80, 80);
        let config = small_config(40);

        normalize_dir(dir.path(), &config, false).unwrap();
        let before = snapshot(dir.path());

        let summary = normalize_dir(dir.path(), &config, false).unwrap();

        assert_eq!(summary.processed, 0);
        assert_eq!(summary.skipped, 2);
        assert_eq!(snapshot(dir.path()), before);
    }

    #[test]
    fn dry_run_touches_nothing() {
        let dir = tempfile::tempdir().unwrap();
        write_image(dir.path(), "a.png", 100, 50);
        let before = snapshot(dir.path());

        let summary = normalize_dir(dir.path(), &small_config(40), true).unwrap();

        assert_eq!(summary.processed, 1);
        assert_eq!(snapshot(dir.path()), before);
    }

    #[test]
    fn broken_files_are_reported_and_skipped() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("broken.jpg"), b"not really a jpeg").unwrap();
        write_image(dir.path(), "fine.png", 100, 50);

        let summary = normalize_dir(dir.path(), &small_config(40), false).unwrap();

        assert_eq!(summary.processed, 1);
        assert_eq!(summary.failed, 1);
        assert!(dir.path().join("broken.jpg").exists());
        assert!(dir.path().join("fine.webp").exists());
    }

    #[test]
    fn target_format_is_configurable() {
        let dir = tempfile::tempdir().unwrap();
        write_image(dir.path(), "a.webp", 10, 10);
        let config = Config {
            target_width: 10,
            target_format: OutputFormat::Jpeg,
            ..Config::default()
        };

        normalize_dir(dir.path(), &config, false).unwrap();

        assert!(dir.path().join("a.jpg").exists());
        assert!(!dir.path().join("a.webp").exists());
    }

    #[test]
    fn resizing_in_place_leaves_no_staging_file() {
        let dir = tempfile::tempdir().unwrap();
        write_image(dir.path(), "a.webp", 100, 50);

        let summary = normalize_dir(dir.path(), &small_config(40), false).unwrap();

        assert_eq!(summary.processed, 1);
        assert_eq!(
            codec::file_dimensions(&dir.path().join("a.webp")).unwrap(),
            (40, 20)
        );
        let names: Vec<_> = snapshot(dir.path()).into_iter().map(|e| e.0).collect();
        assert_eq!(names, vec!["a.webp".to_owned()]);
    }

    #[test]
    fn staging_path_is_a_hidden_sibling() {
        assert_eq!(
            staging_path(Path::new("images/a.webp")),
            PathBuf::from("images/.a.webp.partial")
        );
    }

    #[test]
    fn failed_removal_still_counts_as_processed() {
        let dir = tempfile::tempdir().unwrap();
        let source = write_image(dir.path(), "a.png", 100, 50);
        let config = small_config(40);
        let plan = plan_file(&source, &config).unwrap();

        let mut summary = NormalizeSummary::default();
        convert(&plan, &config, &mut summary, |_| {
            Err(io::Error::new(io::ErrorKind::PermissionDenied, "read-only"))
        });

        assert_eq!(summary.processed, 1);
        assert_eq!(summary.failed, 0);
        assert_eq!(summary.originals_left, 1);
        assert!(source.exists());
        assert_eq!(
            codec::file_dimensions(&dir.path().join("a.webp")).unwrap(),
            (40, 20)
        );
    }

    #[test]
    fn missing_directory_is_fatal() {
        let dir = tempfile::tempdir().unwrap();

        assert!(normalize_dir(&dir.path().join("images"), &Config::default(), false).is_err());
    }
}
