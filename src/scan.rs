//! Listing the image files directly inside a directory.

use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use walkdir::WalkDir;

/// Files in `dir` (not its subdirectories) whose extension is one of
/// `extensions`, compared case-insensitively, sorted by file name.
pub fn image_files(dir: &Path, extensions: &[String]) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        bail!("image directory {} does not exist", dir.display());
    }

    let matcher = extension_matcher(extensions)?;
    let mut files = Vec::new();

    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry?;

        if entry.path().is_file() && matcher.is_match(entry.file_name()) {
            files.push(entry.into_path());
        }
    }

    Ok(files)
}

fn extension_matcher(extensions: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();

    for extension in extensions {
        let glob = GlobBuilder::new(&format!("*.{}", extension.trim_start_matches('.')))
            .case_insensitive(true)
            .literal_separator(true)
            .build()?;
        builder.add(glob);
    }

    Ok(builder.build()?)
}
