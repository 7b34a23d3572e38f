use chrono::Local;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::File;
use std::path::{Path, PathBuf};

use crate::db::StorageError;

/// Archives `files` into `<dir>/topline-<timestamp>.tar.gz`. Missing files are
/// skipped so a first run, before any ledger exists, still succeeds.
pub fn snapshot(dir: &Path, files: &[&Path]) -> Result<PathBuf, StorageError> {
    std::fs::create_dir_all(dir)?;
    let stamp = Local::now().format("%Y%m%d-%H%M%S");
    let target = dir.join(format!("topline-{stamp}.tar.gz"));

    let encoder = GzEncoder::new(File::create(&target)?, Compression::default());
    let mut archive = tar::Builder::new(encoder);
    for file in files {
        if !file.is_file() {
            tracing::debug!("Skipping missing file {}", file.display());
            continue;
        }
        let name = file.file_name().unwrap_or(file.as_os_str());
        archive.append_path_with_name(file, name)?;
    }
    archive.into_inner()?.finish()?;

    tracing::info!("Snapshot written to {}", target.display());
    Ok(target)
}
