//! Host storage housekeeping for clean starts

use std::path::{Path, PathBuf};

/// A run is clean when requested, or when the host has no storage yet
pub fn is_clean_start(requested: bool, storage: &Path) -> bool {
    requested || !storage.exists()
}

/// Resolve `path` against the working directory
pub fn resolve_in(workdir: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        workdir.join(path)
    }
}

fn remove_path(path: &Path) -> std::io::Result<bool> {
    let meta = match std::fs::symlink_metadata(path) {
        Ok(meta) => meta,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e),
    };
    if meta.is_dir() {
        std::fs::remove_dir_all(path)?;
    } else {
        std::fs::remove_file(path)?;
    }
    Ok(true)
}

/// Delete the clean-start list and the host storage.
///
/// Paths that would remove the working directory itself are refused.
pub fn purge(workdir: &Path, storage: &Path, delete_list: &[PathBuf]) -> std::io::Result<()> {
    let workdir_canonical = workdir.canonicalize().ok();

    for path in delete_list.iter().map(|p| resolve_in(workdir, p)).chain([storage.to_path_buf()]) {
        if path.canonicalize().ok().is_some_and(|p| Some(p) == workdir_canonical) {
            log::warn!("Refusing to delete working directory {}", path.display());
            continue;
        }
        if remove_path(&path)? {
            log::info!("Deleted {}", path.display());
        }
    }
    Ok(())
}
