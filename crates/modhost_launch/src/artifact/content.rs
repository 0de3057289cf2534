//! Copying artifact content into host storage

use crate::artifact::manifest::is_archive;
use flate2::read::GzDecoder;
use std::fs::File;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

#[derive(Debug, thiserror::Error)]
pub enum ContentError {
    #[error("Artifact content '{path}' is not accessible: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to walk artifact directory: {0}")]
    Walk(#[from] walkdir::Error),
}

/// Materialize an artifact (directory or tarball) into `dest`.
///
/// `dest` is replaced if it already exists.
pub fn materialize(source: &Path, dest: &Path) -> Result<(), ContentError> {
    let io_err = |path: &Path| {
        let path = path.to_path_buf();
        move |source| ContentError::Io { path, source }
    };

    if dest.exists() {
        std::fs::remove_dir_all(dest).map_err(io_err(dest))?;
    }
    std::fs::create_dir_all(dest).map_err(io_err(dest))?;

    if source.is_dir() {
        copy_tree(source, dest)
    } else if is_archive(source) {
        let file = File::open(source).map_err(io_err(source))?;
        let mut archive = tar::Archive::new(GzDecoder::new(file));
        archive.unpack(dest).map_err(io_err(source))
    } else {
        Err(ContentError::Io {
            path: source.to_path_buf(),
            source: std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "expected a directory or a .tgz archive",
            ),
        })
    }
}

fn copy_tree(source: &Path, dest: &Path) -> Result<(), ContentError> {
    for entry in WalkDir::new(source).follow_links(true) {
        let entry = entry?;
        let Ok(rel) = entry.path().strip_prefix(source) else {
            continue;
        };
        let target = dest.join(rel);
        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target).map_err(|e| ContentError::Io {
                path: target.clone(),
                source: e,
            })?;
        } else {
            std::fs::copy(entry.path(), &target).map_err(|e| ContentError::Io {
                path: entry.path().to_path_buf(),
                source: e,
            })?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_materialize_directory_replaces_dest() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("src");
        std::fs::create_dir_all(src.join("bin")).unwrap();
        std::fs::write(src.join("artifact.yaml"), "name: a\nversion: \"1.0.0\"\n").unwrap();
        std::fs::write(src.join("bin/run"), "echo").unwrap();

        let dest = tmp.path().join("dest");
        std::fs::create_dir_all(&dest).unwrap();
        std::fs::write(dest.join("stale"), "old").unwrap();

        materialize(&src, &dest).unwrap();
        assert!(dest.join("artifact.yaml").is_file());
        assert!(dest.join("bin/run").is_file());
        assert!(!dest.join("stale").exists());
    }

    #[test]
    fn test_materialize_rejects_plain_file() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("a.txt");
        std::fs::write(&src, "x").unwrap();
        assert!(materialize(&src, &tmp.path().join("dest")).is_err());
    }
}
