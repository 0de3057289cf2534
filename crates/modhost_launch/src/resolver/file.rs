//! Local file lookup below a record's bin directory

use crate::artifact::{relativize, ArtifactLocation, ArtifactSpec};
use crate::resolver::{ArtifactResolver, ResolveError};
use async_trait::async_trait;
use std::path::PathBuf;

/// Finds artifacts that carry (or derive) a concrete file path.
///
/// Found paths are made relative to the working directory so permission
/// grants keyed by relative location still apply.
pub struct FileResolver {
    workdir: PathBuf,
}

impl FileResolver {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }
}

#[async_trait]
impl ArtifactResolver for FileResolver {
    fn name(&self) -> &'static str {
        "file"
    }

    fn can_handle(&self, spec: &ArtifactSpec) -> bool {
        spec.file_location().is_some()
    }

    async fn locate(&self, spec: &ArtifactSpec) -> Result<ArtifactLocation, ResolveError> {
        let candidate = spec
            .file_location()
            .ok_or_else(|| ResolveError::NotFound(spec.label()))?;
        let absolute = if candidate.is_absolute() {
            candidate.clone()
        } else {
            self.workdir.join(&candidate)
        };

        if !absolute.exists() {
            return Err(ResolveError::NotFound(candidate.display().to_string()));
        }

        let location = match relativize(&self.workdir, &absolute) {
            Some(rel) => ArtifactLocation::File(rel),
            None => ArtifactLocation::File(absolute),
        };
        log::debug!("file: found {}", location);
        Ok(location)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_locate_relative_to_workdir() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(tmp.path().join("bin")).unwrap();
        std::fs::write(tmp.path().join("bin/ui-3.0.0.tgz"), b"").unwrap();

        let resolver = FileResolver::new(tmp.path());
        let spec = ArtifactSpec::from_file("ui-3.0.0.tgz");
        assert!(resolver.can_handle(&spec));
        let loc = resolver.locate(&spec).await.unwrap();
        assert_eq!(loc.to_string(), "file:./bin/ui-3.0.0.tgz");
    }

    #[tokio::test]
    async fn test_missing_file() {
        let tmp = tempfile::tempdir().unwrap();
        let resolver = FileResolver::new(tmp.path());
        let spec = ArtifactSpec::from_file("nope.tgz");
        assert!(matches!(
            resolver.locate(&spec).await,
            Err(ResolveError::NotFound(_))
        ));
    }

    #[test]
    fn test_declines_records_without_a_path() {
        let resolver = FileResolver::new(".");
        assert!(!resolver.can_handle(&ArtifactSpec::from_coordinate("garbage")));
    }
}
