//! Artifact manifest (`artifact.yaml`) reading
//!
//! An artifact is either a directory or a gzip tarball with an `artifact.yaml`
//! at its root. The manifest carries the artifact identity and, optionally,
//! a runnable entry point.

use crate::artifact::{ArtifactIdentity, Version};
use flate2::read::GzDecoder;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::{Component, Path, PathBuf};

/// Manifest file name at the root of every artifact
pub const MANIFEST_FILE: &str = "artifact.yaml";

/// Kind of artifact as declared in its manifest
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    #[default]
    Regular,
    /// Attaches to another artifact and is never started on its own
    Fragment,
}

/// What a fragment extends when it is not attached to a regular artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtensionTarget {
    /// Extends the host's root artifact; changing it needs a fresh loader
    Host,
    /// Extends the boot path; changing it needs a fresh process
    Boot,
}

/// Parsed `artifact.yaml`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactManifest {
    pub name: String,
    pub version: Version,
    #[serde(default)]
    pub kind: ArtifactKind,
    #[serde(default)]
    pub extension: Option<ExtensionTarget>,
    /// Entry point run by the local host when the artifact is activated
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
}

impl ArtifactManifest {
    /// Parse a manifest from a YAML string
    pub fn from_yaml(content: &str) -> Result<Self, ManifestError> {
        let manifest: ArtifactManifest = serde_yaml::from_str(content)?;
        manifest.validate()?;
        Ok(manifest)
    }

    pub fn validate(&self) -> Result<(), ManifestError> {
        if self.name.trim().is_empty() {
            return Err(ManifestError::Invalid("name must not be empty".to_string()));
        }
        if self.name.contains(char::is_whitespace) {
            return Err(ManifestError::Invalid(format!(
                "name '{}' must not contain whitespace",
                self.name
            )));
        }
        if self.extension.is_some() && self.kind != ArtifactKind::Fragment {
            return Err(ManifestError::Invalid(format!(
                "'{}': only fragments may declare an extension",
                self.name
            )));
        }
        Ok(())
    }

    pub fn identity(&self) -> ArtifactIdentity {
        ArtifactIdentity::new(self.name.clone(), self.version.clone())
    }
}

/// Whether a path names a gzip tarball artifact
pub fn is_archive(path: &Path) -> bool {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    name.ends_with(".tgz") || name.ends_with(".tar.gz")
}

/// Read the manifest of a directory or tarball artifact
pub fn read_manifest(path: &Path) -> Result<ArtifactManifest, ManifestError> {
    if path.is_dir() {
        let manifest_path = path.join(MANIFEST_FILE);
        if !manifest_path.is_file() {
            return Err(ManifestError::Missing(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(&manifest_path).map_err(|e| ManifestError::Io {
            path: manifest_path.clone(),
            source: e,
        })?;
        return ArtifactManifest::from_yaml(&content);
    }

    if !path.is_file() {
        return Err(ManifestError::Io {
            path: path.to_path_buf(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such artifact"),
        });
    }
    if !is_archive(path) {
        return Err(ManifestError::Missing(path.to_path_buf()));
    }

    let content = read_archive_manifest(path)?;
    ArtifactManifest::from_yaml(&content)
}

/// The identify phase of resolution: read identity from an artifact's manifest
pub fn read_identity(path: &Path) -> Result<ArtifactIdentity, ManifestError> {
    read_manifest(path).map(|m| m.identity())
}

fn read_archive_manifest(path: &Path) -> Result<String, ManifestError> {
    let io_err = |source| ManifestError::Io {
        path: path.to_path_buf(),
        source,
    };
    let file = File::open(path).map_err(io_err)?;
    let mut archive = tar::Archive::new(GzDecoder::new(file));

    for entry in archive.entries().map_err(io_err)? {
        let mut entry = entry.map_err(io_err)?;
        let entry_path = entry.path().map_err(io_err)?.into_owned();
        if is_root_manifest(&entry_path) {
            let mut content = String::new();
            entry.read_to_string(&mut content).map_err(io_err)?;
            return Ok(content);
        }
    }

    Err(ManifestError::Missing(path.to_path_buf()))
}

/// `artifact.yaml` or `./artifact.yaml`
fn is_root_manifest(entry: &Path) -> bool {
    let normal: Vec<_> = entry
        .components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect();
    matches!(normal.as_slice(), [Component::Normal(n)] if n.to_str() == Some(MANIFEST_FILE))
}

/// Errors raised while reading artifact manifests
#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("Failed to read artifact '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("'{0}' has no artifact.yaml and is probably not an artifact")]
    Missing(PathBuf),

    #[error("Failed to parse artifact manifest: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Invalid artifact manifest: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;

    fn write_tgz(path: &Path, entries: &[(&str, &str)]) {
        let file = File::create(path).unwrap();
        let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::default()));
        for (name, content) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_size(content.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder
                .append_data(&mut header, name, content.as_bytes())
                .unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap();
    }

    #[test]
    fn test_parse_manifest() {
        let yaml = r#"
name: core
version: "1.2.0"
command: "bin/core"
args: ["--port", "8080"]
"#;
        let m = ArtifactManifest::from_yaml(yaml).unwrap();
        assert_eq!(m.identity(), ArtifactIdentity::new("core", Version::new(1, 2, 0)));
        assert_eq!(m.kind, ArtifactKind::Regular);
        assert_eq!(m.command.as_deref(), Some("bin/core"));
        assert_eq!(m.args.len(), 2);
    }

    #[test]
    fn test_fragment_extension() {
        let yaml = r#"
name: boot-ext
version: "1.0.0"
kind: fragment
extension: boot
"#;
        let m = ArtifactManifest::from_yaml(yaml).unwrap();
        assert_eq!(m.kind, ArtifactKind::Fragment);
        assert_eq!(m.extension, Some(ExtensionTarget::Boot));

        let bad = r#"
name: core
version: "1.0.0"
extension: host
"#;
        assert!(matches!(
            ArtifactManifest::from_yaml(bad),
            Err(ManifestError::Invalid(_))
        ));
    }

    #[test]
    fn test_read_identity_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(MANIFEST_FILE),
            "name: ui\nversion: \"3.0.0\"\n",
        )
        .unwrap();
        let id = read_identity(dir.path()).unwrap();
        assert_eq!(id.name, "ui");
        assert_eq!(id.version, Version::new(3, 0, 0));
    }

    #[test]
    fn test_read_identity_from_archive() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("ui-3.0.0.tgz");
        write_tgz(
            &archive,
            &[
                ("bin/ui", "#!/bin/sh\n"),
                ("./artifact.yaml", "name: ui\nversion: 3.0.0-SNAPSHOT\n"),
            ],
        );
        let id = read_identity(&archive).unwrap();
        assert_eq!(id.name, "ui");
        assert!(id.version.is_unstable());
    }

    #[test]
    fn test_missing_manifest() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            read_identity(dir.path()),
            Err(ManifestError::Missing(_))
        ));

        let archive = dir.path().join("empty.tgz");
        write_tgz(&archive, &[("nested/artifact.yaml", "name: x\nversion: 1\n")]);
        assert!(matches!(
            read_identity(&archive),
            Err(ManifestError::Missing(_))
        ));

        let plain = dir.path().join("notes.txt");
        std::fs::write(&plain, "hello").unwrap();
        assert!(matches!(read_identity(&plain), Err(ManifestError::Missing(_))));
    }
}
