//! Desired-state records and resolved artifact locations

use crate::artifact::{Coordinate, Version};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;

/// Start level assigned when a record does not name one
pub const DEFAULT_START_LEVEL: u32 = 4;

/// Base directory for file lookups when a record does not name one
pub const DEFAULT_BIN_DIR: &str = "bin";

/// Name and version of an artifact as read from its manifest
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ArtifactIdentity {
    pub name: String,
    pub version: Version,
}

impl ArtifactIdentity {
    pub fn new(name: impl Into<String>, version: Version) -> Self {
        Self {
            name: name.into(),
            version,
        }
    }

    /// `{name}-{version}.tgz`, with a snapshot qualifier rendered `-SNAPSHOT`
    pub fn file_name(&self) -> String {
        format!("{}-{}.tgz", self.name, self.version.to_file_string())
    }
}

impl fmt::Display for ArtifactIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.name, self.version)
    }
}

/// How a record refers to its artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    RepositoryCoordinate,
    FileReference,
    Unresolved,
}

/// Where artifact content is loaded from.
///
/// `File` content is copied into host storage on install. `Reference`
/// content is loaded in place, which is what development copies use.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ArtifactLocation {
    File(PathBuf),
    Reference(PathBuf),
}

impl ArtifactLocation {
    pub fn path(&self) -> &Path {
        match self {
            ArtifactLocation::File(p) | ArtifactLocation::Reference(p) => p,
        }
    }

    pub fn is_reference(&self) -> bool {
        matches!(self, ArtifactLocation::Reference(_))
    }

    /// Same content, loaded in place
    pub fn to_reference(&self) -> Self {
        ArtifactLocation::Reference(self.path().to_path_buf())
    }

    /// Absolute path of the content, relative locations taken from `workdir`
    pub fn resolve(&self, workdir: &Path) -> PathBuf {
        let p = self.path();
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            workdir.join(p)
        }
    }
}

impl fmt::Display for ArtifactLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let render = |p: &Path| {
            let s = p.to_string_lossy().replace('\\', "/");
            if p.is_absolute() || s.starts_with("./") {
                s
            } else {
                format!("./{}", s)
            }
        };
        match self {
            ArtifactLocation::File(p) => write!(f, "file:{}", render(p)),
            ArtifactLocation::Reference(p) => write!(f, "reference:file:{}", render(p)),
        }
    }
}

impl FromStr for ArtifactLocation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let strip = |rest: &str| {
            let rest = rest.strip_prefix("//").unwrap_or(rest);
            PathBuf::from(rest.strip_prefix("./").unwrap_or(rest))
        };
        if let Some(rest) = s.strip_prefix("reference:file:") {
            Ok(ArtifactLocation::Reference(strip(rest)))
        } else if let Some(rest) = s.strip_prefix("file:") {
            Ok(ArtifactLocation::File(strip(rest)))
        } else {
            Err(format!("Unsupported artifact location '{}'", s))
        }
    }
}

impl Serialize for ArtifactLocation {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for ArtifactLocation {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Path of `target` relative to `base` when `target` lies below it
pub fn relativize(base: &Path, target: &Path) -> Option<PathBuf> {
    let rel = target.strip_prefix(base).ok()?;
    if rel.components().any(|c| matches!(c, Component::ParentDir)) {
        return None;
    }
    Some(rel.to_path_buf())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IdentitySource {
    Declared,
    Manifest,
}

/// Errors raised when a resolution step breaks a record invariant
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SpecError {
    #[error("'{0}' already has a preferred location in this resolution pass")]
    AlreadyLocated(String),

    #[error("'{spec}' was identified as {known}; refusing to change it to {found}")]
    IdentityChanged {
        spec: String,
        known: ArtifactIdentity,
        found: ArtifactIdentity,
    },

    #[error("Workspace copy {found} does not match '{spec}'")]
    WorkspaceMismatch { spec: String, found: ArtifactIdentity },

    #[error("'{0}' has no identity yet")]
    Unidentified(String),
}

/// One desired artifact, mutated by the resolver chain during one provisioning pass
#[derive(Debug, Clone, PartialEq)]
pub struct ArtifactSpec {
    identity: Option<ArtifactIdentity>,
    identity_source: IdentitySource,
    /// Repository coordinate as written in the desired state
    pub coordinate: Option<String>,
    /// Explicit file name below `bin_dir`
    pub file_name: Option<String>,
    pub start_level: u32,
    pub auto_start: bool,
    pub bin_dir: PathBuf,
    preferred_location: Option<ArtifactLocation>,
    workspace_location: Option<PathBuf>,
    resolved: bool,
}

impl Default for ArtifactSpec {
    fn default() -> Self {
        Self {
            identity: None,
            identity_source: IdentitySource::Declared,
            coordinate: None,
            file_name: None,
            start_level: DEFAULT_START_LEVEL,
            auto_start: true,
            bin_dir: PathBuf::from(DEFAULT_BIN_DIR),
            preferred_location: None,
            workspace_location: None,
            resolved: false,
        }
    }
}

impl ArtifactSpec {
    pub fn from_coordinate(coordinate: impl Into<String>) -> Self {
        Self {
            coordinate: Some(coordinate.into()),
            ..Default::default()
        }
    }

    pub fn from_file(file_name: impl Into<String>) -> Self {
        Self {
            file_name: Some(file_name.into()),
            ..Default::default()
        }
    }

    pub fn from_identity(identity: ArtifactIdentity) -> Self {
        Self {
            identity: Some(identity),
            ..Default::default()
        }
    }

    pub fn with_start_level(mut self, level: u32) -> Self {
        self.start_level = level;
        self
    }

    pub fn with_auto_start(mut self, start: bool) -> Self {
        self.auto_start = start;
        self
    }

    pub fn with_bin_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.bin_dir = dir.into();
        self
    }

    pub fn identity(&self) -> Option<&ArtifactIdentity> {
        self.identity.as_ref()
    }

    pub fn name(&self) -> Option<&str> {
        self.identity.as_ref().map(|i| i.name.as_str())
    }

    pub fn version(&self) -> Option<&Version> {
        self.identity.as_ref().map(|i| &i.version)
    }

    pub fn preferred_location(&self) -> Option<&ArtifactLocation> {
        self.preferred_location.as_ref()
    }

    pub fn workspace_location(&self) -> Option<&Path> {
        self.workspace_location.as_deref()
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved
    }

    /// Parsed coordinate, if the record carries a well-formed one
    pub fn parsed_coordinate(&self) -> Option<Coordinate> {
        self.coordinate.as_deref().and_then(|c| c.parse().ok())
    }

    pub fn source_kind(&self) -> SourceKind {
        if self.parsed_coordinate().is_some() {
            SourceKind::RepositoryCoordinate
        } else if self.file_location().is_some() {
            SourceKind::FileReference
        } else {
            SourceKind::Unresolved
        }
    }

    /// Candidate file below `bin_dir`.
    ///
    /// Taken from the explicit file name, else derived from the coordinate,
    /// else from a declared identity.
    pub fn file_location(&self) -> Option<PathBuf> {
        if let Some(name) = self.file_name.as_deref().filter(|n| !n.is_empty()) {
            return Some(self.bin_dir.join(name));
        }
        if let Some(c) = self.parsed_coordinate() {
            return Some(self.bin_dir.join(c.bin_file_name()));
        }
        self.identity
            .as_ref()
            .map(|id| self.bin_dir.join(id.file_name()))
    }

    /// Label used in diagnostics: the coordinate, else the file, else the identity
    pub fn label(&self) -> String {
        if let Some(c) = self.coordinate.as_deref().filter(|c| !c.is_empty()) {
            return c.to_string();
        }
        if let Some(f) = self.file_name.as_deref().filter(|f| !f.is_empty()) {
            return f.to_string();
        }
        match &self.identity {
            Some(id) => id.to_string(),
            None => "<unnamed>".to_string(),
        }
    }

    /// Clear per-pass resolution state; identity read from a manifest survives
    pub fn begin_pass(&mut self) {
        self.preferred_location = None;
        self.workspace_location = None;
        self.resolved = false;
    }

    /// Record the location chosen by a resolver. At most once per pass.
    pub fn set_preferred_location(&mut self, location: ArtifactLocation) -> Result<(), SpecError> {
        if self.preferred_location.is_some() {
            return Err(SpecError::AlreadyLocated(self.label()));
        }
        self.preferred_location = Some(location);
        Ok(())
    }

    /// Record the identity read from the located artifact's manifest.
    ///
    /// Once an identity came from a manifest it never changes.
    pub fn record_manifest_identity(&mut self, found: ArtifactIdentity) -> Result<(), SpecError> {
        if self.identity_source == IdentitySource::Manifest {
            if let Some(known) = &self.identity {
                if *known != found {
                    return Err(SpecError::IdentityChanged {
                        spec: self.label(),
                        known: known.clone(),
                        found,
                    });
                }
                return Ok(());
            }
        }
        self.identity = Some(found);
        self.identity_source = IdentitySource::Manifest;
        Ok(())
    }

    /// Point the record at a live development copy of the same identity
    pub fn apply_workspace_override(
        &mut self,
        found: &ArtifactIdentity,
        path: PathBuf,
    ) -> Result<(), SpecError> {
        let Some(known) = &self.identity else {
            return Err(SpecError::Unidentified(self.label()));
        };
        if known != found {
            return Err(SpecError::WorkspaceMismatch {
                spec: self.label(),
                found: found.clone(),
            });
        }
        self.preferred_location = Some(ArtifactLocation::Reference(path.clone()));
        self.workspace_location = Some(path);
        Ok(())
    }

    pub fn mark_resolved(&mut self) {
        self.resolved = self.preferred_location.is_some();
    }

    /// Drop a located match whose identity could not be read
    pub fn demote(&mut self) {
        self.preferred_location = None;
        self.workspace_location = None;
        self.resolved = false;
    }

    /// Key under which two records count as the same artifact
    pub fn dedup_key(&self) -> String {
        let id = self
            .identity
            .as_ref()
            .map(|i| format!("{}:{}", i.name, i.version))
            .unwrap_or_else(|| self.label());
        let loc = self
            .preferred_location
            .as_ref()
            .map(|l| l.to_string())
            .unwrap_or_default();
        format!("{}:{}", id, loc)
    }
}

/// Remove duplicate records, keeping the first occurrence
pub fn dedup_specs(specs: Vec<ArtifactSpec>) -> Vec<ArtifactSpec> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::with_capacity(specs.len());
    for spec in specs {
        if seen.insert(spec.dedup_key()) {
            out.push(spec);
        } else {
            log::debug!("Dropping duplicate artifact {}", spec.label());
        }
    }
    out
}
