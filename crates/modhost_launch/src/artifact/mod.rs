//! Artifact data model: versions, coordinates, desired-state records and manifests

pub mod content;
mod coordinate;
pub mod manifest;
mod spec;
mod version;

pub use coordinate::*;
pub use manifest::{
    read_identity, read_manifest, ArtifactKind, ArtifactManifest, ExtensionTarget, ManifestError,
    MANIFEST_FILE,
};
pub use spec::*;
pub use version::*;
