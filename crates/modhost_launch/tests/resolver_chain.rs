//! Resolver chain ordering, workspace override and version distance

mod common;

use common::artifact_dir;
use flate2::write::GzEncoder;
use flate2::Compression;
use modhost_launch::artifact::{
    distance, ArtifactIdentity, ArtifactLocation, ArtifactSpec, Version,
};
use modhost_launch::config::RepositoryConfig;
use modhost_launch::resolver::{
    FileResolver, RepositoryResolver, ResolverChain, WorkspaceResolver,
};
use std::fs::File;
use std::path::{Path, PathBuf};

fn write_artifact_tgz(path: &Path, name: &str, version: &str) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    let manifest = format!("name: {}\nversion: \"{}\"\n", name, version);
    let encoder = GzEncoder::new(File::create(path).unwrap(), Compression::default());
    let mut builder = tar::Builder::new(encoder);
    let mut header = tar::Header::new_gnu();
    header.set_size(manifest.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();
    builder
        .append_data(&mut header, "artifact.yaml", manifest.as_bytes())
        .unwrap();
    builder.into_inner().unwrap().finish().unwrap();
}

struct Layout {
    _tmp: tempfile::TempDir,
    workdir: PathBuf,
    local_repo: PathBuf,
}

impl Layout {
    fn new() -> Self {
        let tmp = tempfile::tempdir().unwrap();
        let workdir = tmp.path().join("run");
        let local_repo = tmp.path().join("m2");
        std::fs::create_dir_all(&workdir).unwrap();
        std::fs::create_dir_all(&local_repo).unwrap();
        Self {
            _tmp: tmp,
            workdir,
            local_repo,
        }
    }

    fn chain(&self) -> ResolverChain {
        ResolverChain::new(&self.workdir)
            .with_resolver(RepositoryResolver::new(
                &self.local_repo,
                RepositoryConfig::default(),
                true,
            ))
            .with_resolver(FileResolver::new(&self.workdir))
    }
}

#[tokio::test]
async fn test_repository_is_tried_before_files() {
    let layout = Layout::new();
    write_artifact_tgz(
        &layout.local_repo.join("org/example/core/1.2.0/core-1.2.0.tgz"),
        "core",
        "1.2.0",
    );
    write_artifact_tgz(
        &layout.workdir.join("bin/org.example.core-1.2.0.tgz"),
        "core",
        "1.2.0",
    );

    let mut spec = ArtifactSpec::from_coordinate("org.example:core:1.2.0");
    assert!(layout.chain().resolve(&mut spec).await);
    assert_eq!(
        spec.preferred_location(),
        Some(&ArtifactLocation::File(
            layout.local_repo.join("org/example/core/1.2.0/core-1.2.0.tgz")
        ))
    );
    assert_eq!(spec.name(), Some("core"));
}

#[tokio::test]
async fn test_offline_miss_falls_back_to_bin_directory() {
    let layout = Layout::new();
    write_artifact_tgz(
        &layout.workdir.join("bin/org.example.core-1.2.0.tgz"),
        "core",
        "1.2.0",
    );

    let mut spec = ArtifactSpec::from_coordinate("org.example:core:1.2.0");
    assert!(layout.chain().resolve(&mut spec).await);
    assert_eq!(
        spec.preferred_location(),
        Some(&ArtifactLocation::File("bin/org.example.core-1.2.0.tgz".into()))
    );
}

#[tokio::test]
async fn test_unresolvable_coordinate_is_reported() {
    let layout = Layout::new();
    write_artifact_tgz(&layout.workdir.join("bin/ui-3.0.0.tgz"), "ui", "3.0.0");

    let resolution = layout
        .chain()
        .resolve_all(vec![
            ArtifactSpec::from_file("ui-3.0.0.tgz"),
            ArtifactSpec::from_coordinate("org.example:missing:1.0.0"),
        ])
        .await;
    assert_eq!(resolution.resolved.len(), 1);
    let unresolved: Vec<_> = resolution.unresolved.iter().map(|s| s.label()).collect();
    assert_eq!(unresolved, vec!["org.example:missing:1.0.0"]);
}

#[tokio::test]
async fn test_workspace_override_needs_an_identity() {
    let layout = Layout::new();
    let ws = layout.workdir.join("ws");
    let core_build = artifact_dir(&ws, "core/target", "core", "1.2.0");
    artifact_dir(&ws, "ui/target", "ui", "1.0.0");
    write_artifact_tgz(&layout.workdir.join("bin/core-1.2.0.tgz"), "core", "1.2.0");

    let chain = layout.chain().with_workspace(WorkspaceResolver::scan(&ws));

    let mut core = ArtifactSpec::from_file("core-1.2.0.tgz");
    assert!(chain.resolve(&mut core).await);
    assert_eq!(
        core.preferred_location(),
        Some(&ArtifactLocation::Reference(core_build.clone()))
    );
    assert_eq!(core.workspace_location(), Some(core_build.as_path()));

    // a build output alone never resolves a record
    let mut ui = ArtifactSpec::from_identity(ArtifactIdentity::new("ui", Version::new(1, 0, 0)));
    assert!(!chain.resolve(&mut ui).await);
    assert!(ui.workspace_location().is_none());
}

#[test]
fn test_distance_is_symmetric_and_qualifier_blind() {
    let versions: Vec<Version> = ["0.0.1", "1.0.0", "1.0.0.SNAPSHOT", "1.2.3", "2.0.0", "10.4.7"]
        .iter()
        .map(|v| v.parse().unwrap())
        .collect();
    for a in &versions {
        assert_eq!(distance(a, a), 0);
        for b in &versions {
            assert_eq!(distance(a, b), distance(b, a));
        }
    }
    assert_eq!(distance(&versions[1], &versions[2]), 0);
    assert_eq!(distance(&versions[1], &versions[3]), 23);
}
