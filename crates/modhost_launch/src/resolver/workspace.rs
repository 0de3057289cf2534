//! Development workspace index
//!
//! The workspace is scanned once. Every `target` directory that carries an
//! `artifact.yaml` is a build output and is indexed by name and version.
//! Once a record's identity is known, a matching build output replaces the
//! resolved location so the host loads the live copy in place.

use crate::artifact::{read_identity, ArtifactIdentity, ArtifactSpec, Version, MANIFEST_FILE};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

/// Directory holding build outputs inside a project
const BUILD_OUTPUT_DIR: &str = "target";

const SKIPPED_DIRS: &[&str] = &[
    "doc",
    "docs",
    "apidocs",
    "generated-sources",
    "test-classes",
    "temp",
    "tmp",
];

fn is_skipped(entry: &DirEntry) -> bool {
    if entry.depth() == 0 {
        return false;
    }
    if !entry.file_type().is_dir() {
        return true;
    }
    let name = entry.file_name().to_string_lossy();
    if name.starts_with('.') || SKIPPED_DIRS.contains(&&*name) {
        return true;
    }
    // src/main and src/test hold sources, never build outputs
    let in_src = entry
        .path()
        .parent()
        .and_then(|p| p.file_name())
        .map(|p| p == "src")
        .unwrap_or(false);
    in_src && (name == "main" || name == "test")
}

pub struct WorkspaceResolver {
    root: PathBuf,
    index: HashMap<String, Vec<(Version, PathBuf)>>,
}

impl WorkspaceResolver {
    /// Scan `root` and index every build output found below it
    pub fn scan(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let mut resolver = Self {
            root,
            index: HashMap::new(),
        };
        if resolver.root.is_dir() {
            resolver.index_tree();
        } else {
            log::warn!(
                "Cannot find given workspace location: {}",
                resolver.root.display()
            );
        }
        resolver
    }

    fn index_tree(&mut self) {
        let mut visited: HashSet<PathBuf> = HashSet::new();
        let mut walker = WalkDir::new(&self.root)
            .follow_links(true)
            .into_iter()
            .filter_entry(|e| !is_skipped(e));

        loop {
            let entry = match walker.next() {
                None => break,
                Some(Ok(entry)) => entry,
                Some(Err(e)) => {
                    // symlink loops and unreadable directories end up here
                    log::debug!("Skipping workspace entry: {}", e);
                    continue;
                }
            };

            let canonical = match entry.path().canonicalize() {
                Ok(p) => p,
                Err(_) => {
                    walker.skip_current_dir();
                    continue;
                }
            };
            if !visited.insert(canonical) {
                walker.skip_current_dir();
                continue;
            }

            if entry.file_name() == BUILD_OUTPUT_DIR && entry.depth() > 0 {
                self.index_build_output(entry.path());
                walker.skip_current_dir();
            }
        }

        log::debug!(
            "Workspace {}: {} build outputs indexed",
            self.root.display(),
            self.len()
        );
    }

    fn index_build_output(&mut self, dir: &Path) {
        if !dir.join(MANIFEST_FILE).is_file() {
            return;
        }
        match read_identity(dir) {
            Ok(identity) => {
                log::trace!(
                    "Workspace location found for {}: {}",
                    identity,
                    dir.display()
                );
                self.index
                    .entry(identity.name)
                    .or_default()
                    .push((identity.version, dir.to_path_buf()));
            }
            Err(e) => log::debug!("Ignoring build output {}: {}", dir.display(), e),
        }
    }

    /// Number of indexed build outputs
    pub fn len(&self) -> usize {
        self.index.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Build output of exactly this identity, first found wins
    pub fn lookup(&self, identity: &ArtifactIdentity) -> Option<&Path> {
        self.index
            .get(&identity.name)?
            .iter()
            .find(|(v, _)| *v == identity.version)
            .map(|(_, p)| p.as_path())
    }

    /// Whether the record is identified, which the override requires
    pub fn can_handle(&self, spec: &ArtifactSpec) -> bool {
        spec.identity().is_some()
    }

    /// Replace the record's location with a live build output of the same identity
    pub fn apply(&self, spec: &mut ArtifactSpec) -> bool {
        if !self.can_handle(spec) {
            return false;
        }
        let Some(identity) = spec.identity().cloned() else {
            return false;
        };
        let Some(path) = self.lookup(&identity).map(Path::to_path_buf) else {
            return false;
        };
        match spec.apply_workspace_override(&identity, path) {
            Ok(()) => {
                log::debug!(
                    "[{}] Using workspace location {}",
                    identity,
                    spec.workspace_location()
                        .map(|p| p.display().to_string())
                        .unwrap_or_default()
                );
                true
            }
            Err(e) => {
                log::warn!("{}", e);
                false
            }
        }
    }
}
