//! Resolver chain: turns desired-state records into concrete artifact locations
//!
//! Resolution runs in two phases. A resolver *locates* the artifact, then the
//! chain *identifies* it by reading the manifest at that location. Resolvers
//! are tried in order; when one fails to locate or the located content cannot
//! be identified, the next resolver gets the same record. Once identity is
//! known the workspace index may point the record at a live build output.

mod file;
mod repository;
mod workspace;

pub use file::*;
pub use repository::*;
pub use workspace::*;

use crate::artifact::{
    dedup_specs, read_identity, ArtifactLocation, ArtifactSpec, CoordinateError, ManifestError,
    VersionError,
};
use crate::config::{local_repository, LaunchOptions, RepositoryConfig};
use async_trait::async_trait;
use std::path::PathBuf;

/// Errors raised while locating an artifact
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("Artifact not found: {0}")]
    NotFound(String),

    #[error("No version of {0} matches the requested range")]
    NoMatchingVersion(String),

    #[error(transparent)]
    Coordinate(#[from] CoordinateError),

    #[error(transparent)]
    Version(#[from] VersionError),

    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error("Repository request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// One link of the resolver chain
#[async_trait]
pub trait ArtifactResolver: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether this resolver understands how the record refers to its artifact
    fn can_handle(&self, spec: &ArtifactSpec) -> bool;

    /// Find the artifact without touching the record
    async fn locate(&self, spec: &ArtifactSpec) -> Result<ArtifactLocation, ResolveError>;
}

/// Records split by resolution outcome, declaration order kept
#[derive(Debug, Default)]
pub struct Resolution {
    pub resolved: Vec<ArtifactSpec>,
    pub unresolved: Vec<ArtifactSpec>,
}

/// Ordered resolvers plus the workspace override
pub struct ResolverChain {
    resolvers: Vec<Box<dyn ArtifactResolver>>,
    workspace: Option<WorkspaceResolver>,
    workdir: PathBuf,
}

impl ResolverChain {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            resolvers: Vec::new(),
            workspace: None,
            workdir: workdir.into(),
        }
    }

    pub fn with_resolver(mut self, resolver: impl ArtifactResolver + 'static) -> Self {
        self.resolvers.push(Box::new(resolver));
        self
    }

    pub fn with_workspace(mut self, workspace: WorkspaceResolver) -> Self {
        self.workspace = Some(workspace);
        self
    }

    /// The standard chain: repository, then file; workspace override when configured.
    ///
    /// With `rundir_only` only local files are considered and the workspace is ignored.
    pub fn from_options(options: &LaunchOptions, repositories: RepositoryConfig) -> Self {
        let mut chain = Self::new(&options.workdir);
        if !options.rundir_only {
            chain = chain.with_resolver(RepositoryResolver::new(
                local_repository(),
                repositories,
                options.offline,
            ));
        }
        chain = chain.with_resolver(FileResolver::new(&options.workdir));

        if let (Some(ws), false) = (&options.workspace, options.rundir_only) {
            let ws = if ws.is_absolute() {
                ws.clone()
            } else {
                options.workdir.join(ws)
            };
            chain = chain.with_workspace(WorkspaceResolver::scan(ws));
        }
        chain
    }

    pub fn resolver_names(&self) -> Vec<&'static str> {
        self.resolvers.iter().map(|r| r.name()).collect()
    }

    /// Resolve one record. Returns whether it ended up resolved.
    pub async fn resolve(&self, spec: &mut ArtifactSpec) -> bool {
        spec.begin_pass();

        for resolver in &self.resolvers {
            if !resolver.can_handle(spec) {
                continue;
            }

            let location = match resolver.locate(spec).await {
                Ok(location) => location,
                Err(e) => {
                    log::debug!("{}: {} not resolved: {}", resolver.name(), spec.label(), e);
                    continue;
                }
            };

            let identity = match read_identity(&location.resolve(&self.workdir)) {
                Ok(identity) => identity,
                Err(e) => {
                    log::warn!(
                        "{}: found {} for {} but cannot identify it: {}",
                        resolver.name(),
                        location,
                        spec.label(),
                        e
                    );
                    continue;
                }
            };

            let accepted = spec
                .set_preferred_location(location)
                .and_then(|_| spec.record_manifest_identity(identity));
            if let Err(e) = accepted {
                log::warn!("{}: {}", resolver.name(), e);
                spec.demote();
                continue;
            }
            spec.mark_resolved();

            if let Some(ws) = &self.workspace {
                ws.apply(spec);
            }

            log::debug!(
                "{}: {} -> {}",
                resolver.name(),
                spec.label(),
                spec.preferred_location()
                    .map(|l| l.to_string())
                    .unwrap_or_default()
            );
            return true;
        }

        false
    }

    /// Resolve every record; unresolved ones are logged and returned separately
    pub async fn resolve_all(&self, specs: Vec<ArtifactSpec>) -> Resolution {
        log::info!("Resolving {} artifacts ...", specs.len());
        let mut resolution = Resolution::default();
        for mut spec in specs {
            if self.resolve(&mut spec).await {
                resolution.resolved.push(spec);
            } else {
                resolution.unresolved.push(spec);
            }
        }

        if !resolution.unresolved.is_empty() {
            log::warn!("Could not resolve the following artifacts:");
            for spec in &resolution.unresolved {
                log::warn!("--> {}", spec.label());
            }
        }
        resolution.resolved = dedup_specs(resolution.resolved);
        log::info!("Resolving done.");
        resolution
    }
}
