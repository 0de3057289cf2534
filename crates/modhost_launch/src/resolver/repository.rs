//! Repository coordinate resolution against a local cache and remote repositories

use crate::artifact::{ArtifactLocation, ArtifactSpec, Coordinate, Version, VersionRange};
use crate::config::{RemoteRepository, RepositoryConfig};
use crate::resolver::{ArtifactResolver, ResolveError};
use async_trait::async_trait;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

static METADATA_VERSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<version>\s*([^<\s]+)\s*</version>").unwrap());

const METADATA_FILE: &str = "maven-metadata.xml";

/// Resolves `group:artifact[:extension[:classifier]]:version` coordinates.
///
/// The local cache is consulted first. Remote repositories are only queried
/// when the artifact is missing locally and the resolver is not offline.
pub struct RepositoryResolver {
    local: PathBuf,
    remotes: Vec<RemoteRepository>,
    offline: bool,
    client: reqwest::Client,
}

impl RepositoryResolver {
    pub fn new(local: impl Into<PathBuf>, config: RepositoryConfig, offline: bool) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .unwrap_or_default();
        Self {
            local: local.into(),
            remotes: config.repositories,
            offline,
            client,
        }
    }

    pub fn local_repository(&self) -> &Path {
        &self.local
    }

    /// Versions present in the local cache, taken from the version directories
    fn local_versions(&self, coord: &Coordinate) -> Vec<Version> {
        let dir = self.local.join(coord.artifact_dir());
        let Ok(entries) = std::fs::read_dir(&dir) else {
            return Vec::new();
        };
        entries
            .filter_map(|e| e.ok())
            .filter(|e| e.path().is_dir())
            .filter_map(|e| e.file_name().to_str().and_then(|n| n.parse().ok()))
            .collect()
    }

    async fn remote_versions(
        &self,
        remote: &RemoteRepository,
        coord: &Coordinate,
    ) -> Result<Vec<Version>, ResolveError> {
        let url = remote_url(remote, &coord.artifact_dir().join(METADATA_FILE));
        let body = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        Ok(parse_metadata_versions(&body))
    }

    /// Pick the highest version in range, locally first, then from remote metadata
    async fn resolve_range(&self, coord: &Coordinate) -> Result<Coordinate, ResolveError> {
        let range: VersionRange = coord.version.parse()?;

        let mut candidates = self.local_versions(coord);
        if !self.offline {
            for remote in &self.remotes {
                match self.remote_versions(remote, coord).await {
                    Ok(mut versions) => {
                        versions.retain(|v| remote.serves(v.is_unstable()));
                        candidates.extend(versions);
                    }
                    Err(e) => log::debug!("[{}] No metadata for {}: {}", remote.id, coord, e),
                }
            }
        }

        let highest = range
            .highest(candidates.iter())
            .ok_or_else(|| ResolveError::NoMatchingVersion(coord.to_string()))?;
        log::debug!("Version range {} resolved to {}", coord, highest);
        // keep the spelling used for the version directory
        Ok(coord.with_version(highest.to_file_string()))
    }

    async fn download(
        &self,
        remote: &RemoteRepository,
        coord: &Coordinate,
        dest: &Path,
    ) -> Result<(), ResolveError> {
        let url = remote_url(remote, &coord.repository_path());
        log::info!("[{}] Downloading {}", remote.id, url);
        let bytes = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let partial = dest.with_extension("part");
        tokio::fs::write(&partial, &bytes).await?;
        tokio::fs::rename(&partial, dest).await?;
        Ok(())
    }
}

fn remote_url(remote: &RemoteRepository, rel: &Path) -> String {
    let rel: Vec<String> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    format!("{}/{}", remote.url.trim_end_matches('/'), rel.join("/"))
}

/// `<version>` entries of a `maven-metadata.xml` document
pub fn parse_metadata_versions(xml: &str) -> Vec<Version> {
    METADATA_VERSION
        .captures_iter(xml)
        .filter_map(|c| c[1].parse().ok())
        .collect()
}

#[async_trait]
impl ArtifactResolver for RepositoryResolver {
    fn name(&self) -> &'static str {
        "repository"
    }

    fn can_handle(&self, spec: &ArtifactSpec) -> bool {
        match spec.coordinate.as_deref() {
            Some(raw) if !raw.is_empty() => {
                if Coordinate::matches(raw) {
                    true
                } else {
                    log::warn!(
                        "Illegal coordinate \"{}\", expected <group>:<artifact>[:<extension>[:<classifier>]]:<version>",
                        raw
                    );
                    false
                }
            }
            _ => false,
        }
    }

    async fn locate(&self, spec: &ArtifactSpec) -> Result<ArtifactLocation, ResolveError> {
        let raw = spec.coordinate.as_deref().unwrap_or_default();
        let mut coord: Coordinate = raw.parse()?;
        if VersionRange::is_range(&coord.version) {
            coord = self.resolve_range(&coord).await?;
        }

        let local_path = self.local.join(coord.repository_path());
        if local_path.is_file() {
            log::debug!("repository: found {} in local cache", coord);
            return Ok(ArtifactLocation::File(local_path));
        }

        if self.offline {
            return Err(ResolveError::NotFound(format!("{} (offline)", coord)));
        }

        let unstable = coord
            .version
            .parse::<Version>()
            .map(|v| v.is_unstable())
            .unwrap_or(false);
        for remote in self.remotes.iter().filter(|r| r.serves(unstable)) {
            match self.download(remote, &coord, &local_path).await {
                Ok(()) => return Ok(ArtifactLocation::File(local_path)),
                Err(e) => log::debug!("[{}] {} not available: {}", remote.id, coord, e),
            }
        }

        Err(ResolveError::NotFound(coord.to_string()))
    }
}
