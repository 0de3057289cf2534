//! Remote repository configuration

use crate::config::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Repository configuration looked up in the working directory
pub const DEFAULT_REPOSITORY_CONFIG: &str = "launcher-repositories.yaml";

/// Environment variable overriding the local repository cache
pub const LOCAL_REPOSITORY_ENV: &str = "MODHOST_LOCAL_REPOSITORY";

const MAVEN_CENTRAL: &str = "https://repo1.maven.org/maven2";

fn default_enabled() -> bool {
    true
}

/// A remote artifact repository
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteRepository {
    pub id: String,
    pub url: String,
    /// Serve release versions
    #[serde(default = "default_enabled")]
    pub releases: bool,
    /// Serve snapshot versions
    #[serde(default = "default_enabled")]
    pub snapshots: bool,
}

impl RemoteRepository {
    pub fn central() -> Self {
        Self {
            id: "central".to_string(),
            url: MAVEN_CENTRAL.to_string(),
            releases: true,
            snapshots: false,
        }
    }

    /// Whether this repository may serve the given version
    pub fn serves(&self, unstable: bool) -> bool {
        if unstable {
            self.snapshots
        } else {
            self.releases
        }
    }
}

/// Ordered list of remote repositories
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryConfig {
    #[serde(default)]
    pub repositories: Vec<RemoteRepository>,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            repositories: vec![RemoteRepository::central()],
        }
    }
}

impl RepositoryConfig {
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let config: RepositoryConfig = serde_yaml::from_str(content)?;
        for repo in &config.repositories {
            if repo.id.is_empty() || repo.url.is_empty() {
                return Err(ConfigError::Validation(
                    "repository entries need both 'id' and 'url'".to_string(),
                ));
            }
        }
        Ok(config)
    }

    /// Load the repository list.
    ///
    /// An explicit path must exist. Without one, `launcher-repositories.yaml`
    /// in the working directory is used if present, else Maven Central.
    pub fn load(explicit: Option<&Path>, workdir: &Path) -> Result<Self, ConfigError> {
        let path = match explicit {
            Some(p) => p.to_path_buf(),
            None => {
                let candidate = workdir.join(DEFAULT_REPOSITORY_CONFIG);
                if !candidate.is_file() {
                    log::debug!("Using built-in repository configuration");
                    return Ok(Self::default());
                }
                candidate
            }
        };

        let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::Io {
            path: path.clone(),
            source: e,
        })?;
        let config = Self::from_yaml(&content)?;
        log::debug!(
            "Configured {} remote repositories from {}",
            config.repositories.len(),
            path.display()
        );
        Ok(config)
    }
}

/// Local repository cache: `$MODHOST_LOCAL_REPOSITORY`, else `~/.m2/repository`
pub fn local_repository() -> PathBuf {
    if let Ok(dir) = std::env::var(LOCAL_REPOSITORY_ENV) {
        if !dir.is_empty() {
            return PathBuf::from(dir);
        }
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".m2")
        .join("repository")
}
