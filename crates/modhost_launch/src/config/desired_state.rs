//! Desired-state YAML schema definitions

use crate::artifact::{
    ArtifactIdentity, ArtifactSpec, Coordinate, Version, DEFAULT_BIN_DIR, DEFAULT_START_LEVEL,
};
use crate::config::ConfigError;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Coordinate of the host's root artifact when the file does not name one
pub const DEFAULT_HOST_COORDINATE: &str = "org.modhost:modhost-core:1.0.0";

/// Bin directory searched for the root artifact when the file does not name one
pub const DEFAULT_HOST_BIN_DIR: &str = "bin/system";

/// Root desired-state configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DesiredState {
    /// File format version
    #[serde(default = "default_version")]
    pub version: String,

    /// The host's own root artifact
    #[serde(default)]
    pub host: HostArtifact,

    /// Runtime storage directory of the host
    #[serde(default = "default_storage")]
    pub storage: PathBuf,

    /// Free-form runtime properties handed to the host
    #[serde(default)]
    pub properties: IndexMap<String, PropertyValue>,

    /// Paths purged on a clean start
    #[serde(default)]
    pub delete_on_clean: Vec<PathBuf>,

    /// Desired artifacts, in declaration order
    #[serde(default)]
    pub artifacts: Vec<ArtifactEntry>,
}

fn default_version() -> String {
    "1.0".to_string()
}

fn default_storage() -> PathBuf {
    PathBuf::from("data/host-storage")
}

fn default_start_level() -> u32 {
    DEFAULT_START_LEVEL
}

fn default_start() -> bool {
    true
}

fn default_bin_dir() -> PathBuf {
    PathBuf::from(DEFAULT_BIN_DIR)
}

fn default_host_bin_dir() -> PathBuf {
    PathBuf::from(DEFAULT_HOST_BIN_DIR)
}

/// Root artifact reference
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostArtifact {
    #[serde(default)]
    pub coordinate: Option<String>,

    #[serde(default)]
    pub file: Option<String>,

    #[serde(default = "default_host_bin_dir")]
    pub bin_dir: PathBuf,
}

impl Default for HostArtifact {
    fn default() -> Self {
        Self {
            coordinate: Some(DEFAULT_HOST_COORDINATE.to_string()),
            file: None,
            bin_dir: default_host_bin_dir(),
        }
    }
}

/// Property values can be strings, booleans, or numbers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl PropertyValue {
    pub fn as_str(&self) -> String {
        match self {
            PropertyValue::Bool(b) => b.to_string(),
            PropertyValue::Int(i) => i.to_string(),
            PropertyValue::Float(f) => f.to_string(),
            PropertyValue::String(s) => s.clone(),
        }
    }
}

/// One desired artifact
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactEntry {
    /// Repository coordinate `group:artifact[:extension[:classifier]]:version`.
    /// Mutually exclusive with `file` and `name`
    #[serde(default)]
    pub coordinate: Option<String>,

    /// File name below `bin_dir`
    #[serde(default)]
    pub file: Option<String>,

    /// Artifact name, requires `version`
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub version: Option<String>,

    #[serde(default = "default_start_level")]
    pub start_level: u32,

    /// Whether the artifact is started after installation
    #[serde(default = "default_start")]
    pub start: bool,

    #[serde(default = "default_bin_dir")]
    pub bin_dir: PathBuf,
}

impl ArtifactEntry {
    fn describe(&self, index: usize) -> String {
        self.coordinate
            .clone()
            .or_else(|| self.file.clone())
            .or_else(|| self.name.clone())
            .unwrap_or_else(|| format!("#{}", index + 1))
    }

    fn validate(&self, index: usize) -> Result<(), ConfigError> {
        let label = self.describe(index);
        let sources = [
            self.coordinate.is_some(),
            self.file.is_some(),
            self.name.is_some(),
        ]
        .iter()
        .filter(|s| **s)
        .count();

        match sources {
            1 => {}
            0 => {
                return Err(ConfigError::Validation(format!(
                    "Artifact '{}': must specify one of 'coordinate', 'file' or 'name'+'version'",
                    label
                )))
            }
            _ => {
                return Err(ConfigError::Validation(format!(
                    "Artifact '{}': 'coordinate', 'file' and 'name' are mutually exclusive",
                    label
                )))
            }
        }

        match (&self.name, &self.version) {
            (Some(_), None) => {
                return Err(ConfigError::Validation(format!(
                    "Artifact '{}': 'name' requires 'version' to be specified",
                    label
                )));
            }
            (Some(_), Some(v)) => {
                v.parse::<Version>().map_err(|e| {
                    ConfigError::Validation(format!("Artifact '{}': {}", label, e))
                })?;
            }
            (None, Some(_)) if self.coordinate.is_some() || self.file.is_some() => {
                return Err(ConfigError::Validation(format!(
                    "Artifact '{}': 'version' is only valid together with 'name'",
                    label
                )));
            }
            _ => {}
        }

        if let Some(c) = &self.coordinate {
            if !Coordinate::matches(c) {
                // kept: the repository resolver declines it and it is reported as unresolved
                log::warn!("Artifact '{}': not a valid repository coordinate", c);
            }
        }

        Ok(())
    }

    /// Build the desired-state record for one resolution pass
    pub fn to_spec(&self) -> ArtifactSpec {
        let spec = if let Some(c) = &self.coordinate {
            ArtifactSpec::from_coordinate(c.clone())
        } else if let Some(f) = &self.file {
            ArtifactSpec::from_file(f.clone())
        } else {
            let version = self
                .version
                .as_deref()
                .and_then(|v| v.parse().ok())
                .unwrap_or_default();
            let name = self.name.clone().unwrap_or_default();
            ArtifactSpec::from_identity(ArtifactIdentity::new(name, version))
        };
        spec.with_start_level(self.start_level)
            .with_auto_start(self.start)
            .with_bin_dir(self.bin_dir.clone())
    }
}

impl DesiredState {
    /// Load the desired state from a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_yaml(&content)
    }

    /// Parse the desired state from a YAML string
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let state: DesiredState = serde_yaml::from_str(content)?;
        state.validate()?;
        Ok(state)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.coordinate.is_some() == self.host.file.is_some() {
            return Err(ConfigError::Validation(
                "host: must specify exactly one of 'coordinate' or 'file'".to_string(),
            ));
        }
        for (i, entry) in self.artifacts.iter().enumerate() {
            entry.validate(i)?;
        }
        Ok(())
    }

    /// Records for every desired artifact, in declaration order
    pub fn specs(&self) -> Vec<ArtifactSpec> {
        self.artifacts.iter().map(ArtifactEntry::to_spec).collect()
    }

    /// Record for the host's root artifact
    pub fn host_spec(&self) -> ArtifactSpec {
        let spec = match (&self.host.coordinate, &self.host.file) {
            (Some(c), _) => ArtifactSpec::from_coordinate(c.clone()),
            (None, Some(f)) => ArtifactSpec::from_file(f.clone()),
            (None, None) => ArtifactSpec::from_coordinate(DEFAULT_HOST_COORDINATE),
        };
        spec.with_bin_dir(self.host.bin_dir.clone()).with_start_level(0)
    }

    /// Properties rendered as strings, in declaration order
    pub fn property_strings(&self) -> IndexMap<String, String> {
        self.properties
            .iter()
            .map(|(k, v)| (k.clone(), v.as_str()))
            .collect()
    }
}
