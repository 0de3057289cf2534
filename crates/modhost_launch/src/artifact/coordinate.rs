//! Repository coordinates `group:artifact[:extension[:classifier]]:version`

use regex::Regex;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::LazyLock;

/// Extension used when a coordinate does not name one
pub const DEFAULT_EXTENSION: &str = "tgz";

static COORDINATE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([^: ]+):([^: ]+)(:([^: ]*)(:([^: ]+))?)?:([^: ]+)$").unwrap()
});

/// Errors raised for malformed coordinates
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoordinateError {
    #[error("Invalid coordinate '{0}', expected <group>:<artifact>[:<extension>[:<classifier>]]:<version>")]
    Invalid(String),
}

/// A parsed repository coordinate
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Coordinate {
    pub group: String,
    pub artifact: String,
    pub extension: String,
    pub classifier: Option<String>,
    /// Concrete version or a version range such as `[1.0,2.0)`
    pub version: String,
}

impl Coordinate {
    /// Whether a raw string has the shape of a coordinate
    pub fn matches(raw: &str) -> bool {
        COORDINATE_PATTERN.is_match(raw.trim())
    }

    pub fn with_version(&self, version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            ..self.clone()
        }
    }

    /// Directory holding every version of this artifact, relative to a repository root
    pub fn artifact_dir(&self) -> PathBuf {
        let mut path: PathBuf = self.group.split('.').collect();
        path.push(&self.artifact);
        path
    }

    /// File name inside a repository version directory
    pub fn repository_file_name(&self) -> String {
        match &self.classifier {
            Some(c) => format!("{}-{}-{}.{}", self.artifact, self.version, c, self.extension),
            None => format!("{}-{}.{}", self.artifact, self.version, self.extension),
        }
    }

    /// Relative repository path of the artifact file
    pub fn repository_path(&self) -> PathBuf {
        self.artifact_dir()
            .join(&self.version)
            .join(self.repository_file_name())
    }

    /// File name used when the artifact is looked up in a local bin directory
    pub fn bin_file_name(&self) -> String {
        format!(
            "{}.{}-{}.{}",
            self.group, self.artifact, self.version, self.extension
        )
    }
}

impl FromStr for Coordinate {
    type Err = CoordinateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.trim();
        let caps = COORDINATE_PATTERN
            .captures(raw)
            .ok_or_else(|| CoordinateError::Invalid(s.to_string()))?;

        let group = caps[1].to_string();
        let artifact = caps[2].to_string();
        let extension = caps
            .get(4)
            .map(|m| m.as_str())
            .filter(|e| !e.is_empty())
            .unwrap_or(DEFAULT_EXTENSION)
            .to_string();
        let classifier = caps.get(6).map(|m| m.as_str().to_string());
        let version = caps[7].to_string();

        Ok(Self {
            group,
            artifact,
            extension,
            classifier,
            version,
        })
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.group, self.artifact)?;
        if self.extension != DEFAULT_EXTENSION || self.classifier.is_some() {
            write!(f, ":{}", self.extension)?;
        }
        if let Some(c) = &self.classifier {
            write!(f, ":{}", c)?;
        }
        write!(f, ":{}", self.version)
    }
}
