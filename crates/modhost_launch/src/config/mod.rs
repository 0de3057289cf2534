//! Desired-state file, launch options, repository and permission configuration

mod desired_state;
mod options;
mod policy;
mod repositories;

pub use desired_state::*;
pub use options::*;
pub use policy::*;
pub use repositories::*;

use std::path::PathBuf;

/// Errors that can occur when loading configuration files
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Validation error: {0}")]
    Validation(String),
}
