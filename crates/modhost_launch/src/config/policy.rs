//! Permission policy installed into the host on a clean start

use crate::config::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;

fn default_allow() -> bool {
    true
}

/// One permission grant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionGrant {
    pub name: String,
    /// Location pattern the grant applies to, e.g. `file:./bin/*`; all locations when absent
    #[serde(default)]
    pub location: Option<String>,
    pub permissions: Vec<String>,
    #[serde(default = "default_allow")]
    pub allow: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionPolicy {
    #[serde(default)]
    pub grants: Vec<PermissionGrant>,
}

impl PermissionPolicy {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let policy: PermissionPolicy = serde_yaml::from_str(content)?;
        for grant in &policy.grants {
            if grant.name.is_empty() {
                return Err(ConfigError::Validation(
                    "permission grants need a 'name'".to_string(),
                ));
            }
            if grant.permissions.is_empty() {
                return Err(ConfigError::Validation(format!(
                    "Grant '{}': no permissions listed",
                    grant.name
                )));
            }
        }
        Ok(policy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_policy() {
        let yaml = r#"
grants:
  - name: all-local
    location: "file:./bin/*"
    permissions: ["fs.read", "net.connect"]
  - name: deny-exec
    permissions: ["process.exec"]
    allow: false
"#;
        let policy = PermissionPolicy::from_yaml(yaml).unwrap();
        assert_eq!(policy.grants.len(), 2);
        assert!(policy.grants[0].allow);
        assert!(!policy.grants[1].allow);
        assert_eq!(policy.grants[1].location, None);
    }

    #[test]
    fn test_empty_permissions_rejected() {
        let yaml = r#"
grants:
  - name: empty
    permissions: []
"#;
        assert!(PermissionPolicy::from_yaml(yaml).is_err());
    }
}
