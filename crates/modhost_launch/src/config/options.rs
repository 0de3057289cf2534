//! Launch options consumed by the provisioning pipeline

use std::path::PathBuf;
use std::time::Duration;

/// Default wait for a refresh the host does not confirm by event
pub const DEFAULT_REFRESH_TIMEOUT: Duration = Duration::from_millis(5000);

/// What to do with installed artifacts that the desired state does not mention
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExtraneousPolicy {
    /// Report them and leave them installed
    #[default]
    Keep,
    Uninstall,
}

/// What to do with desired versions of a name left over after matching installed ones
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DuplicatePolicy {
    /// Match existing installations, install the rest as additional entries
    #[default]
    InstallRemaining,
    /// Only update existing installations of a name
    MatchOnly,
}

/// Options for one provisioning pass
#[derive(Debug, Clone)]
pub struct LaunchOptions {
    /// Working directory; relative file locations are taken from here
    pub workdir: PathBuf,
    /// Never contact remote repositories
    pub offline: bool,
    /// Abort the pass on the first install or update failure
    pub strict: bool,
    /// Wipe host storage before provisioning
    pub clean: bool,
    /// Re-resolve and update installed artifacts on a non-clean start
    pub update_existing: bool,
    /// Only look for artifacts in bin directories below the working directory
    pub rundir_only: bool,
    /// Development workspace scanned for live build outputs
    pub workspace: Option<PathBuf>,
    /// Console port handed to the host as a property
    pub console_port: Option<u16>,
    /// Repository configuration file
    pub repositories: Option<PathBuf>,
    /// Bound on waits for refreshes the host does not confirm by event
    pub refresh_timeout: Duration,
    /// Final start threshold, overrides the computed one
    pub start_level: Option<u32>,
    /// Install file locations by reference instead of copying them
    pub use_references: bool,
    /// Permission policy installed on a clean start
    pub security: Option<PathBuf>,
    pub extraneous: ExtraneousPolicy,
    pub duplicates: DuplicatePolicy,
    /// Set on in-process restarts
    pub restart: bool,
}

impl Default for LaunchOptions {
    fn default() -> Self {
        Self {
            workdir: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            offline: false,
            strict: false,
            clean: false,
            update_existing: false,
            rundir_only: false,
            workspace: None,
            console_port: None,
            repositories: None,
            refresh_timeout: DEFAULT_REFRESH_TIMEOUT,
            start_level: None,
            use_references: false,
            security: None,
            extraneous: ExtraneousPolicy::default(),
            duplicates: DuplicatePolicy::default(),
            restart: false,
        }
    }
}

impl LaunchOptions {
    /// Set the refresh timeout in milliseconds; zero is raised to one
    pub fn with_refresh_timeout_ms(mut self, ms: u64) -> Self {
        self.refresh_timeout = Duration::from_millis(ms.max(1));
        self
    }

    /// Options for an in-process restart: storage is never wiped again
    pub fn for_restart(&self) -> Self {
        Self {
            clean: false,
            update_existing: false,
            restart: true,
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_refresh_timeout_clamped() {
        let opts = LaunchOptions::default().with_refresh_timeout_ms(0);
        assert_eq!(opts.refresh_timeout, Duration::from_millis(1));
        assert_eq!(LaunchOptions::default().refresh_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_for_restart_drops_clean_and_update() {
        let opts = LaunchOptions {
            clean: true,
            update_existing: true,
            strict: true,
            ..Default::default()
        };
        let restart = opts.for_restart();
        assert!(!restart.clean);
        assert!(!restart.update_existing);
        assert!(restart.strict);
        assert!(restart.restart);
    }
}
