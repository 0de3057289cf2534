//! Module host abstraction
//!
//! A module host installs, updates, starts and stops versioned artifacts
//! while running. The provisioning pipeline only talks to hosts through
//! [`ModuleHost`]; [`LocalHost`] is the built-in implementation.

mod local;
mod process;

pub use local::*;
pub use process::*;

use crate::artifact::{
    content::ContentError, ArtifactIdentity, ArtifactKind, ArtifactLocation, ArtifactSpec,
    ExtensionTarget, ManifestError, Version,
};
use crate::config::PermissionPolicy;
use async_trait::async_trait;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Deref;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex, MutexGuard};

/// Host-assigned artifact id; the root artifact is always 0
pub type ArtifactId = u64;

/// Id of the host's own root artifact
pub const ROOT_ARTIFACT_ID: ArtifactId = 0;

/// Lifecycle state of the host or of one installed artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    Installed,
    Resolved,
    Starting,
    Active,
    Stopping,
    Uninstalled,
}

impl LifecycleState {
    pub fn is_running(&self) -> bool {
        matches!(self, LifecycleState::Active | LifecycleState::Starting)
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LifecycleState::Installed => "INSTALLED",
            LifecycleState::Resolved => "RESOLVED",
            LifecycleState::Starting => "STARTING",
            LifecycleState::Active => "ACTIVE",
            LifecycleState::Stopping => "STOPPING",
            LifecycleState::Uninstalled => "UNINSTALLED",
        };
        f.write_str(s)
    }
}

/// Why the host stopped, as reported by [`ModuleHost::wait_for_stop`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopEvent {
    /// Regular stop
    Stopped,
    /// Stopped because its root artifact was updated
    StoppedUpdate,
    /// A host extension changed; the host needs a fresh loader context
    BootclasspathModified,
    /// The whole system was refreshed; in-process state is unusable
    SystemRefreshed,
    /// The wait timed out before the host stopped
    WaitTimedOut,
    /// Any other code
    Other(i32),
}

/// Asynchronous notifications emitted by a host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostEvent {
    Started,
    StartLevelChanged(u32),
    PackagesRefreshed,
}

/// One artifact as seen by the host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstalledArtifact {
    pub id: ArtifactId,
    pub name: String,
    pub version: Version,
    pub location: ArtifactLocation,
    pub state: LifecycleState,
    pub kind: ArtifactKind,
    #[serde(default)]
    pub extension: Option<ExtensionTarget>,
    pub start_level: u32,
}

impl InstalledArtifact {
    pub fn identity(&self) -> ArtifactIdentity {
        ArtifactIdentity::new(self.name.clone(), self.version.clone())
    }

    pub fn is_fragment(&self) -> bool {
        self.kind == ArtifactKind::Fragment
    }
}

/// Settings a host is created with
#[derive(Debug, Clone)]
pub struct HostConfig {
    pub workdir: PathBuf,
    pub storage: PathBuf,
    pub properties: IndexMap<String, String>,
}

/// Errors reported by module hosts
#[derive(Debug, thiserror::Error)]
pub enum HostError {
    /// The host re-initialised underneath the caller; its handle must be refreshed
    #[error("Host context is no longer valid")]
    ContextInvalidated,

    #[error("Unknown artifact id {0}")]
    UnknownArtifact(ArtifactId),

    #[error("Operation not supported: {0}")]
    Unsupported(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Security policy rejected: {0}")]
    Security(String),

    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error(transparent)]
    Content(#[from] ContentError),

    #[error(transparent)]
    Process(#[from] ProcessError),

    #[error("Failed to persist host state: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Operations the provisioning pipeline needs from a module host
#[async_trait]
pub trait ModuleHost: Send + Sync {
    /// Name of the root artifact the host runs from
    fn root_name(&self) -> String;

    /// Prepare the host; loads whatever it persisted on a previous run
    async fn init(&self) -> Result<(), HostError>;

    async fn start(&self) -> Result<(), HostError>;

    async fn stop(&self) -> Result<(), HostError>;

    async fn state(&self) -> LifecycleState;

    /// Block until the host stops, or until `timeout` elapses.
    ///
    /// Returns immediately with the last stop reason when the host is not running.
    async fn wait_for_stop(&self, timeout: Option<Duration>) -> StopEvent;

    fn subscribe(&self) -> broadcast::Receiver<HostEvent>;

    async fn installed(&self) -> Result<Vec<InstalledArtifact>, HostError>;

    async fn artifact_state(&self, id: ArtifactId) -> Option<LifecycleState>;

    async fn install(&self, location: &ArtifactLocation) -> Result<InstalledArtifact, HostError>;

    async fn update(
        &self,
        id: ArtifactId,
        location: &ArtifactLocation,
    ) -> Result<InstalledArtifact, HostError>;

    async fn uninstall(&self, id: ArtifactId) -> Result<(), HostError>;

    async fn start_artifact(&self, id: ArtifactId) -> Result<(), HostError>;

    async fn set_artifact_start_level(&self, id: ArtifactId, level: u32) -> Result<(), HostError>;

    async fn start_threshold(&self) -> u32;

    /// Raise or lower the running threshold; emits [`HostEvent::StartLevelChanged`]
    async fn set_start_threshold(&self, level: u32) -> Result<(), HostError>;

    /// Start level given to artifacts installed from now on
    async fn set_initial_artifact_start_level(&self, level: u32) -> Result<(), HostError>;

    /// Artifacts affected by refreshing `ids`, including pending removals
    async fn removal_pending_closure(
        &self,
        ids: &[ArtifactId],
    ) -> Result<Vec<InstalledArtifact>, HostError>;

    /// Refresh `ids`; emits [`HostEvent::PackagesRefreshed`] or stops the host
    async fn refresh(&self, ids: &[ArtifactId]) -> Result<(), HostError>;

    /// Re-acquire the host's own context after [`HostError::ContextInvalidated`]
    async fn reattach(&self) -> Result<(), HostError>;

    async fn install_permissions(&self, policy: &PermissionPolicy) -> Result<(), HostError>;
}

/// Shared host reference plus the coarse control lock.
///
/// The lock is held for threshold changes and for refresh or restart
/// decisions, never for plain artifact operations.
#[derive(Clone)]
pub struct HostHandle {
    host: Arc<dyn ModuleHost>,
    control: Arc<Mutex<()>>,
}

impl HostHandle {
    pub fn new(host: Arc<dyn ModuleHost>) -> Self {
        Self {
            host,
            control: Arc::new(Mutex::new(())),
        }
    }

    pub async fn lock_control(&self) -> MutexGuard<'_, ()> {
        self.control.lock().await
    }

    pub fn host(&self) -> &Arc<dyn ModuleHost> {
        &self.host
    }
}

impl Deref for HostHandle {
    type Target = dyn ModuleHost;

    fn deref(&self) -> &Self::Target {
        self.host.as_ref()
    }
}

impl fmt::Debug for HostHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostHandle")
            .field("root", &self.host.root_name())
            .finish()
    }
}

/// Creates hosts from the resolved root artifact
#[async_trait]
pub trait HostFactory: Send + Sync {
    async fn create(
        &self,
        root: &ArtifactSpec,
        config: &HostConfig,
    ) -> Result<HostHandle, HostError>;
}
