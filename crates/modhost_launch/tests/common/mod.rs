//! Test helpers: a scripted module host and artifact fixtures

#![allow(dead_code)]

use async_trait::async_trait;
use modhost_launch::artifact::{
    read_manifest, ArtifactKind, ArtifactLocation, ArtifactSpec, Version, MANIFEST_FILE,
};
use modhost_launch::config::PermissionPolicy;
use modhost_launch::host::{
    ArtifactId, HostConfig, HostError, HostEvent, HostFactory, HostHandle, InstalledArtifact,
    LifecycleState, ModuleHost, StopEvent, ROOT_ARTIFACT_ID,
};
use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;

/// Host operations recorded by [`ScriptedHost`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Install(String),
    Update(ArtifactId, String),
    Uninstall(ArtifactId),
    SetLevel(String, u32),
    Start(String),
    Threshold(u32),
    Refresh(Vec<ArtifactId>),
    Reattach,
}

struct State {
    artifacts: Vec<InstalledArtifact>,
    next_id: ArtifactId,
    calls: Vec<Call>,
    state: LifecycleState,
    threshold: u32,
    stop_events: VecDeque<StopEvent>,
    state_after_stop: LifecycleState,
    fail_names: HashSet<String>,
    invalidate_next: bool,
    invalidate_name: Option<String>,
    ack_refresh: bool,
}

/// In-memory host whose stop events and failures are scripted by the test
pub struct ScriptedHost {
    workdir: PathBuf,
    state: Mutex<State>,
    events: broadcast::Sender<HostEvent>,
}

impl ScriptedHost {
    pub fn new(workdir: &Path) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            workdir: workdir.to_path_buf(),
            state: Mutex::new(State {
                artifacts: vec![InstalledArtifact {
                    id: ROOT_ARTIFACT_ID,
                    name: "core-host".to_string(),
                    version: "1.0.0".parse().unwrap(),
                    location: ArtifactLocation::File("bin/system/core-host".into()),
                    state: LifecycleState::Resolved,
                    kind: ArtifactKind::Regular,
                    extension: None,
                    start_level: 0,
                }],
                next_id: 1,
                calls: Vec::new(),
                state: LifecycleState::Installed,
                threshold: 0,
                stop_events: VecDeque::new(),
                state_after_stop: LifecycleState::Resolved,
                fail_names: HashSet::new(),
                invalidate_next: false,
                invalidate_name: None,
                ack_refresh: true,
            }),
            events,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    /// Pretend `name@version` was installed by an earlier run
    pub fn with_installed(self, name: &str, version: &str, location: &str) -> Self {
        {
            let mut s = self.lock();
            let id = s.next_id;
            s.next_id += 1;
            s.artifacts.push(InstalledArtifact {
                id,
                name: name.to_string(),
                version: version.parse().unwrap(),
                location: ArtifactLocation::File(location.into()),
                state: LifecycleState::Resolved,
                kind: ArtifactKind::Regular,
                extension: None,
                start_level: 4,
            });
        }
        self
    }

    /// Events returned by successive `wait_for_stop` calls
    pub fn with_stop_events(self, events: &[StopEvent]) -> Self {
        self.lock().stop_events.extend(events.iter().copied());
        self
    }

    /// State the host reports after a scripted stop
    pub fn with_state_after_stop(self, state: LifecycleState) -> Self {
        self.lock().state_after_stop = state;
        self
    }

    /// Installs and updates of this name fail
    pub fn failing(self, name: &str) -> Self {
        self.lock().fail_names.insert(name.to_string());
        self
    }

    /// The next install or update reports a stale host context
    pub fn invalidate_once(self) -> Self {
        self.lock().invalidate_next = true;
        self
    }

    /// The first install or update of `name` (or `name@version`) reports a
    /// stale host context
    pub fn invalidate_on(self, name: &str) -> Self {
        self.lock().invalidate_name = Some(name.to_string());
        self
    }

    pub fn without_refresh_ack(self) -> Self {
        self.lock().ack_refresh = false;
        self
    }

    pub fn set_state(&self, state: LifecycleState) {
        self.lock().state = state;
    }

    pub fn set_artifact_state(&self, id: ArtifactId, state: LifecycleState) {
        if let Some(a) = self.lock().artifacts.iter_mut().find(|a| a.id == id) {
            a.state = state;
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    pub fn threshold(&self) -> u32 {
        self.lock().threshold
    }

    pub fn artifacts(&self) -> Vec<InstalledArtifact> {
        self.lock().artifacts.clone()
    }

    /// Scripted failures match either `name` or `name@version`
    fn check_failure(&self, name: &str, version: &Version) -> Result<(), HostError> {
        let label = format!("{}@{}", name, version);
        let matches = |n: &str| n == name || n == label;
        let mut s = self.lock();
        if s.invalidate_next {
            s.invalidate_next = false;
            return Err(HostError::ContextInvalidated);
        }
        if s.invalidate_name.as_deref().is_some_and(matches) {
            s.invalidate_name = None;
            return Err(HostError::ContextInvalidated);
        }
        if s.fail_names.iter().any(|n| matches(n)) {
            return Err(HostError::InvalidState(format!("{} refused", label)));
        }
        Ok(())
    }

    fn name_of(&self, id: ArtifactId) -> String {
        self.lock()
            .artifacts
            .iter()
            .find(|a| a.id == id)
            .map(|a| a.name.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ModuleHost for ScriptedHost {
    fn root_name(&self) -> String {
        "core-host".to_string()
    }

    async fn init(&self) -> Result<(), HostError> {
        self.lock().state = LifecycleState::Starting;
        Ok(())
    }

    async fn start(&self) -> Result<(), HostError> {
        self.lock().state = LifecycleState::Active;
        let _ = self.events.send(HostEvent::Started);
        Ok(())
    }

    async fn stop(&self) -> Result<(), HostError> {
        let mut s = self.lock();
        s.state = LifecycleState::Resolved;
        s.stop_events.push_front(StopEvent::Stopped);
        Ok(())
    }

    async fn state(&self) -> LifecycleState {
        self.lock().state
    }

    async fn wait_for_stop(&self, timeout: Option<Duration>) -> StopEvent {
        let next = {
            let mut s = self.lock();
            let next = s.stop_events.pop_front();
            if next.is_some() {
                s.state = s.state_after_stop;
            }
            next
        };
        match (next, timeout) {
            (Some(event), _) => event,
            (None, Some(t)) => {
                tokio::time::sleep(t).await;
                StopEvent::WaitTimedOut
            }
            (None, None) => StopEvent::Stopped,
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<HostEvent> {
        self.events.subscribe()
    }

    async fn installed(&self) -> Result<Vec<InstalledArtifact>, HostError> {
        Ok(self.lock().artifacts.clone())
    }

    async fn artifact_state(&self, id: ArtifactId) -> Option<LifecycleState> {
        self.lock()
            .artifacts
            .iter()
            .find(|a| a.id == id)
            .map(|a| a.state)
    }

    async fn install(&self, location: &ArtifactLocation) -> Result<InstalledArtifact, HostError> {
        let manifest = read_manifest(&location.resolve(&self.workdir))?;
        self.check_failure(&manifest.name, &manifest.version)?;
        let mut s = self.lock();
        let id = s.next_id;
        s.next_id += 1;
        let artifact = InstalledArtifact {
            id,
            name: manifest.name.clone(),
            version: manifest.version.clone(),
            location: location.clone(),
            state: LifecycleState::Installed,
            kind: manifest.kind,
            extension: manifest.extension,
            start_level: 4,
        };
        s.calls.push(Call::Install(format!("{}@{}", manifest.name, manifest.version)));
        s.artifacts.push(artifact.clone());
        Ok(artifact)
    }

    async fn update(
        &self,
        id: ArtifactId,
        location: &ArtifactLocation,
    ) -> Result<InstalledArtifact, HostError> {
        let manifest = read_manifest(&location.resolve(&self.workdir))?;
        self.check_failure(&manifest.name, &manifest.version)?;
        let mut s = self.lock();
        s.calls.push(Call::Update(id, format!("{}@{}", manifest.name, manifest.version)));
        let artifact = s
            .artifacts
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or(HostError::UnknownArtifact(id))?;
        artifact.version = manifest.version;
        artifact.location = location.clone();
        Ok(artifact.clone())
    }

    async fn uninstall(&self, id: ArtifactId) -> Result<(), HostError> {
        let mut s = self.lock();
        s.calls.push(Call::Uninstall(id));
        s.artifacts.retain(|a| a.id != id);
        Ok(())
    }

    async fn start_artifact(&self, id: ArtifactId) -> Result<(), HostError> {
        let name = self.name_of(id);
        let mut s = self.lock();
        s.calls.push(Call::Start(name));
        if let Some(a) = s.artifacts.iter_mut().find(|a| a.id == id) {
            a.state = LifecycleState::Active;
        }
        Ok(())
    }

    async fn set_artifact_start_level(&self, id: ArtifactId, level: u32) -> Result<(), HostError> {
        let name = self.name_of(id);
        let mut s = self.lock();
        s.calls.push(Call::SetLevel(name, level));
        if let Some(a) = s.artifacts.iter_mut().find(|a| a.id == id) {
            a.start_level = level;
        }
        Ok(())
    }

    async fn start_threshold(&self) -> u32 {
        self.lock().threshold
    }

    async fn set_start_threshold(&self, level: u32) -> Result<(), HostError> {
        {
            let mut s = self.lock();
            s.threshold = level;
            s.calls.push(Call::Threshold(level));
        }
        let _ = self.events.send(HostEvent::StartLevelChanged(level));
        Ok(())
    }

    async fn set_initial_artifact_start_level(&self, _level: u32) -> Result<(), HostError> {
        Ok(())
    }

    async fn removal_pending_closure(
        &self,
        ids: &[ArtifactId],
    ) -> Result<Vec<InstalledArtifact>, HostError> {
        Ok(self
            .lock()
            .artifacts
            .iter()
            .filter(|a| ids.contains(&a.id))
            .cloned()
            .collect())
    }

    async fn refresh(&self, ids: &[ArtifactId]) -> Result<(), HostError> {
        let ack = {
            let mut s = self.lock();
            s.calls.push(Call::Refresh(ids.to_vec()));
            s.ack_refresh
        };
        if ack {
            let _ = self.events.send(HostEvent::PackagesRefreshed);
        }
        Ok(())
    }

    async fn reattach(&self) -> Result<(), HostError> {
        self.lock().calls.push(Call::Reattach);
        Ok(())
    }

    async fn install_permissions(&self, _policy: &PermissionPolicy) -> Result<(), HostError> {
        Ok(())
    }
}

/// Factory handing out one shared [`ScriptedHost`]
pub struct ScriptedFactory {
    pub host: Arc<ScriptedHost>,
    pub created: Mutex<usize>,
}

impl ScriptedFactory {
    pub fn new(host: ScriptedHost) -> Self {
        Self {
            host: Arc::new(host),
            created: Mutex::new(0),
        }
    }
}

#[async_trait]
impl HostFactory for ScriptedFactory {
    async fn create(
        &self,
        _root: &ArtifactSpec,
        _config: &HostConfig,
    ) -> Result<HostHandle, HostError> {
        *self.created.lock().unwrap() += 1;
        Ok(HostHandle::new(self.host.clone()))
    }
}

/// Write a directory artifact with a manifest below `root`
pub fn artifact_dir(root: &Path, rel: &str, name: &str, version: &str) -> PathBuf {
    let dir = root.join(rel);
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(
        dir.join(MANIFEST_FILE),
        format!("name: {}\nversion: \"{}\"\n", name, version),
    )
    .unwrap();
    dir
}

/// A resolved desired record pointing at `rel`
pub fn resolved_spec(name: &str, version: &str, rel: &str, level: u32) -> ArtifactSpec {
    let mut spec = ArtifactSpec::from_identity(modhost_launch::ArtifactIdentity::new(
        name,
        version.parse().unwrap(),
    ))
    .with_start_level(level);
    spec.set_preferred_location(ArtifactLocation::File(rel.into()))
        .unwrap();
    spec.mark_resolved();
    spec
}
