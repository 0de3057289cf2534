//! Built-in module host running artifacts out of local storage
//!
//! The host keeps its artifact table in memory and persists it to
//! `<storage>/host-state.json`, so a non-clean run sees what earlier runs
//! installed. Artifact content is copied into `<storage>/artifacts/<id>`
//! unless it is installed by reference. Started artifacts whose level is
//! within the running threshold are active; an artifact with a `command`
//! in its manifest runs it as a child process while active.

use crate::artifact::{
    content, read_manifest, ArtifactKind, ArtifactLocation, ArtifactManifest, ArtifactSpec,
    ExtensionTarget,
};
use crate::config::PermissionPolicy;
use crate::host::{
    log_process_event, ArtifactId, HostConfig, HostError, HostEvent, HostFactory, HostHandle,
    InstalledArtifact, LifecycleState, ManagedProcess, ModuleHost, ProcessEvent, ProcessSpec,
    StopEvent, ROOT_ARTIFACT_ID,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch, Mutex};

/// Persisted artifact table inside the storage directory
pub const STATE_FILE: &str = "host-state.json";

const ARTIFACTS_DIR: &str = "artifacts";

/// Threshold the host runs at right after start
const BEGINNING_THRESHOLD: u32 = 1;

const PROCESS_STOP_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ArtifactRecord {
    info: InstalledArtifact,
    manifest: ArtifactManifest,
    /// Directory or archive the artifact runs from
    content: PathBuf,
    /// Persistently started; active whenever its level is within the threshold
    started: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct PersistedState {
    initial_level: u32,
    next_id: ArtifactId,
    artifacts: Vec<ArtifactRecord>,
}

struct Inner {
    state: LifecycleState,
    initialized: bool,
    threshold: u32,
    initial_level: u32,
    next_id: ArtifactId,
    artifacts: BTreeMap<ArtifactId, ArtifactRecord>,
    processes: HashMap<ArtifactId, ManagedProcess>,
    /// Updated or removed since the last refresh
    pending_refresh: BTreeSet<ArtifactId>,
    /// Stop the next refresh turns into, set by root and extension updates
    pending_stop: Option<StopEvent>,
    last_stop: Option<StopEvent>,
    permissions: Option<PermissionPolicy>,
}

/// Restart severity: a fresh process beats a fresh loader beats a plain restart
fn severity(event: StopEvent) -> u8 {
    match event {
        StopEvent::SystemRefreshed => 3,
        StopEvent::BootclasspathModified => 2,
        StopEvent::StoppedUpdate => 1,
        _ => 0,
    }
}

pub struct LocalHost {
    root: ArtifactRecord,
    config: HostConfig,
    inner: Mutex<Inner>,
    events: broadcast::Sender<HostEvent>,
    changes: watch::Sender<u64>,
    process_tx: mpsc::UnboundedSender<(String, ProcessEvent)>,
    process_rx: std::sync::Mutex<Option<mpsc::UnboundedReceiver<(String, ProcessEvent)>>>,
}

impl LocalHost {
    /// Create a host running from the root artifact at `root`
    pub fn new(root: ArtifactLocation, config: HostConfig) -> Result<Self, HostError> {
        let root_path = root.resolve(&config.workdir);
        let manifest = read_manifest(&root_path)?;
        let root = ArtifactRecord {
            info: InstalledArtifact {
                id: ROOT_ARTIFACT_ID,
                name: manifest.name.clone(),
                version: manifest.version.clone(),
                location: root,
                state: LifecycleState::Installed,
                kind: ArtifactKind::Regular,
                extension: None,
                start_level: 0,
            },
            manifest,
            content: root_path,
            started: true,
        };

        let (events, _) = broadcast::channel(64);
        let (changes, _) = watch::channel(0);
        let (process_tx, process_rx) = mpsc::unbounded_channel();

        Ok(Self {
            root,
            config,
            inner: Mutex::new(Inner {
                state: LifecycleState::Installed,
                initialized: false,
                threshold: 0,
                initial_level: BEGINNING_THRESHOLD,
                next_id: ROOT_ARTIFACT_ID + 1,
                artifacts: BTreeMap::new(),
                processes: HashMap::new(),
                pending_refresh: BTreeSet::new(),
                pending_stop: None,
                last_stop: None,
                permissions: None,
            }),
            events,
            changes,
            process_tx,
            process_rx: std::sync::Mutex::new(Some(process_rx)),
        })
    }

    /// Permission policy installed on the last clean start, if any
    pub async fn permissions(&self) -> Option<PermissionPolicy> {
        self.inner.lock().await.permissions.clone()
    }

    fn state_file(&self) -> PathBuf {
        self.config.storage.join(STATE_FILE)
    }

    fn notify(&self) {
        self.changes.send_modify(|generation| *generation += 1);
    }

    fn emit(&self, event: HostEvent) {
        // no subscribers is fine
        let _ = self.events.send(event);
    }

    fn forward_process_output(&self) {
        let rx = self.process_rx.lock().ok().and_then(|mut slot| slot.take());
        if let Some(mut rx) = rx {
            tokio::spawn(async move {
                while let Some((name, event)) = rx.recv().await {
                    log_process_event(&name, &event);
                }
            });
        }
    }

    fn load(&self) -> Result<Option<PersistedState>, HostError> {
        let path = self.state_file();
        if !path.is_file() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&path)?;
        Ok(Some(serde_json::from_str(&content)?))
    }

    fn persist(&self, inner: &Inner) -> Result<(), HostError> {
        std::fs::create_dir_all(&self.config.storage)?;
        let state = PersistedState {
            initial_level: inner.initial_level,
            next_id: inner.next_id,
            artifacts: inner.artifacts.values().cloned().collect(),
        };
        let tmp = self.state_file().with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_string_pretty(&state)?)?;
        std::fs::rename(&tmp, self.state_file())?;
        Ok(())
    }

    /// Copy content into storage, or keep it in place for reference installs
    fn place_content(
        &self,
        id: ArtifactId,
        location: &ArtifactLocation,
        source: &Path,
    ) -> Result<PathBuf, HostError> {
        if location.is_reference() || id == ROOT_ARTIFACT_ID {
            return Ok(source.to_path_buf());
        }
        let dest = self
            .config
            .storage
            .join(ARTIFACTS_DIR)
            .join(id.to_string());
        content::materialize(source, &dest)?;
        Ok(dest)
    }

    fn process_spec(&self, record: &ArtifactRecord, command: &str) -> ProcessSpec {
        let local = record.content.join(command);
        let program = if record.content.is_dir() && local.is_file() {
            local.to_string_lossy().into_owned()
        } else {
            command.to_string()
        };
        let mut env = HashMap::new();
        env.insert("MODHOST_ARTIFACT_ID".to_string(), record.info.id.to_string());
        env.insert("MODHOST_ARTIFACT_NAME".to_string(), record.info.name.clone());
        env.insert(
            "MODHOST_STORAGE".to_string(),
            self.config.storage.to_string_lossy().into_owned(),
        );
        ProcessSpec {
            name: record.info.name.clone(),
            program,
            args: record.manifest.args.clone(),
            env,
            working_dir: record.content.is_dir().then(|| record.content.clone()),
        }
    }

    fn activate(&self, inner: &mut Inner, id: ArtifactId) -> Result<(), HostError> {
        let Some(record) = inner.artifacts.get(&id) else {
            return Err(HostError::UnknownArtifact(id));
        };
        if record.info.is_fragment() || record.info.state == LifecycleState::Active {
            return Ok(());
        }
        if let Some(command) = record.manifest.command.as_deref() {
            let mut process = ManagedProcess::new(self.process_spec(record, command))
                .with_event_sender(self.process_tx.clone());
            process.spawn()?;
            inner.processes.insert(id, process);
        }
        if let Some(record) = inner.artifacts.get_mut(&id) {
            record.info.state = LifecycleState::Active;
            log::info!(
                "[{}] Active at start level {}",
                record.info.name,
                record.info.start_level
            );
        }
        Ok(())
    }

    async fn deactivate(&self, inner: &mut Inner, id: ArtifactId) {
        if let Some(mut process) = inner.processes.remove(&id) {
            process.stop(PROCESS_STOP_TIMEOUT).await;
        }
        if let Some(record) = inner.artifacts.get_mut(&id) {
            if record.info.state == LifecycleState::Active {
                record.info.state = LifecycleState::Resolved;
                log::debug!("[{}] Stopped", record.info.name);
            }
        }
    }

    /// Bring active artifacts in line with the threshold: stop from the top, start from the bottom
    async fn apply_threshold(&self, inner: &mut Inner) {
        let mut levels: Vec<(u32, ArtifactId)> = inner
            .artifacts
            .values()
            .filter(|r| r.info.id != ROOT_ARTIFACT_ID && !r.info.is_fragment())
            .map(|r| (r.info.start_level, r.info.id))
            .collect();
        levels.sort();

        for (level, id) in levels.iter().rev() {
            let Some(record) = inner.artifacts.get(id) else {
                continue;
            };
            if record.info.state == LifecycleState::Active
                && (*level > inner.threshold || !record.started)
            {
                self.deactivate(inner, *id).await;
            }
        }

        for (level, id) in &levels {
            let Some(record) = inner.artifacts.get(id) else {
                continue;
            };
            if record.started && *level <= inner.threshold {
                if let Err(e) = self.activate(inner, *id) {
                    log::error!("[{}] Failed to activate: {}", record_name(inner, *id), e);
                }
            }
        }
    }

    /// Stop every artifact and leave the host resolved with `reason` as last stop
    async fn halt(&self, inner: &mut Inner, reason: StopEvent) {
        inner.state = LifecycleState::Stopping;
        self.notify();

        let mut active: Vec<(u32, ArtifactId)> = inner
            .artifacts
            .values()
            .filter(|r| r.info.state == LifecycleState::Active && r.info.id != ROOT_ARTIFACT_ID)
            .map(|r| (r.info.start_level, r.info.id))
            .collect();
        active.sort();
        for (_, id) in active.into_iter().rev() {
            self.deactivate(inner, id).await;
        }

        if let Some(root) = inner.artifacts.get_mut(&ROOT_ARTIFACT_ID) {
            root.info.state = LifecycleState::Resolved;
        }
        inner.state = LifecycleState::Resolved;
        inner.initialized = false;
        inner.last_stop = Some(reason);
        if let Err(e) = self.persist(inner) {
            log::error!("Failed to persist host state: {}", e);
        }
        log::info!("Host stopped ({:?})", reason);
        self.notify();
    }

    fn record_mut<'a>(
        inner: &'a mut Inner,
        id: ArtifactId,
    ) -> Result<&'a mut ArtifactRecord, HostError> {
        match inner.artifacts.get_mut(&id) {
            Some(r) if r.info.state != LifecycleState::Uninstalled => Ok(r),
            _ => Err(HostError::UnknownArtifact(id)),
        }
    }
}

fn record_name(inner: &Inner, id: ArtifactId) -> String {
    inner
        .artifacts
        .get(&id)
        .map(|r| r.info.name.clone())
        .unwrap_or_else(|| format!("#{}", id))
}

#[async_trait]
impl ModuleHost for LocalHost {
    fn root_name(&self) -> String {
        self.root.info.name.clone()
    }

    async fn init(&self) -> Result<(), HostError> {
        self.forward_process_output();
        let mut inner = self.inner.lock().await;

        let running: Vec<ArtifactId> = inner.processes.keys().copied().collect();
        for id in running {
            self.deactivate(&mut inner, id).await;
        }

        inner.artifacts.clear();
        match self.load()? {
            Some(saved) => {
                inner.initial_level = saved.initial_level;
                inner.next_id = saved.next_id.max(ROOT_ARTIFACT_ID + 1);
                for record in saved.artifacts {
                    inner.artifacts.insert(record.info.id, record);
                }
                log::debug!(
                    "Loaded {} artifacts from {}",
                    inner.artifacts.len(),
                    self.state_file().display()
                );
            }
            None => {
                inner.initial_level = BEGINNING_THRESHOLD;
                inner.next_id = ROOT_ARTIFACT_ID + 1;
            }
        }
        // the live root manifest wins over whatever an earlier run persisted
        if let Some(saved) = inner.artifacts.get(&ROOT_ARTIFACT_ID) {
            if saved.info.version != self.root.info.version {
                log::info!(
                    "[{}] Root changed {} -> {}",
                    self.root.info.name,
                    saved.info.version,
                    self.root.info.version
                );
            }
        }
        inner.artifacts.insert(ROOT_ARTIFACT_ID, self.root.clone());

        for record in inner.artifacts.values_mut() {
            if record.info.state != LifecycleState::Uninstalled {
                record.info.state = LifecycleState::Resolved;
            }
        }
        inner.threshold = 0;
        inner.pending_refresh.clear();
        inner.pending_stop = None;
        inner.last_stop = None;
        inner.state = LifecycleState::Starting;
        inner.initialized = true;
        self.persist(&inner)?;
        self.notify();
        Ok(())
    }

    async fn start(&self) -> Result<(), HostError> {
        let needs_init = !self.inner.lock().await.initialized;
        if needs_init {
            self.init().await?;
        }

        let mut inner = self.inner.lock().await;
        inner.threshold = inner.threshold.max(BEGINNING_THRESHOLD);
        if let Some(root) = inner.artifacts.get_mut(&ROOT_ARTIFACT_ID) {
            root.info.state = LifecycleState::Active;
        }
        self.apply_threshold(&mut inner).await;
        inner.state = LifecycleState::Active;
        log::info!("Host '{}' started", self.root.info.name);
        self.notify();
        drop(inner);
        self.emit(HostEvent::Started);
        Ok(())
    }

    async fn stop(&self) -> Result<(), HostError> {
        let mut inner = self.inner.lock().await;
        if !matches!(
            inner.state,
            LifecycleState::Active | LifecycleState::Starting
        ) {
            return Ok(());
        }
        self.halt(&mut inner, StopEvent::Stopped).await;
        Ok(())
    }

    async fn state(&self) -> LifecycleState {
        self.inner.lock().await.state
    }

    async fn wait_for_stop(&self, timeout: Option<Duration>) -> StopEvent {
        let mut changes = self.changes.subscribe();
        let wait = async {
            loop {
                {
                    let inner = self.inner.lock().await;
                    if !matches!(
                        inner.state,
                        LifecycleState::Active | LifecycleState::Starting | LifecycleState::Stopping
                    ) {
                        return inner.last_stop.unwrap_or(StopEvent::Stopped);
                    }
                }
                if changes.changed().await.is_err() {
                    return StopEvent::Stopped;
                }
            }
        };
        match timeout {
            Some(t) => tokio::time::timeout(t, wait)
                .await
                .unwrap_or(StopEvent::WaitTimedOut),
            None => wait.await,
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<HostEvent> {
        self.events.subscribe()
    }

    async fn installed(&self) -> Result<Vec<InstalledArtifact>, HostError> {
        let mut inner = self.inner.lock().await;
        let exited: Vec<ArtifactId> = inner
            .processes
            .iter_mut()
            .filter_map(|(id, p)| (!p.is_running()).then_some(*id))
            .collect();
        for id in exited {
            inner.processes.remove(&id);
            log::warn!("[{}] Process is no longer running", record_name(&inner, id));
        }
        Ok(inner
            .artifacts
            .values()
            .filter(|r| r.info.state != LifecycleState::Uninstalled)
            .map(|r| r.info.clone())
            .collect())
    }

    async fn artifact_state(&self, id: ArtifactId) -> Option<LifecycleState> {
        let inner = self.inner.lock().await;
        Some(
            inner
                .artifacts
                .get(&id)
                .map(|r| r.info.state)
                .unwrap_or(LifecycleState::Uninstalled),
        )
    }

    async fn install(&self, location: &ArtifactLocation) -> Result<InstalledArtifact, HostError> {
        let source = location.resolve(&self.config.workdir);
        let manifest = read_manifest(&source)?;
        let mut inner = self.inner.lock().await;

        if let Some(existing) = inner.artifacts.values().find(|r| {
            r.info.location == *location && r.info.state != LifecycleState::Uninstalled
        }) {
            return Ok(existing.info.clone());
        }

        let id = inner.next_id;
        inner.next_id += 1;
        let content = self.place_content(id, location, &source)?;
        let info = InstalledArtifact {
            id,
            name: manifest.name.clone(),
            version: manifest.version.clone(),
            location: location.clone(),
            state: LifecycleState::Resolved,
            kind: manifest.kind,
            extension: manifest.extension,
            start_level: inner.initial_level,
        };
        log::info!("[{}] Installed {} from {}", info.name, info.version, location);
        inner.artifacts.insert(
            id,
            ArtifactRecord {
                info: info.clone(),
                manifest,
                content,
                started: false,
            },
        );
        self.persist(&inner)?;
        Ok(info)
    }

    async fn update(
        &self,
        id: ArtifactId,
        location: &ArtifactLocation,
    ) -> Result<InstalledArtifact, HostError> {
        let source = location.resolve(&self.config.workdir);
        let manifest = read_manifest(&source)?;
        let mut inner = self.inner.lock().await;

        let was_active = Self::record_mut(&mut inner, id)?.info.state == LifecycleState::Active
            && id != ROOT_ARTIFACT_ID;
        if was_active {
            self.deactivate(&mut inner, id).await;
        }

        let content = self.place_content(id, location, &source)?;
        let record = Self::record_mut(&mut inner, id)?;
        let previous = record.info.version.clone();
        record.info.name = manifest.name.clone();
        record.info.version = manifest.version.clone();
        record.info.location = location.clone();
        record.info.kind = manifest.kind;
        record.info.extension = manifest.extension;
        record.manifest = manifest;
        record.content = content;
        let info = record.info.clone();
        log::info!(
            "[{}] Updated {} -> {} from {}",
            info.name,
            previous,
            info.version,
            location
        );

        let stop = if id == ROOT_ARTIFACT_ID {
            Some(StopEvent::StoppedUpdate)
        } else {
            match (info.kind, info.extension) {
                (ArtifactKind::Fragment, Some(ExtensionTarget::Host)) => {
                    Some(StopEvent::BootclasspathModified)
                }
                (ArtifactKind::Fragment, Some(ExtensionTarget::Boot)) => {
                    Some(StopEvent::SystemRefreshed)
                }
                _ => None,
            }
        };
        if let Some(stop) = stop {
            let current = inner.pending_stop.map(severity).unwrap_or(0);
            if severity(stop) > current {
                inner.pending_stop = Some(stop);
            }
        }
        inner.pending_refresh.insert(id);

        if was_active {
            if let Err(e) = self.activate(&mut inner, id) {
                log::error!("[{}] Failed to reactivate after update: {}", info.name, e);
            }
        }
        self.persist(&inner)?;
        Ok(info)
    }

    async fn uninstall(&self, id: ArtifactId) -> Result<(), HostError> {
        if id == ROOT_ARTIFACT_ID {
            return Err(HostError::Unsupported(
                "the root artifact cannot be uninstalled".to_string(),
            ));
        }
        let mut inner = self.inner.lock().await;
        Self::record_mut(&mut inner, id)?;
        self.deactivate(&mut inner, id).await;

        if let Some(record) = inner.artifacts.remove(&id) {
            if !record.info.location.is_reference()
                && record.content.starts_with(self.config.storage.join(ARTIFACTS_DIR))
            {
                if let Err(e) = std::fs::remove_dir_all(&record.content) {
                    log::warn!(
                        "[{}] Cannot remove {}: {}",
                        record.info.name,
                        record.content.display(),
                        e
                    );
                }
            }
            log::info!("[{}] Uninstalled", record.info.name);
        }
        inner.pending_refresh.insert(id);
        self.persist(&inner)?;
        Ok(())
    }

    async fn start_artifact(&self, id: ArtifactId) -> Result<(), HostError> {
        let mut inner = self.inner.lock().await;
        let record = Self::record_mut(&mut inner, id)?;
        if record.info.is_fragment() {
            return Err(HostError::Unsupported(format!(
                "fragment '{}' cannot be started",
                record.info.name
            )));
        }
        record.started = true;
        let level = record.info.start_level;
        if inner.state == LifecycleState::Active && level <= inner.threshold {
            self.activate(&mut inner, id)?;
        }
        self.persist(&inner)?;
        Ok(())
    }

    async fn set_artifact_start_level(&self, id: ArtifactId, level: u32) -> Result<(), HostError> {
        if id == ROOT_ARTIFACT_ID {
            return Err(HostError::Unsupported(
                "the root artifact has no start level".to_string(),
            ));
        }
        let mut inner = self.inner.lock().await;
        Self::record_mut(&mut inner, id)?.info.start_level = level;
        if inner.state == LifecycleState::Active {
            self.apply_threshold(&mut inner).await;
        }
        self.persist(&inner)?;
        Ok(())
    }

    async fn start_threshold(&self) -> u32 {
        self.inner.lock().await.threshold
    }

    async fn set_start_threshold(&self, level: u32) -> Result<(), HostError> {
        let mut inner = self.inner.lock().await;
        log::info!("Start threshold {} -> {}", inner.threshold, level);
        inner.threshold = level;
        if inner.state == LifecycleState::Active {
            self.apply_threshold(&mut inner).await;
        }
        drop(inner);
        self.emit(HostEvent::StartLevelChanged(level));
        Ok(())
    }

    async fn set_initial_artifact_start_level(&self, level: u32) -> Result<(), HostError> {
        let mut inner = self.inner.lock().await;
        inner.initial_level = level;
        self.persist(&inner)?;
        Ok(())
    }

    async fn removal_pending_closure(
        &self,
        ids: &[ArtifactId],
    ) -> Result<Vec<InstalledArtifact>, HostError> {
        let inner = self.inner.lock().await;
        let closure: BTreeSet<ArtifactId> = ids
            .iter()
            .copied()
            .chain(inner.pending_refresh.iter().copied())
            .collect();
        Ok(closure
            .into_iter()
            .filter_map(|id| inner.artifacts.get(&id).map(|r| r.info.clone()))
            .collect())
    }

    async fn refresh(&self, ids: &[ArtifactId]) -> Result<(), HostError> {
        let mut inner = self.inner.lock().await;
        let closure: BTreeSet<ArtifactId> = ids
            .iter()
            .copied()
            .chain(inner.pending_refresh.iter().copied())
            .collect();
        inner.pending_refresh.clear();
        log::debug!("Refreshing {} artifacts", closure.len());

        if let Some(stop) = inner.pending_stop.take() {
            self.halt(&mut inner, stop).await;
            return Ok(());
        }

        for id in closure {
            let active = inner
                .artifacts
                .get(&id)
                .map(|r| r.info.state == LifecycleState::Active)
                .unwrap_or(false);
            if active && id != ROOT_ARTIFACT_ID {
                self.deactivate(&mut inner, id).await;
                if let Err(e) = self.activate(&mut inner, id) {
                    log::error!(
                        "[{}] Failed to reactivate after refresh: {}",
                        record_name(&inner, id),
                        e
                    );
                }
            }
        }
        drop(inner);
        self.emit(HostEvent::PackagesRefreshed);
        Ok(())
    }

    async fn reattach(&self) -> Result<(), HostError> {
        // the local host never invalidates its own context
        log::debug!("Reattaching to host '{}'", self.root.info.name);
        Ok(())
    }

    async fn install_permissions(&self, policy: &PermissionPolicy) -> Result<(), HostError> {
        for grant in &policy.grants {
            if let Some(location) = &grant.location {
                if !(location.starts_with("file:") || location.starts_with("reference:")) {
                    return Err(HostError::Security(format!(
                        "grant '{}' has unsupported location '{}'",
                        grant.name, location
                    )));
                }
            }
        }
        let mut inner = self.inner.lock().await;
        log::info!("Installed {} permission grants", policy.grants.len());
        inner.permissions = Some(policy.clone());
        Ok(())
    }
}

/// Creates [`LocalHost`] instances
#[derive(Debug, Default, Clone)]
pub struct LocalHostFactory;

#[async_trait]
impl HostFactory for LocalHostFactory {
    async fn create(
        &self,
        root: &ArtifactSpec,
        config: &HostConfig,
    ) -> Result<HostHandle, HostError> {
        let location = root.preferred_location().ok_or_else(|| {
            HostError::InvalidState(format!("root artifact {} is not resolved", root.label()))
        })?;
        let host = LocalHost::new(location.clone(), config.clone())?;
        Ok(HostHandle::new(Arc::new(host)))
    }
}
