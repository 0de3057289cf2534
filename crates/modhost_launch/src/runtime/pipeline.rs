//! Provisioning pipeline and the supervisor loop around it
//!
//! One provisioning pass resolves the host artifact, acquires the host,
//! reconciles the desired artifacts, starts everything tier by tier and then
//! hands over to the [`RestartController`]. The [`Supervisor`] re-runs the
//! pass for in-process restarts and returns once the launcher should exit.

use crate::artifact::{ArtifactSpec, DEFAULT_START_LEVEL};
use crate::config::{
    ConfigError, DesiredState, LaunchOptions, PermissionPolicy, RepositoryConfig,
};
use crate::host::{HostConfig, HostError, HostEvent, HostFactory, HostHandle, ROOT_ARTIFACT_ID};
use crate::resolver::ResolverChain;
use crate::runtime::reconcile::{ReconcileError, Reconciler};
use crate::runtime::restart::{wait_for_event, RestartController, RestartDirective, RestartTimings};
use crate::runtime::scheduler::{schedule, threshold_for, StartBatch};
use crate::runtime::shutdown::ShutdownHook;
use crate::runtime::storage::{is_clean_start, purge, resolve_in};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Host property carrying the console port
pub const CONSOLE_PORT_PROPERTY: &str = "org.modhost.console.port";

/// Exit code asking a wrapper script to start a fresh process
pub const RESTART_EXIT_CODE: i32 = -4;

const HOST_START_WAIT: Duration = Duration::from_secs(60);
const THRESHOLD_WAIT: Duration = Duration::from_secs(60);

/// Process exit code for the directive the supervisor ended with
pub fn exit_code(directive: RestartDirective) -> i32 {
    match directive {
        RestartDirective::RestartNewProcess => RESTART_EXIT_CODE,
        _ => 0,
    }
}

/// Errors that end a provisioning pass with [`RestartDirective::Exit`]
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Host artifact {0} could not be resolved")]
    HostUnresolved(String),

    #[error("No usable module host: {0}")]
    HostAcquisition(#[source] HostError),

    #[error("Security policy could not be installed: {0}")]
    Security(#[source] HostError),

    #[error("Cannot purge storage: {0}")]
    Purge(#[source] std::io::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Host(#[from] HostError),

    #[error(transparent)]
    Reconcile(#[from] ReconcileError),
}

pub struct Provisioner {
    options: LaunchOptions,
    desired: DesiredState,
    factory: Arc<dyn HostFactory>,
    chain: ResolverChain,
    host: Option<HostHandle>,
    hook: ShutdownHook,
    timings: RestartTimings,
}

impl Provisioner {
    pub fn new(
        options: LaunchOptions,
        desired: DesiredState,
        factory: Arc<dyn HostFactory>,
    ) -> Result<Self, PipelineError> {
        let repositories =
            RepositoryConfig::load(options.repositories.as_deref(), &options.workdir)?;
        let chain = ResolverChain::from_options(&options, repositories);
        let timings = RestartTimings::default().with_refresh_timeout(options.refresh_timeout);
        Ok(Self {
            options,
            desired,
            factory,
            chain,
            host: None,
            hook: ShutdownHook::default(),
            timings,
        })
    }

    pub fn with_chain(mut self, chain: ResolverChain) -> Self {
        self.chain = chain;
        self
    }

    pub fn with_timings(mut self, timings: RestartTimings) -> Self {
        self.timings = timings;
        self
    }

    pub fn with_shutdown_hook(mut self, hook: ShutdownHook) -> Self {
        self.hook = hook;
        self
    }

    pub fn options(&self) -> &LaunchOptions {
        &self.options
    }

    pub fn shutdown_hook(&self) -> &ShutdownHook {
        &self.hook
    }

    pub fn host(&self) -> Option<&HostHandle> {
        self.host.as_ref()
    }

    /// Drop the current host so the next pass acquires a fresh one
    pub fn release_host(&mut self) {
        self.host = None;
    }

    /// Switch to restart options: storage is never wiped again
    pub fn prepare_restart(&mut self) {
        self.options = self.options.for_restart();
    }

    fn storage_dir(&self) -> PathBuf {
        resolve_in(&self.options.workdir, &self.desired.storage)
    }

    fn host_config(&self) -> HostConfig {
        let mut properties = self.desired.property_strings();
        if let Some(port) = self.options.console_port {
            properties.insert(CONSOLE_PORT_PROPERTY.to_string(), port.to_string());
        }
        HostConfig {
            workdir: self.options.workdir.clone(),
            storage: self.storage_dir(),
            properties,
        }
    }

    /// Run one provisioning pass; every fatal error becomes [`RestartDirective::Exit`]
    pub async fn provision(&mut self) -> RestartDirective {
        match self.run_pass().await {
            Ok(directive) => directive,
            Err(e) => {
                log::error!("Provisioning failed: {}", e);
                RestartDirective::Exit
            }
        }
    }

    async fn acquire_host(&mut self, root: &ArtifactSpec) -> Result<HostHandle, PipelineError> {
        if let Some(host) = &self.host {
            return Ok(host.clone());
        }
        let host = self
            .factory
            .create(root, &self.host_config())
            .await
            .map_err(PipelineError::HostAcquisition)?;
        log::info!("Using host '{}'", host.root_name());
        self.host = Some(host.clone());
        Ok(host)
    }

    async fn run_pass(&mut self) -> Result<RestartDirective, PipelineError> {
        let mut root = self.desired.host_spec();
        if !self.chain.resolve(&mut root).await {
            return Err(PipelineError::HostUnresolved(root.label()));
        }

        let storage = self.storage_dir();
        // a restarted host keeps whatever storage it has, even none
        let clean = !self.options.restart && is_clean_start(self.options.clean, &storage);
        if self.options.restart {
            log::info!("Restarting host in-process, keeping {}", storage.display());
        }
        if clean {
            log::info!("Clean start, purging {}", storage.display());
            purge(&self.options.workdir, &storage, &self.desired.delete_on_clean)
                .map_err(PipelineError::Purge)?;
        }

        let host = self.acquire_host(&root).await?;

        let desired = if clean || self.options.update_existing {
            let resolution = self.chain.resolve_all(self.desired.specs()).await;
            Some(resolution.resolved)
        } else {
            None
        };

        host.init().await?;

        if clean {
            if let Some(path) = &self.options.security {
                let policy = PermissionPolicy::from_file(&resolve_in(&self.options.workdir, path))?;
                host.install_permissions(&policy)
                    .await
                    .map_err(PipelineError::Security)?;
            }
        }

        let controller = RestartController::new(host.clone(), self.timings.clone());
        let max_level = match &desired {
            Some(specs) => {
                host.set_initial_artifact_start_level(DEFAULT_START_LEVEL)
                    .await?;
                let report = Reconciler::from_options(&self.options)
                    .reconcile(&host, specs)
                    .await?;
                if !report.updated.is_empty() {
                    if let Some(directive) = controller.refresh(&report.updated_ids()).await {
                        return Ok(directive);
                    }
                }
                let batch = StartBatch::build(specs, &host.installed().await?);
                schedule(&host, &batch).await
            }
            None => {
                log::info!("Starting with the installed artifacts");
                host.installed()
                    .await?
                    .iter()
                    .filter(|a| a.id != ROOT_ARTIFACT_ID)
                    .map(|a| a.start_level)
                    .max()
                    .unwrap_or(0)
            }
        };

        start_host(&host).await?;
        let threshold = self
            .options
            .start_level
            .unwrap_or_else(|| threshold_for(max_level));
        raise_threshold(&host, threshold).await?;

        self.hook.arm(host.clone()).await;
        Ok(controller.wait_for_directive().await)
    }

    /// Resolve everything without touching the host
    pub async fn plan(&self) -> ProvisioningPlan {
        let mut host = self.desired.host_spec();
        self.chain.resolve(&mut host).await;
        let resolution = self.chain.resolve_all(self.desired.specs()).await;

        let mut artifacts = resolution.resolved;
        artifacts.sort_by_key(|s| s.start_level);
        let max_level = artifacts.iter().map(|s| s.start_level).max().unwrap_or(0);

        ProvisioningPlan {
            clean: !self.options.restart
                && is_clean_start(self.options.clean, &self.storage_dir()),
            storage: self.storage_dir(),
            host,
            artifacts,
            unresolved: resolution.unresolved,
            threshold: self
                .options
                .start_level
                .unwrap_or_else(|| threshold_for(max_level)),
        }
    }
}

async fn start_host(host: &HostHandle) -> Result<(), HostError> {
    let mut events = host.subscribe();
    host.start().await?;
    if !wait_for_event(&mut events, HOST_START_WAIT, |e| *e == HostEvent::Started).await {
        log::warn!("Host did not report started within {:?}", HOST_START_WAIT);
    }
    Ok(())
}

async fn raise_threshold(host: &HostHandle, level: u32) -> Result<(), HostError> {
    let _control = host.lock_control().await;
    let mut events = host.subscribe();
    host.set_start_threshold(level).await?;
    if wait_for_event(&mut events, THRESHOLD_WAIT, |e| {
        *e == HostEvent::StartLevelChanged(level)
    })
    .await
    {
        log::info!("Start threshold is now {}", level);
    } else {
        log::warn!(
            "Host did not confirm start threshold {} within {:?}",
            level,
            THRESHOLD_WAIT
        );
    }
    Ok(())
}

/// Re-runs provisioning across in-process restarts
pub struct Supervisor {
    provisioner: Provisioner,
}

impl Supervisor {
    pub fn new(provisioner: Provisioner) -> Self {
        Self { provisioner }
    }

    pub fn provisioner(&self) -> &Provisioner {
        &self.provisioner
    }

    /// Provision until a pass ends with a directive that leaves the process
    pub async fn run(&mut self) -> RestartDirective {
        loop {
            let directive = self.provisioner.provision().await;
            let hook = self.provisioner.shutdown_hook();
            hook.disarm();

            if directive.is_restart() && hook.is_requested() {
                log::info!("Shutdown requested, not restarting");
                return RestartDirective::Exit;
            }

            match directive {
                RestartDirective::RestartSameLoader => {
                    log::info!("Restarting with the same host");
                }
                RestartDirective::RestartNewLoader => {
                    log::info!("Restarting with a new host");
                    self.provisioner.release_host();
                }
                RestartDirective::Exit | RestartDirective::RestartNewProcess => {
                    log::info!("Supervisor done: {}", directive);
                    return directive;
                }
            }
            self.provisioner.prepare_restart();
        }
    }
}

/// Everything a pass would do, for `--dry-run`
#[derive(Debug)]
pub struct ProvisioningPlan {
    pub clean: bool,
    pub storage: PathBuf,
    pub host: ArtifactSpec,
    /// Resolved artifacts in start order
    pub artifacts: Vec<ArtifactSpec>,
    pub unresolved: Vec<ArtifactSpec>,
    pub threshold: u32,
}

fn location_of(spec: &ArtifactSpec) -> String {
    spec.preferred_location()
        .map(|l| l.to_string())
        .unwrap_or_else(|| "UNRESOLVED".to_string())
}

impl fmt::Display for ProvisioningPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Provisioning Plan")?;
        writeln!(f, "=================")?;
        writeln!(f)?;
        writeln!(f, "Host: {} -> {}", self.host.label(), location_of(&self.host))?;
        writeln!(f, "Storage: {}", self.storage.display())?;
        writeln!(f, "Clean start: {}", if self.clean { "yes" } else { "no" })?;
        writeln!(f)?;

        writeln!(f, "Artifacts (in start order):")?;
        for (i, spec) in self.artifacts.iter().enumerate() {
            let identity = spec
                .identity()
                .map(|id| id.to_string())
                .unwrap_or_else(|| spec.label());
            writeln!(
                f,
                "  {}. [{}] {}{}",
                i + 1,
                spec.start_level,
                identity,
                if spec.auto_start { "" } else { " (no start)" }
            )?;
            writeln!(f, "     Location: {}", location_of(spec))?;
            if let Some(ws) = spec.workspace_location() {
                writeln!(f, "     Workspace: {}", ws.display())?;
            }
        }

        if !self.unresolved.is_empty() {
            writeln!(f)?;
            writeln!(f, "Unresolved:")?;
            for spec in &self.unresolved {
                writeln!(f, "  --> {}", spec.label())?;
            }
        }

        writeln!(f)?;
        write!(f, "Start threshold: {}", self.threshold)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(exit_code(RestartDirective::Exit), 0);
        assert_eq!(exit_code(RestartDirective::RestartNewProcess), -4);
    }

    #[test]
    fn test_plan_display() {
        let plan = ProvisioningPlan {
            clean: true,
            storage: PathBuf::from("data/host-storage"),
            host: ArtifactSpec::from_coordinate("org.modhost:modhost-core:1.0.0"),
            artifacts: vec![ArtifactSpec::from_file("ui-3.0.0.tgz").with_start_level(5)],
            unresolved: vec![ArtifactSpec::from_coordinate("bogus")],
            threshold: 6,
        };
        let text = plan.to_string();
        assert!(text.contains("Host: org.modhost:modhost-core:1.0.0 -> UNRESOLVED"));
        assert!(text.contains("1. [5] ui-3.0.0.tgz"));
        assert!(text.contains("--> bogus"));
        assert!(text.ends_with("Start threshold: 6"));
    }
}
