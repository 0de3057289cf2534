//! Restart controller
//!
//! Watches the host after it went active and turns stop events into a
//! [`RestartDirective`] for the supervisor. It also drives the refresh that
//! follows updates: a refresh touching the host's root artifact is expected
//! to stop the host, anything else only needs an acknowledgment.
//!
//! Every wait is bounded. A refresh that never stops the host ends in
//! [`force_exit_on_timeout`], the only place a timeout turns into an exit.

use crate::host::{
    ArtifactId, HostEvent, HostHandle, InstalledArtifact, LifecycleState, StopEvent,
    ROOT_ARTIFACT_ID,
};
use crate::config::DEFAULT_REFRESH_TIMEOUT;
use std::fmt;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;

/// What the supervisor does once the host stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartDirective {
    /// Terminate the launcher
    Exit,
    /// Re-run provisioning against the same host
    RestartSameLoader,
    /// Re-run provisioning against a freshly created host
    RestartNewLoader,
    /// Exit with the restart sentinel so a wrapper starts a new process
    RestartNewProcess,
}

impl RestartDirective {
    pub fn is_restart(&self) -> bool {
        matches!(
            self,
            RestartDirective::RestartSameLoader | RestartDirective::RestartNewLoader
        )
    }
}

impl fmt::Display for RestartDirective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RestartDirective::Exit => "EXIT",
            RestartDirective::RestartSameLoader => "RESTART_SAME_LOADER",
            RestartDirective::RestartNewLoader => "RESTART_NEW_LOADER",
            RestartDirective::RestartNewProcess => "RESTART_NEW_PROCESS",
        };
        f.write_str(s)
    }
}

/// Bounds of every wait the controller performs
#[derive(Debug, Clone)]
pub struct RestartTimings {
    /// How long a host stopped by an update may take to come back on its own
    pub update_grace: Duration,
    pub update_poll: Duration,
    /// Wait for a host stuck in STOPPING
    pub stopping_wait: Duration,
    /// Wait for the stop a root refresh causes
    pub root_refresh_wait: Duration,
    /// Wait for the acknowledgment of any other refresh
    pub refresh_ack_wait: Duration,
    /// State watcher poll interval
    pub state_poll: Duration,
    /// State watcher bound
    pub refresh_timeout: Duration,
}

impl Default for RestartTimings {
    fn default() -> Self {
        Self {
            update_grace: Duration::from_secs(10),
            update_poll: Duration::from_millis(500),
            stopping_wait: Duration::from_secs(60),
            root_refresh_wait: Duration::from_secs(300),
            refresh_ack_wait: Duration::from_secs(60),
            state_poll: Duration::from_millis(100),
            refresh_timeout: DEFAULT_REFRESH_TIMEOUT,
        }
    }
}

impl RestartTimings {
    pub fn with_refresh_timeout(mut self, timeout: Duration) -> Self {
        self.refresh_timeout = timeout.max(Duration::from_millis(1));
        self
    }
}

/// The one path by which an expired wait ends the launcher
pub fn force_exit_on_timeout(what: &str, bound: Duration) -> RestartDirective {
    log::error!(
        "{} did not complete within {:?}, exiting to avoid a half-refreshed host",
        what,
        bound
    );
    RestartDirective::Exit
}

/// Whether refreshing this closure replaces code the host itself runs on
pub fn closure_touches_root(closure: &[InstalledArtifact]) -> bool {
    closure
        .iter()
        .any(|a| a.id == ROOT_ARTIFACT_ID || (a.is_fragment() && a.extension.is_some()))
}

pub struct RestartController {
    host: HostHandle,
    timings: RestartTimings,
}

impl RestartController {
    pub fn new(host: HostHandle, timings: RestartTimings) -> Self {
        Self { host, timings }
    }

    pub fn timings(&self) -> &RestartTimings {
        &self.timings
    }

    /// Block until a stop event yields a directive
    pub async fn wait_for_directive(&self) -> RestartDirective {
        loop {
            let event = self.host.wait_for_stop(None).await;
            log::info!("Host stopped: {:?}", event);
            if let Some(directive) = self.decide(event).await {
                log::info!("Restart directive: {}", directive);
                return directive;
            }
        }
    }

    /// Directive for one stop event; `None` means keep waiting
    pub async fn decide(&self, event: StopEvent) -> Option<RestartDirective> {
        match event {
            StopEvent::Stopped => Some(RestartDirective::Exit),
            StopEvent::StoppedUpdate => self.settle_after_update().await,
            StopEvent::BootclasspathModified => Some(RestartDirective::RestartNewLoader),
            StopEvent::SystemRefreshed => Some(RestartDirective::RestartNewProcess),
            StopEvent::WaitTimedOut | StopEvent::Other(_) => {
                log::debug!("Ignoring stop event {:?}", event);
                tokio::time::sleep(self.timings.state_poll).await;
                None
            }
        }
    }

    /// After a stop caused by an update the host may restart itself
    async fn settle_after_update(&self) -> Option<RestartDirective> {
        let deadline = Instant::now() + self.timings.update_grace;
        loop {
            if self.host.state().await.is_running() {
                log::info!("Host restarted itself after update");
                return None;
            }
            if Instant::now() >= deadline {
                break;
            }
            tokio::time::sleep(self.timings.update_poll).await;
        }

        let mut state = self.host.state().await;
        if state == LifecycleState::Stopping {
            log::info!("Host is still stopping, waiting for it to finish");
            let event = self
                .host
                .wait_for_stop(Some(self.timings.stopping_wait))
                .await;
            if event == StopEvent::WaitTimedOut {
                return Some(force_exit_on_timeout(
                    "Host stop after update",
                    self.timings.stopping_wait,
                ));
            }
            state = self.host.state().await;
        }

        match state {
            LifecycleState::Resolved | LifecycleState::Installed => {
                Some(RestartDirective::RestartSameLoader)
            }
            LifecycleState::Active | LifecycleState::Starting => None,
            other => {
                log::error!("Host ended up {} after update, cannot restart", other);
                Some(RestartDirective::Exit)
            }
        }
    }

    /// Refresh artifacts updated by reconciliation.
    ///
    /// Returns a directive when the refresh stopped the host.
    pub async fn refresh(&self, updated: &[ArtifactId]) -> Option<RestartDirective> {
        let _control = self.host.lock_control().await;

        let closure = match self.host.removal_pending_closure(updated).await {
            Ok(closure) => closure,
            Err(e) => {
                log::error!("Cannot compute refresh closure: {}", e);
                return None;
            }
        };
        if closure.is_empty() {
            return None;
        }
        let ids: Vec<ArtifactId> = closure.iter().map(|a| a.id).collect();
        log::info!("Refreshing {} artifacts", ids.len());

        if closure_touches_root(&closure) {
            self.refresh_root(&ids).await
        } else {
            self.refresh_artifacts(&ids).await;
            None
        }
    }

    async fn refresh_root(&self, ids: &[ArtifactId]) -> Option<RestartDirective> {
        log::info!("Refresh includes the host root, waiting for the host to stop");
        let bound = self.timings.root_refresh_wait;
        let host = self.host.clone();
        let waiter = tokio::spawn(async move { host.wait_for_stop(Some(bound)).await });

        if let Err(e) = self.host.refresh(ids).await {
            log::error!("Refresh failed: {}", e);
            waiter.abort();
            return Some(RestartDirective::Exit);
        }

        match waiter.await {
            Ok(StopEvent::WaitTimedOut) => Some(force_exit_on_timeout("Root refresh", bound)),
            Ok(event) => {
                log::info!("Host stopped for refresh: {:?}", event);
                match self.decide(event).await {
                    Some(directive) => Some(directive),
                    None => {
                        self.watch_state().await;
                        None
                    }
                }
            }
            Err(e) => {
                log::error!("Refresh waiter failed: {}", e);
                Some(force_exit_on_timeout("Root refresh", bound))
            }
        }
    }

    async fn refresh_artifacts(&self, ids: &[ArtifactId]) {
        let mut events = self.host.subscribe();
        if let Err(e) = self.host.refresh(ids).await {
            log::error!("Refresh failed: {}", e);
            return;
        }

        let bound = self.timings.refresh_ack_wait;
        if wait_for_event(&mut events, bound, |e| *e == HostEvent::PackagesRefreshed).await {
            log::debug!("Packages refreshed");
        } else {
            log::warn!("No refresh confirmation within {:?}", bound);
            self.watch_state().await;
        }
    }

    /// Poll host state until it is running again, warning when it is not
    pub async fn watch_state(&self) {
        let host = self.host.clone();
        let poll = self.timings.state_poll;
        let bound = self.timings.refresh_timeout;

        let watcher = tokio::spawn(async move {
            let deadline = Instant::now() + bound;
            loop {
                let state = host.state().await;
                if state.is_running() || Instant::now() >= deadline {
                    return state;
                }
                tokio::time::sleep(poll).await;
            }
        });

        match tokio::time::timeout(bound * 4, watcher).await {
            Ok(Ok(state)) if state.is_running() => {}
            Ok(Ok(state)) => log::warn!("Host is {} after refresh, expected it running", state),
            Ok(Err(e)) => log::warn!("Host state watcher failed: {}", e),
            Err(_) => log::warn!("Host state watcher did not finish within {:?}", bound * 4),
        }
    }
}

/// Wait up to `bound` for a host event matching `wanted`
pub async fn wait_for_event<F>(
    events: &mut broadcast::Receiver<HostEvent>,
    bound: Duration,
    wanted: F,
) -> bool
where
    F: Fn(&HostEvent) -> bool,
{
    let wait = async {
        loop {
            match events.recv().await {
                Ok(event) if wanted(&event) => return true,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return false,
            }
        }
    };
    tokio::time::timeout(bound, wait).await.unwrap_or(false)
}
