//! Shutdown hook: stops the running host on Ctrl+C
//!
//! The hook is armed once the host is active and disarmed before every
//! intentional restart, so a self-initiated restart is never mistaken for an
//! external shutdown. A signal that arrives while the hook is disarmed is
//! remembered and honoured as soon as it is armed again.

use crate::host::{HostHandle, StopEvent};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// How long the hook waits for the host to stop
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Default)]
struct HookState {
    armed: Option<HostHandle>,
    requested: bool,
}

#[derive(Clone)]
pub struct ShutdownHook {
    state: Arc<Mutex<HookState>>,
    timeout: Duration,
}

impl Default for ShutdownHook {
    fn default() -> Self {
        Self::new(SHUTDOWN_TIMEOUT)
    }
}

impl ShutdownHook {
    pub fn new(timeout: Duration) -> Self {
        Self {
            state: Arc::new(Mutex::new(HookState::default())),
            timeout,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HookState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Route Ctrl+C to this hook. Can only be installed once per process.
    pub fn install_signal_handler(
        &self,
        runtime: tokio::runtime::Handle,
    ) -> Result<(), ctrlc::Error> {
        let hook = self.clone();
        ctrlc::set_handler(move || {
            log::info!("Received Ctrl+C, initiating shutdown...");
            match hook.trigger() {
                Some(host) => runtime.block_on(stop_host(host, hook.timeout)),
                None => log::info!("Host is not running yet, stopping once it is"),
            }
        })
    }

    /// Record a shutdown request; returns the host to stop when armed
    pub fn trigger(&self) -> Option<HostHandle> {
        let mut state = self.lock();
        state.requested = true;
        state.armed.take()
    }

    /// Hand the running host to the hook
    pub async fn arm(&self, host: HostHandle) {
        let pending = {
            let mut state = self.lock();
            if state.requested {
                Some(host)
            } else {
                state.armed = Some(host);
                None
            }
        };
        if let Some(host) = pending {
            log::info!("Shutdown was requested during provisioning");
            stop_host(host, self.timeout).await;
        }
    }

    /// Take the host back before a controlled restart
    pub fn disarm(&self) -> bool {
        self.lock().armed.take().is_some()
    }

    pub fn is_armed(&self) -> bool {
        self.lock().armed.is_some()
    }

    pub fn is_requested(&self) -> bool {
        self.lock().requested
    }
}

async fn stop_host(host: HostHandle, timeout: Duration) {
    if let Err(e) = host.stop().await {
        log::error!("Failed to stop host: {}", e);
        return;
    }
    if host.wait_for_stop(Some(timeout)).await == StopEvent::WaitTimedOut {
        log::warn!("Host did not stop within {:?}", timeout);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::{ArtifactLocation, MANIFEST_FILE};
    use crate::host::{HostConfig, LifecycleState, LocalHost, ModuleHost};
    use indexmap::IndexMap;

    async fn running_host(tmp: &std::path::Path) -> HostHandle {
        let dir = tmp.join("bin/system/core-host");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(MANIFEST_FILE), "name: core-host\nversion: \"1.0.0\"\n").unwrap();
        let host = LocalHost::new(
            ArtifactLocation::File("bin/system/core-host".into()),
            HostConfig {
                workdir: tmp.to_path_buf(),
                storage: tmp.join("storage"),
                properties: IndexMap::new(),
            },
        )
        .unwrap();
        host.init().await.unwrap();
        host.start().await.unwrap();
        HostHandle::new(Arc::new(host))
    }

    #[tokio::test]
    async fn test_trigger_hands_out_armed_host_once() {
        let tmp = tempfile::tempdir().unwrap();
        let hook = ShutdownHook::new(Duration::from_millis(100));
        assert!(hook.trigger().is_none());
        assert!(hook.is_requested());

        let hook = ShutdownHook::default();
        hook.arm(running_host(tmp.path()).await).await;
        assert!(hook.is_armed());
        assert!(hook.trigger().is_some());
        assert!(hook.trigger().is_none());
    }

    #[tokio::test]
    async fn test_disarm_before_restart() {
        let tmp = tempfile::tempdir().unwrap();
        let hook = ShutdownHook::default();
        assert!(!hook.disarm());
        hook.arm(running_host(tmp.path()).await).await;
        assert!(hook.disarm());
        assert!(!hook.is_armed());
        assert!(!hook.is_requested());
    }

    #[tokio::test]
    async fn test_request_while_disarmed_stops_on_arm() {
        let tmp = tempfile::tempdir().unwrap();
        let hook = ShutdownHook::new(Duration::from_secs(1));
        hook.trigger();

        let host = running_host(tmp.path()).await;
        hook.arm(host.clone()).await;
        assert!(!hook.is_armed());
        assert_eq!(host.state().await, LifecycleState::Resolved);
    }
}
