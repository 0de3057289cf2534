//! Child processes backing active artifacts

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;

/// Sender for output and lifecycle events of artifact processes
pub type ProcessEventSender = mpsc::UnboundedSender<(String, ProcessEvent)>;

/// How to run an artifact's entry point
#[derive(Debug, Clone)]
pub struct ProcessSpec {
    /// Artifact label (for logging)
    pub name: String,
    pub program: String,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
    /// Usually the artifact's content directory
    pub working_dir: Option<PathBuf>,
}

/// Event emitted by an artifact process
#[derive(Debug, Clone)]
pub enum ProcessEvent {
    Started { pid: u32 },
    Output { line: String, is_stderr: bool },
    Exited { code: Option<i32> },
}

/// A running artifact entry point
pub struct ManagedProcess {
    spec: ProcessSpec,
    pid: Option<u32>,
    child: Option<Child>,
    events: Option<ProcessEventSender>,
}

impl ManagedProcess {
    pub fn new(spec: ProcessSpec) -> Self {
        Self {
            spec,
            pid: None,
            child: None,
            events: None,
        }
    }

    pub fn with_event_sender(mut self, tx: ProcessEventSender) -> Self {
        self.events = Some(tx);
        self
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    fn emit(&self, event: ProcessEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send((self.spec.name.clone(), event));
        }
    }

    pub fn spawn(&mut self) -> Result<(), ProcessError> {
        if self.child.is_some() {
            return Err(ProcessError::AlreadyRunning(self.spec.name.clone()));
        }

        log::info!(
            "[{}] Starting: {} {}",
            self.spec.name,
            self.spec.program,
            self.spec.args.join(" ")
        );

        let mut cmd = Command::new(&self.spec.program);
        cmd.args(&self.spec.args)
            .envs(&self.spec.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.spec.working_dir {
            cmd.current_dir(dir);
        }

        let mut child = cmd.spawn().map_err(|e| {
            log::error!("[{}] Failed to spawn process: {}", self.spec.name, e);
            ProcessError::SpawnFailed {
                name: self.spec.name.clone(),
                source: e,
            }
        })?;

        let pid = child.id().unwrap_or(0);
        self.pid = Some(pid);
        self.emit(ProcessEvent::Started { pid });

        if let Some(tx) = self.events.clone() {
            if let Some(stdout) = child.stdout.take() {
                forward_lines(self.spec.name.clone(), stdout, false, tx.clone());
            }
            if let Some(stderr) = child.stderr.take() {
                forward_lines(self.spec.name.clone(), stderr, true, tx);
            }
        }

        self.child = Some(child);
        Ok(())
    }

    /// Stop gracefully: SIGTERM, then SIGKILL once `timeout` elapses
    pub async fn stop(&mut self, timeout: Duration) {
        let Some(mut child) = self.child.take() else {
            return;
        };
        log::info!("[{}] Stopping process...", self.spec.name);

        #[cfg(unix)]
        self.signal(nix::sys::signal::Signal::SIGTERM);
        #[cfg(not(unix))]
        let _ = child.start_kill();

        let code = match tokio::time::timeout(timeout, child.wait()).await {
            Ok(Ok(status)) => status.code(),
            Ok(Err(e)) => {
                log::error!("[{}] Error waiting for process: {}", self.spec.name, e);
                None
            }
            Err(_) => {
                log::warn!(
                    "[{}] Process did not exit gracefully, forcing kill",
                    self.spec.name
                );
                let _ = child.kill().await;
                None
            }
        };

        log::info!("[{}] Process exited with code: {:?}", self.spec.name, code);
        self.emit(ProcessEvent::Exited { code });
        self.pid = None;
    }

    #[cfg(unix)]
    fn signal(&self, signal: nix::sys::signal::Signal) {
        use nix::sys::signal::kill;
        use nix::unistd::Pid;

        if let Some(pid) = self.pid {
            let _ = kill(Pid::from_raw(pid as i32), signal);
        }
    }

    /// Whether the process is still alive; reaps it when it has exited
    pub fn is_running(&mut self) -> bool {
        let Some(child) = &mut self.child else {
            return false;
        };
        match child.try_wait() {
            Ok(None) => true,
            Ok(Some(status)) => {
                self.child = None;
                self.pid = None;
                self.emit(ProcessEvent::Exited {
                    code: status.code(),
                });
                false
            }
            Err(e) => {
                log::error!("[{}] Error checking process status: {}", self.spec.name, e);
                true
            }
        }
    }
}

fn forward_lines<R>(name: String, stream: R, is_stderr: bool, tx: ProcessEventSender)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(stream).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let _ = tx.send((name.clone(), ProcessEvent::Output { line, is_stderr }));
        }
    });
}

/// Log process events the way a launcher console shows them
pub fn log_process_event(name: &str, event: &ProcessEvent) {
    match event {
        ProcessEvent::Output { line, is_stderr } => {
            if *is_stderr {
                log::warn!("[{}] {}", name, line);
            } else {
                log::info!("[{}] {}", name, line);
            }
        }
        ProcessEvent::Exited { code } => {
            log::debug!("[{}] Process exited with code: {:?}", name, code)
        }
        ProcessEvent::Started { pid } => {
            log::debug!("[{}] Process started with PID: {}", name, pid)
        }
    }
}

/// Errors that can occur with artifact processes
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("Process '{0}' is already running")]
    AlreadyRunning(String),

    #[error("Failed to spawn process '{name}': {source}")]
    SpawnFailed {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(name: &str, script: &str) -> ProcessSpec {
        ProcessSpec {
            name: name.to_string(),
            program: "sh".to_string(),
            args: vec!["-c".to_string(), script.to_string()],
            env: HashMap::new(),
            working_dir: None,
        }
    }

    #[tokio::test]
    async fn test_spawn_output_and_stop() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut process =
            ManagedProcess::new(sh("echoer", "echo ready; sleep 30")).with_event_sender(tx);
        process.spawn().unwrap();
        assert!(process.pid().is_some());
        assert!(matches!(
            process.spawn(),
            Err(ProcessError::AlreadyRunning(_))
        ));

        let mut saw_output = false;
        while let Some((name, event)) = rx.recv().await {
            assert_eq!(name, "echoer");
            if let ProcessEvent::Output { line, .. } = event {
                assert_eq!(line, "ready");
                saw_output = true;
                break;
            }
        }
        assert!(saw_output);

        process.stop(Duration::from_secs(5)).await;
        assert!(!process.is_running());
        assert!(process.pid().is_none());
    }

    #[tokio::test]
    async fn test_spawn_failure() {
        let mut process = ManagedProcess::new(ProcessSpec {
            name: "missing".into(),
            program: "/definitely/not/a/binary".into(),
            args: vec![],
            env: HashMap::new(),
            working_dir: None,
        });
        assert!(matches!(
            process.spawn(),
            Err(ProcessError::SpawnFailed { .. })
        ));
    }
}
