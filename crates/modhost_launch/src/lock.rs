//! Single-instance lock on the working directory

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

/// Lock file created in the working directory
pub const LOCK_FILE: &str = "modhost-launcher.lock";

#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("Cannot open lock file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Another launcher is already running in this directory (lock held on {0})")]
    Held(PathBuf),
}

/// Held for the launcher's lifetime; released on drop
pub struct InstanceLock {
    path: PathBuf,
    #[cfg(unix)]
    _lock: nix::fcntl::Flock<File>,
    #[cfg(not(unix))]
    _file: File,
}

impl InstanceLock {
    /// Take the exclusive lock without blocking
    pub fn acquire(workdir: &Path) -> Result<Self, LockError> {
        let path = workdir.join(LOCK_FILE);
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .map_err(|e| LockError::Io {
                path: path.clone(),
                source: e,
            })?;

        #[cfg(unix)]
        {
            use nix::fcntl::{Flock, FlockArg};
            let lock = Flock::lock(file, FlockArg::LockExclusiveNonblock)
                .map_err(|_| LockError::Held(path.clone()))?;
            log::debug!("Acquired instance lock {}", path.display());
            Ok(Self { path, _lock: lock })
        }

        #[cfg(not(unix))]
        {
            log::debug!("Instance lock {} is advisory only on this platform", path.display());
            Ok(Self { path, _file: file })
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl std::fmt::Debug for InstanceLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstanceLock").field("path", &self.path).finish()
    }
}
