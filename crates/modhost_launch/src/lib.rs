//! Modhost Launch
//!
//! Provisioning launcher and restart supervisor for a dynamic module host.
//!
//! # Overview
//!
//! The launcher turns a declarative desired state into a running host:
//! - Resolve every desired artifact through an ordered resolver chain
//!   (repository, then local file, with a development workspace override)
//! - Reconcile the result against what the host already has installed
//! - Start artifacts tier by tier and raise the host's start threshold
//! - Supervise the host and restart it in-process when an update requires it
//!
//! # Example Desired State
//!
//! ```yaml
//! version: "1.0"
//!
//! host:
//!   coordinate: "org.modhost:modhost-core:1.0.0"
//!
//! properties:
//!   org.modhost.secure: false
//!
//! artifacts:
//!   - coordinate: "org.example:core:1.2.0"
//!     start_level: 1
//!
//!   - file: "ui-3.0.0.tgz"
//!     start_level: 5
//! ```

pub mod artifact;
pub mod cli;
pub mod config;
pub mod host;
pub mod lock;
pub mod resolver;
pub mod runtime;

pub use artifact::{ArtifactIdentity, ArtifactLocation, ArtifactSpec, Version};
pub use cli::LaunchArgs;
pub use config::{ConfigError, DesiredState, LaunchOptions};
pub use host::{HostFactory, HostHandle, LocalHost, LocalHostFactory, ModuleHost};
pub use lock::{InstanceLock, LockError};
pub use resolver::{ArtifactResolver, ResolverChain};
pub use runtime::{
    exit_code, PipelineError, Provisioner, RestartController, RestartDirective, Supervisor,
};
