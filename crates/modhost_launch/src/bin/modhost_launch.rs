//! Modhost Launch CLI
//!
//! Usage:
//!   modhost_launch config/launch.yaml
//!   modhost_launch config/launch.yaml --clean --offline
//!   modhost_launch config/launch.yaml --dry-run

use modhost_launch::config::PropertyValue;
use modhost_launch::{
    exit_code, DesiredState, InstanceLock, LaunchArgs, LocalHostFactory, Provisioner, Supervisor,
};
use std::path::PathBuf;
use std::sync::Arc;

#[tokio::main]
async fn main() {
    let args: LaunchArgs = argh::from_env();

    let env = env_logger::Env::default().default_filter_or(args.log_filter());
    env_logger::init_from_env(env);

    log::info!("Loading desired state: {}", args.config);
    let mut desired = match DesiredState::from_file(&args.config) {
        Ok(state) => state,
        Err(e) => {
            log::error!("Failed to load desired state: {}", e);
            std::process::exit(1);
        }
    };
    for (key, value) in &args.property {
        desired
            .properties
            .insert(key.clone(), PropertyValue::String(value.clone()));
    }

    if let Some(paths) = &args.purge {
        desired.delete_on_clean.extend(paths.iter().cloned());
    }

    if args.validate {
        println!("Desired state '{}' is valid", args.config);
        println!("  Version: {}", desired.version);
        println!("  Host: {}", desired.host_spec().label());
        println!("  Properties: {}", desired.properties.len());
        println!("  Artifacts: {}", desired.artifacts.len());
        return;
    }

    let workdir = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let options = args.to_options(&workdir);

    let provisioner = match Provisioner::new(options, desired, Arc::new(LocalHostFactory)) {
        Ok(p) => p,
        Err(e) => {
            log::error!("Failed to set up provisioning: {}", e);
            std::process::exit(1);
        }
    };

    if args.dry_run {
        println!("{}", provisioner.plan().await);
        return;
    }

    // held until the process exits
    let _lock = match InstanceLock::acquire(&workdir) {
        Ok(lock) => lock,
        Err(e) => {
            log::error!("{}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = provisioner
        .shutdown_hook()
        .install_signal_handler(tokio::runtime::Handle::current())
    {
        log::error!("Error setting Ctrl+C handler: {}", e);
        std::process::exit(1);
    }

    let mut supervisor = Supervisor::new(provisioner);
    let directive = supervisor.run().await;

    log::info!("Modhost launcher exiting ({})", directive);
    std::process::exit(exit_code(directive));
}
