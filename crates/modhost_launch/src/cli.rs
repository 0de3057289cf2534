//! Command-line interface for modhost-launch

use crate::config::{DuplicatePolicy, ExtraneousPolicy, LaunchOptions};
use argh::FromArgs;
use std::path::{Path, PathBuf};

/// Provisioning launcher and restart supervisor for a dynamic module host
#[derive(FromArgs, Debug)]
pub struct LaunchArgs {
    /// path to the desired-state file (default: config/launch.yaml)
    #[argh(positional, default = "String::from(\"config/launch.yaml\")")]
    pub config: String,

    /// wipe host storage and provision from scratch
    #[argh(switch)]
    pub clean: bool,

    /// re-resolve and update installed artifacts on a non-clean start
    #[argh(switch, short = 'u')]
    pub update_existing: bool,

    /// never contact remote repositories
    #[argh(switch, short = 'o')]
    pub offline: bool,

    /// abort on the first install or update failure
    #[argh(switch)]
    pub strict: bool,

    /// only resolve artifacts from bin directories below the working directory
    #[argh(switch)]
    pub rundir_only: bool,

    /// development workspace scanned for live build outputs
    #[argh(option, short = 'w')]
    pub workspace: Option<PathBuf>,

    /// console port handed to the host
    #[argh(option)]
    pub console: Option<u16>,

    /// repository configuration file
    #[argh(option, short = 'r')]
    pub repositories: Option<PathBuf>,

    /// refresh timeout in milliseconds (default: 5000)
    #[argh(option, default = "5000")]
    pub refresh_timeout: u64,

    /// final start threshold, overrides the computed one
    #[argh(option, short = 's')]
    pub start_level: Option<u32>,

    /// install file artifacts by reference instead of copying them
    #[argh(switch)]
    pub references: bool,

    /// permission policy installed on a clean start
    #[argh(option)]
    pub security: Option<PathBuf>,

    /// uninstall installed versions the desired state no longer lists
    #[argh(switch)]
    pub uninstall_extraneous: bool,

    /// only update existing installations of a name, never add more
    #[argh(switch)]
    pub match_only: bool,

    /// extra paths purged on a clean start (comma-separated)
    #[argh(option, from_str_fn(parse_paths))]
    pub purge: Option<Vec<PathBuf>>,

    /// override a host property (format: key=value)
    #[argh(option, short = 'D', from_str_fn(parse_property))]
    pub property: Vec<(String, String)>,

    /// show the provisioning plan without starting the host
    #[argh(switch)]
    pub dry_run: bool,

    /// validate the desired-state file and exit
    #[argh(switch)]
    pub validate: bool,

    /// log level (error, warn, info, debug, trace)
    #[argh(option, short = 'l', default = "String::from(\"info\")")]
    pub log_level: String,

    /// log everything
    #[argh(switch, short = 'v')]
    pub verbose: bool,
}

/// Parse a property override in format "key=value"
fn parse_property(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!(
            "Invalid property format '{}'. Expected 'key=value'",
            s
        )),
    }
}

/// Parse comma-separated paths
fn parse_paths(s: &str) -> Result<Vec<PathBuf>, String> {
    Ok(s.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(PathBuf::from)
        .collect())
}

impl LaunchArgs {
    /// Effective log filter
    pub fn log_filter(&self) -> &str {
        if self.verbose {
            return "trace";
        }
        match self.log_level.to_lowercase().as_str() {
            "error" => "error",
            "warn" => "warn",
            "debug" => "debug",
            "trace" => "trace",
            _ => "info",
        }
    }

    pub fn to_options(&self, workdir: &Path) -> LaunchOptions {
        LaunchOptions {
            workdir: workdir.to_path_buf(),
            offline: self.offline,
            strict: self.strict,
            clean: self.clean,
            update_existing: self.update_existing,
            rundir_only: self.rundir_only,
            workspace: self.workspace.clone(),
            console_port: self.console,
            repositories: self.repositories.clone(),
            start_level: self.start_level,
            use_references: self.references,
            security: self.security.clone(),
            extraneous: if self.uninstall_extraneous {
                ExtraneousPolicy::Uninstall
            } else {
                ExtraneousPolicy::Keep
            },
            duplicates: if self.match_only {
                DuplicatePolicy::MatchOnly
            } else {
                DuplicatePolicy::InstallRemaining
            },
            ..Default::default()
        }
        .with_refresh_timeout_ms(self.refresh_timeout)
    }
}
