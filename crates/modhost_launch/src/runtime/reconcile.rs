//! Reconciliation engine - diffs desired artifacts against the host's installed set
//!
//! Planning is pure: installed artifacts are grouped by name, each installed
//! instance is matched to the desired version closest to it, and whatever is
//! left over is installed fresh. Applying the plan talks to the host; a single
//! failure is logged (or aborts the pass in strict mode), a stale host context
//! is recovered once and only the remaining records are retried.

use crate::artifact::{distance, ArtifactLocation, ArtifactSpec, Version};
use crate::config::{DuplicatePolicy, ExtraneousPolicy, LaunchOptions};
use crate::host::{ArtifactId, HostError, HostHandle, InstalledArtifact, ROOT_ARTIFACT_ID};
use indexmap::IndexMap;
use std::collections::HashSet;
use std::fmt;

/// Index of the version closest to `target`; the first candidate wins ties
pub fn closest_version<'a, I>(target: &Version, candidates: I) -> Option<usize>
where
    I: IntoIterator<Item = &'a Version>,
{
    candidates
        .into_iter()
        .enumerate()
        .min_by_key(|(_, v)| distance(target, v))
        .map(|(i, _)| i)
}

/// One host operation decided by the planner
#[derive(Debug, Clone)]
pub enum Operation {
    Update {
        target: InstalledArtifact,
        spec: ArtifactSpec,
    },
    Install {
        spec: ArtifactSpec,
    },
}

impl Operation {
    pub fn spec(&self) -> &ArtifactSpec {
        match self {
            Operation::Update { spec, .. } | Operation::Install { spec } => spec,
        }
    }
}

/// Host operations plus what the desired state does not account for
#[derive(Debug, Default)]
pub struct ReconcilePlan {
    pub operations: Vec<Operation>,
    /// Installed instances of a desired name left without a desired version
    pub extraneous: Vec<InstalledArtifact>,
    /// Installed artifacts whose name the desired state never mentions
    pub absent: Vec<InstalledArtifact>,
    /// Desired records not installed because their name is already present
    pub skipped: Vec<ArtifactSpec>,
}

/// Group desired records by name, keeping declaration order
pub fn group_desired(desired: &[ArtifactSpec]) -> IndexMap<String, Vec<&ArtifactSpec>> {
    let mut by_name: IndexMap<String, Vec<&ArtifactSpec>> = IndexMap::new();
    for spec in desired {
        match spec.name() {
            Some(name) if spec.is_resolved() => {
                by_name.entry(name.to_string()).or_default().push(spec)
            }
            _ => log::warn!("Skipping unresolved artifact {}", spec.label()),
        }
    }
    by_name
}

/// Group installed artifacts by name; the host's root artifact is never part of it
pub fn group_installed(
    installed: &[InstalledArtifact],
) -> IndexMap<String, Vec<&InstalledArtifact>> {
    let mut by_name: IndexMap<String, Vec<&InstalledArtifact>> = IndexMap::new();
    for artifact in installed.iter().filter(|a| a.id != ROOT_ARTIFACT_ID) {
        by_name.entry(artifact.name.clone()).or_default().push(artifact);
    }
    by_name
}

/// Decide which installed artifacts get updated and which records get installed
pub fn plan(
    desired: &[ArtifactSpec],
    installed: &[InstalledArtifact],
    duplicates: DuplicatePolicy,
) -> ReconcilePlan {
    let desired_by_name = group_desired(desired);
    let installed_by_name = group_installed(installed);
    let mut plan = ReconcilePlan::default();

    for (name, specs) in &desired_by_name {
        let mut pending: Vec<&ArtifactSpec> = specs.clone();
        let existing = installed_by_name.get(name);

        for target in existing.into_iter().flatten() {
            let versions: Vec<&Version> = pending.iter().filter_map(|s| s.version()).collect();
            let Some(pos) = closest_version(&target.version, versions) else {
                plan.extraneous.push((*target).clone());
                continue;
            };
            let spec = pending.remove(pos);
            plan.operations.push(Operation::Update {
                target: (*target).clone(),
                spec: spec.clone(),
            });
        }

        let name_installed = existing.map(|e| !e.is_empty()).unwrap_or(false);
        for spec in pending {
            if name_installed && duplicates == DuplicatePolicy::MatchOnly {
                plan.skipped.push(spec.clone());
            } else {
                plan.operations.push(Operation::Install { spec: spec.clone() });
            }
        }
    }

    for (name, artifacts) in installed_by_name {
        if !desired_by_name.contains_key(&name) {
            plan.absent.extend(artifacts.into_iter().cloned());
        }
    }
    plan
}

/// Outcome of one reconciliation pass
#[derive(Debug, Default)]
pub struct ReconcileReport {
    pub installed: Vec<InstalledArtifact>,
    pub updated: Vec<InstalledArtifact>,
    pub up_to_date: Vec<InstalledArtifact>,
    pub extraneous: Vec<InstalledArtifact>,
    pub absent: Vec<InstalledArtifact>,
    pub uninstalled: Vec<InstalledArtifact>,
    pub skipped: Vec<String>,
    /// Labels of records whose install or update failed
    pub failed: Vec<String>,
}

impl ReconcileReport {
    pub fn updated_ids(&self) -> Vec<ArtifactId> {
        self.updated.iter().map(|a| a.id).collect()
    }

    /// Install and update calls that reached the host
    pub fn operation_count(&self) -> usize {
        self.installed.len() + self.updated.len()
    }
}

impl fmt::Display for ReconcileReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} installed, {} updated, {} up to date, {} failed",
            self.installed.len(),
            self.updated.len(),
            self.up_to_date.len(),
            self.failed.len()
        )
    }
}

/// Errors that abort a reconciliation pass
#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error("Failed to {action} {artifact}: {source}")]
    Operation {
        action: &'static str,
        artifact: String,
        #[source]
        source: HostError,
    },

    #[error("Cannot read installed artifacts: {0}")]
    Host(#[from] HostError),
}

enum Applied {
    Installed(InstalledArtifact),
    Updated(InstalledArtifact),
    UpToDate(InstalledArtifact),
}

/// Applies desired records to a host
#[derive(Debug, Clone, Default)]
pub struct Reconciler {
    pub strict: bool,
    pub use_references: bool,
    pub extraneous: ExtraneousPolicy,
    pub duplicates: DuplicatePolicy,
}

impl Reconciler {
    pub fn from_options(options: &LaunchOptions) -> Self {
        Self {
            strict: options.strict,
            use_references: options.use_references,
            extraneous: options.extraneous,
            duplicates: options.duplicates,
        }
    }

    /// Location handed to the host for a record
    fn install_location(&self, spec: &ArtifactSpec) -> Option<ArtifactLocation> {
        let location = spec.preferred_location()?;
        if self.use_references {
            Some(location.to_reference())
        } else {
            Some(location.clone())
        }
    }

    async fn apply(&self, host: &HostHandle, op: &Operation) -> Result<Applied, HostError> {
        let spec = op.spec();
        let location = self.install_location(spec).ok_or_else(|| {
            HostError::InvalidState(format!("{} has no resolved location", spec.label()))
        })?;

        match op {
            Operation::Update { target, .. } => {
                if Some(&target.version) == spec.version() && target.location == location {
                    log::debug!("[{}] Up to date ({})", target.name, target.version);
                    return Ok(Applied::UpToDate(target.clone()));
                }
                let updated = host.update(target.id, &location).await?;
                log::info!(
                    "[{}] Update {} -> {} from {}",
                    target.name,
                    target.version,
                    updated.version,
                    location
                );
                Ok(Applied::Updated(updated))
            }
            Operation::Install { .. } => {
                let installed = host.install(&location).await?;
                log::info!(
                    "[{}] Install {} from {}",
                    installed.name,
                    installed.version,
                    location
                );
                Ok(Applied::Installed(installed))
            }
        }
    }

    /// Bring the host's installed set in line with `desired`
    pub async fn reconcile(
        &self,
        host: &HostHandle,
        desired: &[ArtifactSpec],
    ) -> Result<ReconcileReport, ReconcileError> {
        let installed = host.installed().await?;
        let initial = plan(desired, &installed, self.duplicates);
        let mut report = ReconcileReport {
            absent: initial.absent,
            skipped: initial.skipped.iter().map(|s| s.label()).collect(),
            ..Default::default()
        };

        for spec in &initial.skipped {
            log::info!(
                "[{}] Not installed: another version is already present",
                spec.label()
            );
        }

        let mut operations = initial.operations;
        let mut extraneous = initial.extraneous;
        let mut handled: HashSet<ArtifactId> = HashSet::new();
        let mut reattached = false;
        let mut i = 0;

        while i < operations.len() {
            let op = &operations[i];
            match self.apply(host, op).await {
                Ok(Applied::Installed(a)) => {
                    handled.insert(a.id);
                    report.installed.push(a)
                }
                Ok(Applied::Updated(a)) => {
                    handled.insert(a.id);
                    report.updated.push(a)
                }
                Ok(Applied::UpToDate(a)) => {
                    handled.insert(a.id);
                    report.up_to_date.push(a)
                }
                Err(HostError::ContextInvalidated) if !reattached => {
                    reattached = true;
                    let remaining: Vec<ArtifactSpec> =
                        operations[i..].iter().map(|op| op.spec().clone()).collect();
                    log::warn!(
                        "Host context invalidated, retrying {} remaining artifacts",
                        remaining.len()
                    );
                    host.reattach().await?;
                    // artifacts touched earlier in this pass are never matched twice
                    let installed: Vec<InstalledArtifact> = host
                        .installed()
                        .await?
                        .into_iter()
                        .filter(|a| !handled.contains(&a.id))
                        .collect();
                    let retry = plan(&remaining, &installed, self.duplicates);
                    let replanned: HashSet<&str> =
                        remaining.iter().filter_map(|s| s.name()).collect();
                    extraneous.retain(|a| !replanned.contains(a.name.as_str()));
                    extraneous.extend(retry.extraneous);
                    for spec in &retry.skipped {
                        log::info!(
                            "[{}] Not installed: another version is already present",
                            spec.label()
                        );
                        report.skipped.push(spec.label());
                    }
                    operations = retry.operations;
                    i = 0;
                    continue;
                }
                Err(e) => {
                    let (action, artifact) = match op {
                        Operation::Update { target, .. } => ("update", target.name.clone()),
                        Operation::Install { spec } => ("install", spec.label()),
                    };
                    log::error!("Failed to {} {}: {}", action, artifact, e);
                    if self.strict {
                        return Err(ReconcileError::Operation {
                            action,
                            artifact,
                            source: e,
                        });
                    }
                    report.failed.push(artifact);
                }
            }
            i += 1;
        }

        for artifact in extraneous {
            if self.extraneous == ExtraneousPolicy::Uninstall {
                match host.uninstall(artifact.id).await {
                    Ok(()) => {
                        log::info!(
                            "[{}] Uninstalled extraneous {}",
                            artifact.name,
                            artifact.version
                        );
                        report.uninstalled.push(artifact);
                    }
                    Err(e) => {
                        log::error!("[{}] Failed to uninstall: {}", artifact.name, e);
                        report.extraneous.push(artifact);
                    }
                }
            } else {
                log::warn!(
                    "[{}] {} is installed but not in the desired state",
                    artifact.name,
                    artifact.version
                );
                report.extraneous.push(artifact);
            }
        }

        if !report.absent.is_empty() {
            log::info!("Installed artifacts absent from the desired state:");
            for artifact in &report.absent {
                log::info!("  {}", artifact.identity());
            }
        }
        log::info!("Reconciliation done: {}", report);
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::{ArtifactIdentity, ArtifactKind};
    use crate::host::LifecycleState;

    fn v(s: &str) -> Version {
        s.parse().unwrap()
    }

    fn desired(name: &str, version: &str) -> ArtifactSpec {
        let mut spec = ArtifactSpec::from_identity(ArtifactIdentity::new(name, v(version)));
        spec.set_preferred_location(ArtifactLocation::File(
            format!("bin/{}-{}.tgz", name, version).into(),
        ))
        .unwrap();
        spec.mark_resolved();
        spec
    }

    fn installed(id: ArtifactId, name: &str, version: &str) -> InstalledArtifact {
        InstalledArtifact {
            id,
            name: name.to_string(),
            version: v(version),
            location: ArtifactLocation::File(format!("bin/{}-{}.tgz", name, version).into()),
            state: LifecycleState::Resolved,
            kind: ArtifactKind::Regular,
            extension: None,
            start_level: 4,
        }
    }

    #[test]
    fn test_closest_version_first_wins_ties() {
        let candidates = [v("1.0.2"), v("1.0.0"), v("2.0.0")];
        assert_eq!(closest_version(&v("1.0.1"), &candidates), Some(0));
        assert_eq!(closest_version(&v("1.9.0"), &candidates), Some(2));
        assert_eq!(closest_version(&v("1.0.0"), std::iter::empty()), None);
    }

    #[test]
    fn test_plan_update_and_install() {
        let plan = plan(
            &[desired("core", "1.2.0"), desired("ui", "3.0.0")],
            &[installed(1, "core", "1.1.0")],
            DuplicatePolicy::default(),
        );
        assert_eq!(plan.operations.len(), 2);
        assert!(matches!(
            &plan.operations[0],
            Operation::Update { target, spec }
                if target.id == 1 && spec.version() == Some(&v("1.2.0"))
        ));
        assert!(matches!(
            &plan.operations[1],
            Operation::Install { spec } if spec.name() == Some("ui")
        ));
    }

    #[test]
    fn test_plan_reports_extraneous_and_absent() {
        let plan = plan(
            &[desired("core", "1.2.0")],
            &[
                installed(0, "host", "1.0.0"),
                installed(1, "core", "1.1.0"),
                installed(2, "core", "1.0.0"),
                installed(3, "legacy", "0.9.0"),
            ],
            DuplicatePolicy::default(),
        );
        assert_eq!(plan.operations.len(), 1);
        assert_eq!(plan.extraneous.len(), 1);
        assert_eq!(plan.extraneous[0].id, 2);
        let absent: Vec<_> = plan.absent.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(absent, vec!["legacy"]);
    }

    #[test]
    fn test_plan_skips_unresolved() {
        let unresolved = ArtifactSpec::from_identity(ArtifactIdentity::new("x", v("1.0.0")));
        let plan = plan(&[unresolved], &[], DuplicatePolicy::default());
        assert!(plan.operations.is_empty());
    }
}
