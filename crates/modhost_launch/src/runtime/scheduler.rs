//! Start-level scheduler
//!
//! Installed artifacts are matched back to their desired records (closest
//! version, same as reconciliation) and started tier by tier in ascending
//! start level. The caller raises the host threshold to `max level + 1` only
//! after every start call of the batch has been issued.

use crate::artifact::{ArtifactSpec, Version};
use crate::host::{HostHandle, InstalledArtifact, LifecycleState, ROOT_ARTIFACT_ID};
use crate::runtime::reconcile::{closest_version, group_desired};
use std::collections::BTreeMap;

/// Installed artifacts with their desired start flag, keyed by start level
#[derive(Debug, Default)]
pub struct StartBatch {
    levels: BTreeMap<u32, Vec<(InstalledArtifact, bool)>>,
}

impl StartBatch {
    /// Intersect the desired records with what is installed now
    pub fn build(desired: &[ArtifactSpec], installed: &[InstalledArtifact]) -> Self {
        let desired_by_name = group_desired(desired);
        let mut batch = Self::default();

        for artifact in installed.iter().filter(|a| a.id != ROOT_ARTIFACT_ID) {
            let Some(specs) = desired_by_name.get(&artifact.name) else {
                continue;
            };
            let versions: Vec<&Version> = specs.iter().filter_map(|s| s.version()).collect();
            let Some(pos) = closest_version(&artifact.version, versions) else {
                continue;
            };
            let spec = specs[pos];
            batch.push(spec.start_level, artifact.clone(), spec.auto_start);
        }
        batch
    }

    pub fn push(&mut self, level: u32, artifact: InstalledArtifact, start: bool) {
        self.levels.entry(level).or_default().push((artifact, start));
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// Highest start level in the batch, 0 when empty
    pub fn max_level(&self) -> u32 {
        self.levels.keys().next_back().copied().unwrap_or(0)
    }

    /// Entries in ascending start level
    pub fn iter(&self) -> impl Iterator<Item = (u32, &InstalledArtifact, bool)> {
        self.levels
            .iter()
            .flat_map(|(level, entries)| entries.iter().map(move |(a, s)| (*level, a, *s)))
    }
}

/// Threshold that keeps every scheduled level running
pub fn threshold_for(max_level: u32) -> u32 {
    max_level + 1
}

/// Assign start levels and issue start calls in ascending level order.
///
/// Returns the highest level encountered. Per-artifact failures are logged
/// and never abort the batch.
pub async fn schedule(host: &HostHandle, batch: &StartBatch) -> u32 {
    let mut max_level = 0;

    for (level, artifact, start) in batch.iter() {
        max_level = max_level.max(level);
        if artifact.is_fragment() || artifact.id == ROOT_ARTIFACT_ID {
            continue;
        }

        match host.artifact_state(artifact.id).await {
            Some(LifecycleState::Uninstalled) | None => {
                log::warn!(
                    "[{}] Uninstalled before it could be started, skipping",
                    artifact.name
                );
                continue;
            }
            Some(_) => {}
        }

        match host.set_artifact_start_level(artifact.id, level).await {
            Ok(()) => log::info!("[{}] Start level {}", artifact.name, level),
            Err(e) => log::warn!(
                "[{}] Cannot set start level {}: {}",
                artifact.name,
                level,
                e
            ),
        }

        if start {
            if let Err(e) = host.start_artifact(artifact.id).await {
                log::error!("[{}] Failed to start: {}", artifact.name, e);
            }
        }
    }

    max_level
}
