//! Point-in-time backup of tagged instances

use anyhow::Result;
use tracing::{info, warn};

use super::{Orchestrator, PruneTarget, WorkflowError};
use crate::aws::ec2::Ec2Operations;
use crate::aws::tags::{snapshot_tags, TAG_BACKUP};
use crate::confirm::ConfirmationGate;

impl<'a, E: Ec2Operations, G: ConfirmationGate> Orchestrator<'a, E, G> {
    /// Back up every instance tagged `backup=tag_value` by snapshotting its
    /// root volume under backup set `backup_id`.
    ///
    /// Instances are stopped for a consistent root image and restarted once
    /// all snapshots are in flight. If `backup_id` already names existing
    /// snapshots, the user chooses between replacing them and cancelling
    /// before anything is touched.
    pub async fn backup(&self, tag_value: &str, backup_id: &str) -> Result<()> {
        info!(tag_value = %tag_value, backup_id = %backup_id, "Starting backup");

        let instances = self.ec2.find_instances_by_tag(TAG_BACKUP, tag_value).await?;
        if instances.is_empty() {
            return Err(WorkflowError::NoInstancesFound {
                tag_value: tag_value.to_string(),
            }
            .into());
        }
        info!(count = instances.len(), "Instances selected for backup");

        let existing = self.ec2.find_snapshots_by_backup_id(backup_id).await?;
        if !existing.is_empty() {
            let existing_ids: Vec<String> =
                existing.into_iter().map(|s| s.snapshot_id).collect();
            warn!(
                backup_id = %backup_id,
                count = existing_ids.len(),
                "There are existing snapshots with this backup id"
            );
            self.confirm_and_delete(PruneTarget::Snapshots, &existing_ids)
                .await?;
        }

        let instance_ids: Vec<String> =
            instances.iter().map(|i| i.instance_id.clone()).collect();
        self.shutdown_and_wait(&instance_ids).await?;

        // A snapshot failure aborts here with the instances left stopped.
        let mut created = 0usize;
        for instance in &instances {
            let Some(volume_id) = instance.root_volume_id() else {
                warn!(
                    instance_id = %instance.instance_id,
                    root_device = %instance.root_device_name,
                    "Instance has no root volume mapping, skipping"
                );
                continue;
            };

            let tags = snapshot_tags(&instance.tags, backup_id, &instance.instance_id);
            let snapshot = self.ec2.create_snapshot(volume_id, tags).await?;
            info!(
                snapshot_id = %snapshot.snapshot_id,
                instance_id = %instance.instance_id,
                volume_id = %volume_id,
                "Backed up instance root volume"
            );
            created += 1;
        }

        self.start_instances_best_effort(&instance_ids).await;

        if created == 0 {
            anyhow::bail!(
                "Backup {} produced no snapshots: no selected instance exposes a root volume mapping",
                backup_id
            );
        }

        info!(backup_id = %backup_id, count = created, "Backup complete");
        Ok(())
    }
}
