//! Root volume restore from a backup set

use std::collections::{BTreeMap, HashMap};

use anyhow::Result;
use tracing::{info, warn};

use super::undo::{UndoAction, UndoLog};
use super::{Orchestrator, PruneTarget, WorkflowError};
use crate::aws::ec2::Ec2Operations;
use crate::aws::tags::restored_volume_tags;
use crate::confirm::ConfirmationGate;
use crate::model::Instance;

impl<'a, E: Ec2Operations, G: ConfirmationGate> Orchestrator<'a, E, G> {
    /// Swap the root volume of every instance recorded in backup set
    /// `backup_id` for a fresh volume created from that instance's snapshot.
    ///
    /// New volumes are created before anything stops, so a creation failure
    /// leaves the fleet untouched. Once instances are down the old root
    /// volumes are detached and the new ones attached in their place. If a
    /// step fails partway, the completed steps are rolled back so instances
    /// come back up on their original volumes.
    ///
    /// With `delete_replaced` the detached volumes are offered for deletion
    /// once the restore has succeeded.
    pub async fn restore(&self, backup_id: &str, delete_replaced: bool) -> Result<()> {
        let mut undo = UndoLog::new();
        match self.restore_inner(backup_id, delete_replaced, &mut undo).await {
            Ok(()) => Ok(()),
            Err(err) => {
                if !undo.is_empty() {
                    warn!(error = ?err, "Restore failed partway, rolling back completed steps");
                    undo.unwind(self.ec2, self.wait_timeout).await;
                }
                Err(err)
            }
        }
    }

    async fn restore_inner(
        &self,
        backup_id: &str,
        delete_replaced: bool,
        undo: &mut UndoLog,
    ) -> Result<()> {
        info!(backup_id = %backup_id, "Starting restore");

        let snapshots = self.ec2.find_snapshots_by_backup_id(backup_id).await?;
        if snapshots.is_empty() {
            return Err(WorkflowError::EmptyBackupSet {
                resource_label: "snapshots",
                backup_id: backup_id.to_string(),
            }
            .into());
        }

        // One snapshot per source instance; the backup workflow never
        // produces duplicates, but if a set holds two snapshots for the same
        // instance the later one wins.
        let mut snapshot_by_instance = BTreeMap::new();
        for snapshot in &snapshots {
            let instance_id = snapshot.source_instance_id().ok_or_else(|| {
                WorkflowError::MissingInstanceTag {
                    snapshot_id: snapshot.snapshot_id.clone(),
                }
            })?;
            info!(
                instance_id = %instance_id,
                snapshot_id = %snapshot.snapshot_id,
                "Matched snapshot to source instance"
            );
            snapshot_by_instance.insert(instance_id.to_string(), snapshot);
        }

        let instance_ids: Vec<String> = snapshot_by_instance.keys().cloned().collect();
        let fetched = self.ec2.find_instances_by_ids(&instance_ids).await?;
        let instances: HashMap<&str, &Instance> =
            fetched.iter().map(|i| (i.instance_id.as_str(), i)).collect();
        for instance_id in &instance_ids {
            if !instances.contains_key(instance_id.as_str()) {
                anyhow::bail!(
                    "Instance {} recorded in backup {} no longer exists",
                    instance_id,
                    backup_id
                );
            }
        }

        let mut new_volume_by_instance: BTreeMap<String, String> = BTreeMap::new();
        for (instance_id, snapshot) in &snapshot_by_instance {
            let instance = instances[instance_id.as_str()];
            info!(
                snapshot_id = %snapshot.snapshot_id,
                instance_id = %instance_id,
                availability_zone = %instance.availability_zone,
                "Creating volume from snapshot"
            );
            let volume = self
                .ec2
                .create_volume(
                    &snapshot.snapshot_id,
                    &instance.availability_zone,
                    restored_volume_tags(&snapshot.tags),
                )
                .await?;
            undo.record(UndoAction::DeleteVolume {
                volume_id: volume.volume_id.clone(),
            });
            new_volume_by_instance.insert(instance_id.clone(), volume.volume_id);
        }

        self.shutdown_and_wait(&instance_ids).await?;
        undo.record(UndoAction::StartInstances {
            instance_ids: instance_ids.clone(),
        });

        let mut replaced: Vec<String> = Vec::new();
        for instance_id in &instance_ids {
            let instance = instances[instance_id.as_str()];
            let Some(old_volume_id) = instance.root_volume_id() else {
                warn!(
                    instance_id = %instance_id,
                    root_device = %instance.root_device_name,
                    "Instance has no root volume attached, nothing to detach"
                );
                continue;
            };
            info!(
                volume_id = %old_volume_id,
                instance_id = %instance_id,
                "Detaching current root volume"
            );
            self.ec2.detach_volume(old_volume_id).await?;
            undo.record(UndoAction::AttachVolume {
                volume_id: old_volume_id.to_string(),
                instance_id: instance_id.clone(),
                device: instance.root_device_name.clone(),
            });
            replaced.push(old_volume_id.to_string());
        }
        if !replaced.is_empty() {
            self.ec2
                .wait_volumes_available(&replaced, self.wait_timeout)
                .await?;
        }

        let mut attached: Vec<String> = Vec::new();
        for (instance_id, new_volume_id) in &new_volume_by_instance {
            let instance = instances[instance_id.as_str()];
            info!(
                volume_id = %new_volume_id,
                instance_id = %instance_id,
                device = %instance.root_device_name,
                "Attaching restored volume"
            );
            match self
                .ec2
                .attach_volume(instance_id, new_volume_id, &instance.root_device_name)
                .await
            {
                Ok(()) => {
                    undo.record(UndoAction::DetachVolume {
                        volume_id: new_volume_id.clone(),
                    });
                    attached.push(new_volume_id.clone());
                }
                Err(err) => {
                    warn!(
                        volume_id = %new_volume_id,
                        instance_id = %instance_id,
                        error = ?err,
                        "Failed to attach restored volume, instance is left without a root volume"
                    );
                }
            }
        }
        if !attached.is_empty() {
            self.ec2
                .wait_volumes_in_use(&attached, self.wait_timeout)
                .await?;
        }

        self.start_instances_best_effort(&instance_ids).await;
        undo.commit();
        info!(backup_id = %backup_id, count = attached.len(), "Restore complete");

        if delete_replaced {
            if replaced.is_empty() {
                info!("No volumes were replaced, nothing to delete");
            } else {
                let volumes = self.ec2.find_volumes_by_ids(&replaced).await?;
                let volume_ids: Vec<String> =
                    volumes.into_iter().map(|v| v.volume_id).collect();
                self.confirm_and_delete(PruneTarget::Volumes, &volume_ids).await?;
            }
        }
        Ok(())
    }
}
