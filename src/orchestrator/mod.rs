//! Backup, restore, and prune workflows
//!
//! Each workflow runs as a sequence of control-plane calls against an
//! [`Ec2Operations`] implementation, with every deletion routed through a
//! [`ConfirmationGate`]. Workflows are sequential on purpose: the operations
//! are coarse (stop a fleet, snapshot its roots) and the failure handling
//! depends on knowing exactly how far a run got.

mod backup;
mod list;
mod prune;
mod restore;
mod undo;

pub use list::{inventory_json, inventory_table, BackupSetInventory};
pub use prune::PruneTarget;

use std::time::Duration;

use anyhow::Result;
use thiserror::Error;
use tracing::{info, warn};

use crate::aws::ec2::Ec2Operations;
use crate::confirm::{Confirmation, ConfirmationGate};
use crate::defaults::DEFAULT_WAIT_TIMEOUT;

/// Workflow outcomes that calling code dispatches on.
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// No instances carry the requested backup tag
    #[error("No instances found with tag backup={tag_value}")]
    NoInstancesFound { tag_value: String },

    /// The named backup set has no resources of the requested kind
    #[error("No {resource_label} found with backup id '{backup_id}'")]
    EmptyBackupSet {
        resource_label: &'static str,
        backup_id: String,
    },

    /// A snapshot in the set does not name its source instance
    #[error("Snapshot {snapshot_id} is missing the 'autorestore-instanceId' tag")]
    MissingInstanceTag { snapshot_id: String },

    /// The user declined a delete prompt; nothing was deleted
    #[error("cancelled by user")]
    UserCancelled,
}

/// Runs the backup, restore, and prune workflows against an EC2 control
/// plane and a confirmation gate.
pub struct Orchestrator<'a, E, G> {
    ec2: &'a E,
    gate: &'a G,
    wait_timeout: Duration,
}

impl<'a, E: Ec2Operations, G: ConfirmationGate> Orchestrator<'a, E, G> {
    /// Create a workflow runner with the default five-minute state waits.
    pub fn new(ec2: &'a E, gate: &'a G) -> Self {
        Self {
            ec2,
            gate,
            wait_timeout: DEFAULT_WAIT_TIMEOUT,
        }
    }

    /// Override the bound on state-transition waits.
    pub fn with_wait_timeout(mut self, wait_timeout: Duration) -> Self {
        self.wait_timeout = wait_timeout;
        self
    }

    /// Stop the given instances and wait until every one reports stopped.
    async fn shutdown_and_wait(&self, instance_ids: &[String]) -> Result<()> {
        self.ec2.stop_instances(instance_ids).await?;
        self.ec2
            .wait_instances_stopped(instance_ids, self.wait_timeout)
            .await
    }

    /// Restart instances, logging each outcome. A failed restart never
    /// fails the surrounding workflow; the data work is already done and
    /// the operator can start the instances by hand.
    async fn start_instances_best_effort(&self, instance_ids: &[String]) {
        if instance_ids.is_empty() {
            return;
        }
        match self.ec2.start_instances(instance_ids).await {
            Ok(changes) => {
                for (instance_id, state) in changes {
                    info!(instance_id = %instance_id, state = %state, "Instance restarting");
                }
            }
            Err(e) => {
                warn!(
                    error = ?e,
                    instances = %instance_ids.join(", "),
                    "Failed to restart instances; start them manually"
                );
            }
        }
    }

    /// Gate a deletion behind user confirmation, then delete one resource
    /// at a time, stopping at the first failure.
    ///
    /// Cancelling yields [`WorkflowError::UserCancelled`] with nothing
    /// deleted.
    async fn confirm_and_delete(&self, target: PruneTarget, resource_ids: &[String]) -> Result<()> {
        match self.gate.confirm_delete(target.label(), resource_ids)? {
            Confirmation::Cancel => Err(WorkflowError::UserCancelled.into()),
            Confirmation::Delete => {
                for id in resource_ids {
                    match target {
                        PruneTarget::Snapshots => self.ec2.delete_snapshot(id).await?,
                        PruneTarget::Volumes => self.ec2.delete_volume(id).await?,
                    }
                }
                Ok(())
            }
        }
    }
}
