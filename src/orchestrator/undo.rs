//! Compensation log for partially completed restores
//!
//! A restore mutates several resources before its outcome is known. Each
//! forward step records its inverse here; if a later step fails, the log
//! unwinds in reverse and returns instances and volumes to their
//! pre-restore arrangement. Unwinding is best effort: a failed undo step is
//! logged and the rest still run.

use std::time::Duration;

use anyhow::Result;
use tracing::{info, warn};

use crate::aws::ec2::Ec2Operations;

/// Inverse of one forward restore step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UndoAction {
    /// Delete a volume that was created from a snapshot
    DeleteVolume { volume_id: String },
    /// Restart instances that were stopped
    StartInstances { instance_ids: Vec<String> },
    /// Re-attach a detached volume to its original slot
    AttachVolume {
        volume_id: String,
        instance_id: String,
        device: String,
    },
    /// Detach a volume that was newly attached
    DetachVolume { volume_id: String },
}

/// Ordered record of undo actions for one restore run.
///
/// Record the inverse of each step right after the step succeeds; popping
/// in reverse then lands detaches before re-attaches and deletions last.
#[derive(Debug, Default)]
pub struct UndoLog {
    actions: Vec<UndoAction>,
}

impl UndoLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the inverse of a step that just succeeded.
    pub fn record(&mut self, action: UndoAction) {
        self.actions.push(action);
    }

    /// True when nothing remains to undo.
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Discard the log once the restore has fully succeeded.
    pub fn commit(&mut self) {
        self.actions.clear();
    }

    /// Undo all recorded actions in reverse order, best effort.
    pub async fn unwind<E: Ec2Operations>(&mut self, ec2: &E, wait_timeout: Duration) {
        while let Some(action) = self.actions.pop() {
            if let Err(e) = apply(ec2, &action, wait_timeout).await {
                warn!(action = ?action, error = ?e, "Undo step failed, continuing");
            }
        }
    }
}

async fn apply<E: Ec2Operations>(
    ec2: &E,
    action: &UndoAction,
    wait_timeout: Duration,
) -> Result<()> {
    match action {
        UndoAction::DetachVolume { volume_id } => {
            info!(volume_id = %volume_id, "Undoing restore: detaching restored volume");
            ec2.detach_volume(volume_id).await?;
            ec2.wait_volumes_available(std::slice::from_ref(volume_id), wait_timeout)
                .await
        }
        UndoAction::AttachVolume {
            volume_id,
            instance_id,
            device,
        } => {
            info!(
                volume_id = %volume_id,
                instance_id = %instance_id,
                "Undoing restore: re-attaching original volume"
            );
            ec2.wait_volumes_available(std::slice::from_ref(volume_id), wait_timeout)
                .await?;
            ec2.attach_volume(instance_id, volume_id, device).await
        }
        UndoAction::StartInstances { instance_ids } => {
            info!(count = instance_ids.len(), "Undoing restore: restarting instances");
            let changes = ec2.start_instances(instance_ids).await?;
            for (instance_id, state) in changes {
                info!(instance_id = %instance_id, state = %state, "Instance restarting");
            }
            Ok(())
        }
        UndoAction::DeleteVolume { volume_id } => {
            info!(volume_id = %volume_id, "Undoing restore: deleting restored volume");
            ec2.delete_volume(volume_id).await
        }
    }
}
