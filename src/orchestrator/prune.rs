//! Pruning backup sets

use anyhow::Result;
use tracing::info;

use super::{Orchestrator, WorkflowError};
use crate::aws::ec2::Ec2Operations;
use crate::confirm::ConfirmationGate;

/// Which resource kind of a backup set a prune operates on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PruneTarget {
    /// The snapshots a backup created
    Snapshots,
    /// Detached volumes left behind by restores
    Volumes,
}

impl PruneTarget {
    /// Plural noun used in prompts and messages.
    pub fn label(self) -> &'static str {
        match self {
            PruneTarget::Snapshots => "snapshots",
            PruneTarget::Volumes => "volumes",
        }
    }
}

impl<'a, E: Ec2Operations, G: ConfirmationGate> Orchestrator<'a, E, G> {
    /// Delete all resources of one kind belonging to backup set
    /// `backup_id`, after user confirmation.
    ///
    /// Only detached volumes are candidates; a volume still attached to an
    /// instance is in service and is never offered. With `dry_run` the
    /// candidates are listed and nothing is prompted for or deleted.
    pub async fn prune(&self, target: PruneTarget, backup_id: &str, dry_run: bool) -> Result<()> {
        let resource_ids: Vec<String> = match target {
            PruneTarget::Snapshots => self
                .ec2
                .find_snapshots_by_backup_id(backup_id)
                .await?
                .into_iter()
                .map(|s| s.snapshot_id)
                .collect(),
            PruneTarget::Volumes => self
                .ec2
                .find_volumes_by_backup_id(backup_id)
                .await?
                .into_iter()
                .map(|v| v.volume_id)
                .collect(),
        };

        if resource_ids.is_empty() {
            return Err(WorkflowError::EmptyBackupSet {
                resource_label: target.label(),
                backup_id: backup_id.to_string(),
            }
            .into());
        }

        if dry_run {
            for id in &resource_ids {
                info!(resource_id = %id, "[DRY RUN] Would delete");
            }
            return Ok(());
        }

        self.confirm_and_delete(target, &resource_ids).await?;

        info!(
            count = resource_ids.len(),
            backup_id = %backup_id,
            "Pruned {}",
            target.label()
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aws::tags::TAG_BACKUP_ID;
    use crate::testing::cloud_fixtures::FakeCloud;
    use crate::testing::gate_fixtures::ScriptedGate;

    fn seeded_cloud() -> FakeCloud {
        let cloud = FakeCloud::new();
        cloud.add_snapshot("snap-a", &[(TAG_BACKUP_ID, "b42")]);
        cloud.add_snapshot("snap-b", &[(TAG_BACKUP_ID, "b42")]);
        cloud.add_snapshot("snap-other", &[(TAG_BACKUP_ID, "b43")]);
        cloud
    }

    #[tokio::test]
    async fn test_prune_snapshots_deletes_exactly_the_set() {
        let cloud = seeded_cloud();
        let gate = ScriptedGate::always_delete();
        let orchestrator = Orchestrator::new(&cloud, &gate);

        orchestrator
            .prune(PruneTarget::Snapshots, "b42", false)
            .await
            .unwrap();

        assert_eq!(cloud.snapshot_ids(), vec!["snap-other".to_string()]);
        assert_eq!(
            gate.calls(),
            vec![(
                "snapshots".to_string(),
                vec!["snap-a".to_string(), "snap-b".to_string()]
            )]
        );
    }

    #[tokio::test]
    async fn test_prune_twice_reports_empty_set() {
        let cloud = seeded_cloud();
        let gate = ScriptedGate::always_delete();
        let orchestrator = Orchestrator::new(&cloud, &gate);

        orchestrator
            .prune(PruneTarget::Snapshots, "b42", false)
            .await
            .unwrap();

        let err = orchestrator
            .prune(PruneTarget::Snapshots, "b42", false)
            .await
            .unwrap_err();
        match err.downcast_ref::<WorkflowError>() {
            Some(WorkflowError::EmptyBackupSet {
                resource_label,
                backup_id,
            }) => {
                assert_eq!(*resource_label, "snapshots");
                assert_eq!(backup_id, "b42");
            }
            other => panic!("expected EmptyBackupSet, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_prune_cancel_deletes_nothing() {
        let cloud = seeded_cloud();
        let gate = ScriptedGate::always_cancel();
        let orchestrator = Orchestrator::new(&cloud, &gate);

        let err = orchestrator
            .prune(PruneTarget::Snapshots, "b42", false)
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<WorkflowError>(),
            Some(WorkflowError::UserCancelled)
        ));

        assert_eq!(cloud.snapshot_ids().len(), 3);
        assert!(cloud.ops().iter().all(|op| !op.starts_with("delete_")));
    }

    #[tokio::test]
    async fn test_prune_volumes_skips_attached_volumes() {
        let cloud = FakeCloud::new();
        cloud.add_available_volume("vol-free", &[(TAG_BACKUP_ID, "b42")]);
        cloud.add_available_volume("vol-held", &[(TAG_BACKUP_ID, "b42")]);
        cloud.add_instance("i-1", "vol-root", "us-east-1a", &[]);
        cloud.attach_volume("i-1", "vol-held", "/dev/sdf").await.unwrap();

        let gate = ScriptedGate::always_delete();
        let orchestrator = Orchestrator::new(&cloud, &gate);

        orchestrator
            .prune(PruneTarget::Volumes, "b42", false)
            .await
            .unwrap();

        assert_eq!(
            gate.calls(),
            vec![("volumes".to_string(), vec!["vol-free".to_string()])]
        );
        assert!(cloud.volume("vol-free").is_none());
        assert_eq!(cloud.volume("vol-held").unwrap().state, "in-use");
    }

    #[tokio::test]
    async fn test_prune_dry_run_touches_nothing() {
        let cloud = seeded_cloud();
        let gate = ScriptedGate::always_delete();
        let orchestrator = Orchestrator::new(&cloud, &gate);

        orchestrator
            .prune(PruneTarget::Snapshots, "b42", true)
            .await
            .unwrap();

        assert_eq!(cloud.snapshot_ids().len(), 3);
        assert!(gate.calls().is_empty());
        assert!(cloud.ops().is_empty());
    }
}
