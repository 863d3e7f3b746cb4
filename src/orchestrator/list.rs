//! Backup set inventory for the list command

use anyhow::Result;
use comfy_table::{presets::UTF8_FULL_CONDENSED, Cell, ContentArrangement, Table};
use serde_json::json;
use tracing::warn;

use super::Orchestrator;
use crate::aws::ec2::Ec2Operations;
use crate::aws::error::classify_anyhow_error;
use crate::aws::tags::TAG_INSTANCE_ID;
use crate::confirm::ConfirmationGate;
use crate::model::{Instance, Snapshot, Volume};

/// Everything a backup id currently maps to: its snapshots, any restored
/// volumes still sitting detached, and the source instances that still exist.
#[derive(Debug)]
pub struct BackupSetInventory {
    pub backup_id: String,
    pub snapshots: Vec<Snapshot>,
    pub volumes: Vec<Volume>,
    pub instances: Vec<Instance>,
}

impl BackupSetInventory {
    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty() && self.volumes.is_empty() && self.instances.is_empty()
    }
}

impl<'a, E: Ec2Operations, G: ConfirmationGate> Orchestrator<'a, E, G> {
    /// Gather every resource associated with `backup_id`.
    ///
    /// An empty result is not an error here; the list command reports it as
    /// a normal outcome. Source instances that have since been terminated
    /// are skipped with a warning rather than failing the whole listing.
    pub async fn inventory(&self, backup_id: &str) -> Result<BackupSetInventory> {
        let snapshots = self.ec2.find_snapshots_by_backup_id(backup_id).await?;
        let volumes = self.ec2.find_volumes_by_backup_id(backup_id).await?;

        let mut source_ids: Vec<String> = snapshots
            .iter()
            .filter_map(|s| s.source_instance_id())
            .map(String::from)
            .collect();
        source_ids.sort_unstable();
        source_ids.dedup();

        let mut instances = Vec::new();
        for instance_id in &source_ids {
            match self
                .ec2
                .find_instances_by_ids(std::slice::from_ref(instance_id))
                .await
            {
                Ok(found) => instances.extend(found),
                Err(err) if classify_anyhow_error(&err).is_not_found() => {
                    warn!(instance_id = %instance_id, "Source instance no longer exists");
                }
                Err(err) => return Err(err),
            }
        }

        Ok(BackupSetInventory {
            backup_id: backup_id.to_string(),
            snapshots,
            volumes,
            instances,
        })
    }
}

/// Render an inventory as a table, one row per resource.
pub fn inventory_table(inventory: &BackupSetInventory) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Type"),
            Cell::new("ID"),
            Cell::new("State"),
            Cell::new("Instance"),
            Cell::new("Created"),
        ]);

    for snapshot in &inventory.snapshots {
        table.add_row(vec![
            Cell::new("snapshot"),
            Cell::new(&snapshot.snapshot_id),
            Cell::new(&snapshot.state),
            Cell::new(snapshot.source_instance_id().unwrap_or("-")),
            Cell::new(
                snapshot
                    .started_at
                    .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                    .unwrap_or_else(|| "-".to_string()),
            ),
        ]);
    }

    for volume in &inventory.volumes {
        table.add_row(vec![
            Cell::new("volume"),
            Cell::new(&volume.volume_id),
            Cell::new(&volume.state),
            Cell::new(
                volume
                    .tags
                    .get(TAG_INSTANCE_ID)
                    .map(String::as_str)
                    .unwrap_or("-"),
            ),
            Cell::new("-"),
        ]);
    }

    for instance in &inventory.instances {
        table.add_row(vec![
            Cell::new("instance"),
            Cell::new(&instance.instance_id),
            Cell::new(&instance.state),
            Cell::new("-"),
            Cell::new("-"),
        ]);
    }

    table
}

/// Render an inventory as a JSON document for scripting.
pub fn inventory_json(inventory: &BackupSetInventory) -> serde_json::Value {
    json!({
        "backup_id": inventory.backup_id,
        "snapshots": inventory.snapshots.iter().map(|s| {
            json!({
                "id": s.snapshot_id,
                "state": s.state,
                "volume_id": s.volume_id,
                "instance_id": s.source_instance_id(),
                "started_at": s.started_at.map(|t| t.to_rfc3339()),
            })
        }).collect::<Vec<_>>(),
        "volumes": inventory.volumes.iter().map(|v| {
            json!({
                "id": v.volume_id,
                "state": v.state,
                "availability_zone": v.availability_zone,
                "snapshot_id": v.snapshot_id,
                "instance_id": v.tags.get(TAG_INSTANCE_ID),
            })
        }).collect::<Vec<_>>(),
        "instances": inventory.instances.iter().map(|i| {
            json!({
                "id": i.instance_id,
                "state": i.state,
                "availability_zone": i.availability_zone,
                "root_volume_id": i.root_volume_id(),
            })
        }).collect::<Vec<_>>(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aws::ec2::MockEc2Operations;
    use crate::aws::tags::TAG_BACKUP_ID;
    use crate::testing::cloud_fixtures::FakeCloud;
    use crate::testing::gate_fixtures::ScriptedGate;
    use anyhow::anyhow;
    use std::collections::HashMap;

    #[tokio::test]
    async fn test_inventory_collects_backup_set() {
        let cloud = FakeCloud::new();
        cloud.add_instance("i-1", "vol-1", "us-east-1a", &[("backup", "nightly")]);
        cloud.add_snapshot(
            "snap-1",
            &[(TAG_BACKUP_ID, "b42"), (TAG_INSTANCE_ID, "i-1")],
        );
        cloud.add_available_volume(
            "vol-9",
            &[(TAG_BACKUP_ID, "b42"), (TAG_INSTANCE_ID, "i-1")],
        );
        let gate = ScriptedGate::always_cancel();
        let orchestrator = Orchestrator::new(&cloud, &gate);

        let inventory = orchestrator.inventory("b42").await.unwrap();

        assert_eq!(inventory.snapshots.len(), 1);
        assert_eq!(inventory.volumes.len(), 1);
        assert_eq!(inventory.instances.len(), 1);
        assert_eq!(inventory.instances[0].instance_id, "i-1");
        assert!(!inventory.is_empty());
    }

    #[tokio::test]
    async fn test_inventory_skips_terminated_source_instances() {
        let cloud = FakeCloud::new();
        cloud.add_snapshot(
            "snap-1",
            &[(TAG_BACKUP_ID, "b42"), (TAG_INSTANCE_ID, "i-gone")],
        );
        let gate = ScriptedGate::always_cancel();
        let orchestrator = Orchestrator::new(&cloud, &gate);

        let inventory = orchestrator.inventory("b42").await.unwrap();

        assert_eq!(inventory.snapshots.len(), 1);
        assert!(inventory.instances.is_empty());
    }

    #[tokio::test]
    async fn test_inventory_empty_set_is_not_an_error() {
        let cloud = FakeCloud::new();
        let gate = ScriptedGate::always_cancel();
        let orchestrator = Orchestrator::new(&cloud, &gate);

        let inventory = orchestrator.inventory("b99").await.unwrap();
        assert!(inventory.is_empty());
    }

    #[tokio::test]
    async fn test_inventory_propagates_non_not_found_errors() {
        let mut ec2 = MockEc2Operations::new();
        ec2.expect_find_snapshots_by_backup_id().returning(|_| {
            Ok(vec![crate::model::Snapshot {
                snapshot_id: "snap-1".to_string(),
                volume_id: None,
                state: "completed".to_string(),
                started_at: None,
                tags: HashMap::from([
                    (TAG_INSTANCE_ID.to_string(), "i-1".to_string()),
                ]),
            }])
        });
        ec2.expect_find_volumes_by_backup_id()
            .returning(|_| Ok(Vec::new()));
        ec2.expect_find_instances_by_ids()
            .returning(|_| Err(anyhow!("connection reset by peer")));

        let gate = ScriptedGate::always_cancel();
        let orchestrator = Orchestrator::new(&ec2, &gate);

        let err = orchestrator.inventory("b42").await.unwrap_err();
        assert!(err.to_string().contains("connection reset"), "{err}");
    }

    #[test]
    fn test_table_shows_each_resource_kind() {
        let inventory = BackupSetInventory {
            backup_id: "b42".to_string(),
            snapshots: vec![crate::model::Snapshot {
                snapshot_id: "snap-1".to_string(),
                volume_id: Some("vol-1".to_string()),
                state: "completed".to_string(),
                started_at: chrono::DateTime::from_timestamp(1_700_000_000, 0),
                tags: HashMap::from([
                    (TAG_INSTANCE_ID.to_string(), "i-1".to_string()),
                ]),
            }],
            volumes: vec![crate::model::Volume {
                volume_id: "vol-9".to_string(),
                state: "available".to_string(),
                availability_zone: "us-east-1a".to_string(),
                snapshot_id: Some("snap-1".to_string()),
                tags: HashMap::new(),
            }],
            instances: vec![],
        };

        let rendered = inventory_table(&inventory).to_string();
        assert!(rendered.contains("snap-1"));
        assert!(rendered.contains("completed"));
        assert!(rendered.contains("i-1"));
        assert!(rendered.contains("2023-11-14"));
        assert!(rendered.contains("vol-9"));
        assert!(rendered.contains("available"));
    }

    #[test]
    fn test_json_shape_round_trips_optional_fields() {
        let inventory = BackupSetInventory {
            backup_id: "b42".to_string(),
            snapshots: vec![crate::model::Snapshot {
                snapshot_id: "snap-1".to_string(),
                volume_id: None,
                state: "pending".to_string(),
                started_at: None,
                tags: HashMap::new(),
            }],
            volumes: vec![],
            instances: vec![],
        };

        let value = inventory_json(&inventory);
        assert_eq!(value["backup_id"], "b42");
        assert_eq!(value["snapshots"][0]["id"], "snap-1");
        assert_eq!(value["snapshots"][0]["state"], "pending");
        assert!(value["snapshots"][0]["instance_id"].is_null());
        assert!(value["snapshots"][0]["started_at"].is_null());
        assert_eq!(value["volumes"].as_array().map(Vec::len), Some(0));
    }
}
