//! Domain records for the resources a backup set touches
//!
//! These are thin snapshots of the EC2 wire types, carrying only the fields
//! the workflows correlate on. They are built fresh from describe calls each
//! run and never persisted.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::aws::tags::{TAG_BACKUP_ID, TAG_INSTANCE_ID};

/// A compute instance eligible for backup or restore.
#[derive(Debug, Clone)]
pub struct Instance {
    /// EC2 instance identifier
    pub instance_id: String,
    /// Current power state name (e.g. "running", "stopped")
    pub state: String,
    /// Availability zone the instance (and its volumes) live in
    pub availability_zone: String,
    /// Device name the boot volume is conventionally attached at
    pub root_device_name: String,
    /// Attached block devices, device name to volume ID
    pub block_devices: Vec<BlockDevice>,
    /// All tags on the instance
    pub tags: HashMap<String, String>,
}

/// One attached block device of an [`Instance`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockDevice {
    pub device_name: String,
    pub volume_id: String,
}

impl Instance {
    /// The volume currently attached at the root-device slot, if any.
    ///
    /// Instances whose root mapping is absent (instance-store roots, or
    /// mid-swap states) return `None`; the backup workflow surfaces those
    /// instead of snapshotting a non-root volume.
    pub fn root_volume_id(&self) -> Option<&str> {
        self.block_devices
            .iter()
            .find(|b| b.device_name == self.root_device_name)
            .map(|b| b.volume_id.as_str())
    }
}

/// A block-storage volume.
#[derive(Debug, Clone)]
pub struct Volume {
    /// EBS volume identifier
    pub volume_id: String,
    /// Current state ("creating", "available", "in-use", ...)
    pub state: String,
    /// Availability zone the volume lives in
    pub availability_zone: String,
    /// Snapshot the volume was created from, if any
    pub snapshot_id: Option<String>,
    /// All tags on the volume
    pub tags: HashMap<String, String>,
}

/// A point-in-time copy of a volume.
#[derive(Debug, Clone)]
pub struct Snapshot {
    /// EBS snapshot identifier
    pub snapshot_id: String,
    /// Volume the snapshot was taken from, if still recorded
    pub volume_id: Option<String>,
    /// Current state ("pending", "completed", "error")
    pub state: String,
    /// When the snapshot was started
    pub started_at: Option<DateTime<Utc>>,
    /// All tags on the snapshot
    pub tags: HashMap<String, String>,
}

impl Snapshot {
    /// The backup set this snapshot belongs to.
    pub fn backup_id(&self) -> Option<&str> {
        self.tags.get(TAG_BACKUP_ID).map(String::as_str)
    }

    /// The instance this snapshot was taken from.
    ///
    /// Every snapshot in a backup set carries this correlation tag; its
    /// absence makes the snapshot unrestorable and is treated as fatal by
    /// the restore workflow.
    pub fn source_instance_id(&self) -> Option<&str> {
        self.tags.get(TAG_INSTANCE_ID).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn root_volume_id_matches_root_device_name() {
        let instance = Instance {
            instance_id: "i-1".to_string(),
            state: "running".to_string(),
            availability_zone: "us-east-2a".to_string(),
            root_device_name: "/dev/xvda".to_string(),
            block_devices: vec![
                BlockDevice {
                    device_name: "/dev/xvdf".to_string(),
                    volume_id: "vol-data".to_string(),
                },
                BlockDevice {
                    device_name: "/dev/xvda".to_string(),
                    volume_id: "vol-root".to_string(),
                },
            ],
            tags: HashMap::new(),
        };

        assert_eq!(instance.root_volume_id(), Some("vol-root"));
    }

    #[test]
    fn root_volume_id_none_when_no_mapping_matches() {
        let instance = Instance {
            instance_id: "i-1".to_string(),
            state: "running".to_string(),
            availability_zone: "us-east-2a".to_string(),
            root_device_name: "/dev/xvda".to_string(),
            block_devices: vec![BlockDevice {
                device_name: "/dev/xvdf".to_string(),
                volume_id: "vol-data".to_string(),
            }],
            tags: HashMap::new(),
        };

        assert_eq!(instance.root_volume_id(), None);
    }

    #[test]
    fn snapshot_correlation_tag_accessors() {
        let snapshot = Snapshot {
            snapshot_id: "snap-1".to_string(),
            volume_id: Some("vol-root".to_string()),
            state: "completed".to_string(),
            started_at: None,
            tags: tags(&[
                (TAG_BACKUP_ID, "b42"),
                (TAG_INSTANCE_ID, "i-1"),
                ("Name", "web-1"),
            ]),
        };

        assert_eq!(snapshot.backup_id(), Some("b42"));
        assert_eq!(snapshot.source_instance_id(), Some("i-1"));
    }

    #[test]
    fn snapshot_without_correlation_tags() {
        let snapshot = Snapshot {
            snapshot_id: "snap-1".to_string(),
            volume_id: None,
            state: "pending".to_string(),
            started_at: None,
            tags: tags(&[("Name", "manual-snapshot")]),
        };

        assert_eq!(snapshot.backup_id(), None);
        assert_eq!(snapshot.source_instance_id(), None);
    }
}
