//! AWS resource tag schema for backup correlation
//!
//! Snapshots and restored volumes carry tags that tie them back to the
//! backup set and source instance they belong to, so every later operation
//! (restore, prune, list) can find them by tag alone.
//!
//! ## Tag Schema
//!
//! | Tag Key | Description |
//! |---------|-------------|
//! | `backup` | Operator-applied tag selecting instances for backup |
//! | `autorestore-backupId` | Backup set identifier stamped on snapshots and restored volumes |
//! | `autorestore-instanceId` | Source instance a snapshot's root volume belonged to |

use std::collections::HashMap;

use aws_sdk_ec2::types::Filter;

/// Tag key operators put on instances to select them for backup
pub const TAG_BACKUP: &str = "backup";

/// Tag key carrying the backup set identifier
pub const TAG_BACKUP_ID: &str = "autorestore-backupId";

/// Tag key carrying the source instance of a snapshot
pub const TAG_INSTANCE_ID: &str = "autorestore-instanceId";

/// Prefix of AWS-managed tag keys, which user requests may not set
pub const AWS_RESERVED_PREFIX: &str = "aws:";

/// Build a describe filter matching resources tagged `key=value`.
pub fn tag_filter(key: &str, value: &str) -> Filter {
    Filter::builder()
        .name(format!("tag:{key}"))
        .values(value)
        .build()
}

/// Collect SDK tag pairs into a map, skipping malformed entries.
pub fn extract_tags(tags: &[aws_sdk_ec2::types::Tag]) -> HashMap<String, String> {
    tags.iter()
        .filter_map(|t| Some((t.key()?.to_string(), t.value()?.to_string())))
        .collect()
}

/// Tags for a snapshot taken from `instance_id` as part of backup set
/// `backup_id`.
///
/// Carries over the instance's own tags so the snapshot stays recognizable,
/// minus AWS-reserved keys (which cannot be set by user requests) and any
/// stale correlation keys left by an earlier restore.
pub fn snapshot_tags(
    instance_tags: &HashMap<String, String>,
    backup_id: &str,
    instance_id: &str,
) -> HashMap<String, String> {
    let mut tags: HashMap<String, String> = instance_tags
        .iter()
        .filter(|(k, _)| {
            !k.starts_with(AWS_RESERVED_PREFIX)
                && k.as_str() != TAG_BACKUP_ID
                && k.as_str() != TAG_INSTANCE_ID
        })
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    tags.insert(TAG_BACKUP_ID.to_string(), backup_id.to_string());
    tags.insert(TAG_INSTANCE_ID.to_string(), instance_id.to_string());
    tags
}

/// Tags for a volume created from a backup snapshot.
///
/// The snapshot's tags minus AWS-reserved keys. The correlation tags are
/// kept on purpose: a restored volume is part of the backup set and must be
/// discoverable by `autorestore-backupId` for pruning.
pub fn restored_volume_tags(snapshot_tags: &HashMap<String, String>) -> HashMap<String, String> {
    snapshot_tags
        .iter()
        .filter(|(k, _)| !k.starts_with(AWS_RESERVED_PREFIX))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

/// Build an EC2 TagSpecification applying `tags` at resource creation.
pub fn ec2_tag_spec(
    resource_type: aws_sdk_ec2::types::ResourceType,
    tags: &HashMap<String, String>,
) -> aws_sdk_ec2::types::TagSpecification {
    use aws_sdk_ec2::types::{Tag, TagSpecification};

    let mut builder = TagSpecification::builder().resource_type(resource_type);
    for (k, v) in tags {
        builder = builder.tags(Tag::builder().key(k).value(v).build());
    }
    builder.build()
}
