//! EC2 integration tests - actually call AWS APIs
//!
//! These tests are marked `#[ignore]` and only run with:
//! ```
//! AWS_PROFILE=your_profile cargo test --test aws_ec2_integration -- --ignored
//! ```
//!
//! The snapshot lifecycle test additionally needs a scratch volume to work
//! against; point EC2_AUTORESTORE_TEST_VOLUME at one you can afford to
//! snapshot.


use std::collections::HashMap;

use aws_test_helpers::*;
use ec2_autorestore::aws::tags::{TAG_BACKUP_ID, TAG_INSTANCE_ID};
use ec2_autorestore::aws::Ec2Client;

/// Test that tag discovery returns cleanly when nothing matches
#[tokio::test]
#[ignore]
async fn test_find_instances_by_unused_tag_value() {
    let region = get_test_region();
    let client = Ec2Client::new(Some(&region), None)
        .await
        .expect("AWS credentials required - set AWS_PROFILE or AWS_ACCESS_KEY_ID");

    let instances = client
        .find_instances_by_tag("backup", &unique_backup_id())
        .await
        .expect("Should describe instances");
    assert!(
        instances.is_empty(),
        "Fresh tag value should match nothing, got: {:?}",
        instances.len()
    );
}

/// Test that snapshot discovery scoped to this account returns cleanly
#[tokio::test]
#[ignore]
async fn test_find_snapshots_by_unknown_backup_id() {
    let region = get_test_region();
    let client = Ec2Client::new(Some(&region), None)
        .await
        .expect("AWS credentials required");

    let snapshots = client
        .find_snapshots_by_backup_id(&unique_backup_id())
        .await
        .expect("Should describe snapshots");
    assert!(snapshots.is_empty());
}

/// Test that volume discovery filters to available volumes and returns cleanly
#[tokio::test]
#[ignore]
async fn test_find_volumes_by_unknown_backup_id() {
    let region = get_test_region();
    let client = Ec2Client::new(Some(&region), None)
        .await
        .expect("AWS credentials required");

    let volumes = client
        .find_volumes_by_backup_id(&unique_backup_id())
        .await
        .expect("Should describe volumes");
    assert!(volumes.is_empty());
}

/// Test snapshot create/discover/delete against a scratch volume
#[tokio::test]
#[ignore]
async fn test_snapshot_lifecycle() {
    let Ok(volume_id) = std::env::var("EC2_AUTORESTORE_TEST_VOLUME") else {
        eprintln!("EC2_AUTORESTORE_TEST_VOLUME not set, skipping snapshot lifecycle test");
        return;
    };

    let region = get_test_region();
    let client = Ec2Client::new(Some(&region), None)
        .await
        .expect("AWS credentials required");

    let backup_id = unique_backup_id();
    let mut tags = HashMap::new();
    tags.insert(TAG_BACKUP_ID.to_string(), backup_id.clone());
    tags.insert(TAG_INSTANCE_ID.to_string(), "i-integration-test".to_string());

    let snapshot = client
        .create_snapshot(&volume_id, &tags)
        .await
        .expect("Should create snapshot");
    assert!(
        snapshot.snapshot_id.starts_with("snap-"),
        "Snapshot ID should start with 'snap-', got: {}",
        snapshot.snapshot_id
    );

    // The correlation tags must make it discoverable by backup id
    let found = client
        .find_snapshots_by_backup_id(&backup_id)
        .await
        .expect("Should describe snapshots");
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].snapshot_id, snapshot.snapshot_id);
    assert_eq!(found[0].source_instance_id(), Some("i-integration-test"));

    client
        .delete_snapshot(&snapshot.snapshot_id)
        .await
        .expect("Should delete snapshot");
}
