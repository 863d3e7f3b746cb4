//! Mockable abstraction over EC2 operations

use std::collections::HashMap;
use std::time::Duration;

use anyhow::Result;

use super::Ec2Client;
use crate::model::{Instance, Snapshot, Volume};

/// Trait for EC2 operations that can be mocked in tests.
///
/// This trait abstracts the EC2 client operations to enable unit testing
/// of workflow logic without hitting real AWS.
///
/// Note: Some parameters use owned types instead of references to work
/// around mockall lifetime limitations.
#[allow(async_fn_in_trait)] // Internal use only, Send+Sync bounds on trait are sufficient
#[cfg_attr(test, mockall::automock)]
pub trait Ec2Operations: Send + Sync {
    /// Find all instances carrying the tag `tag_key=tag_value`
    async fn find_instances_by_tag(&self, tag_key: &str, tag_value: &str)
        -> Result<Vec<Instance>>;

    /// Look up instances by ID
    async fn find_instances_by_ids(&self, instance_ids: &[String]) -> Result<Vec<Instance>>;

    /// Stop instances in a single batch call
    async fn stop_instances(&self, instance_ids: &[String]) -> Result<()>;

    /// Start instances, returning `(instance_id, current_state)` pairs
    async fn start_instances(&self, instance_ids: &[String]) -> Result<Vec<(String, String)>>;

    /// Wait until every listed instance is stopped
    async fn wait_instances_stopped(&self, instance_ids: &[String], timeout: Duration)
        -> Result<()>;

    /// Find all snapshots belonging to a backup set
    async fn find_snapshots_by_backup_id(&self, backup_id: &str) -> Result<Vec<Snapshot>>;

    /// Snapshot a volume with tags applied at creation
    async fn create_snapshot(
        &self,
        volume_id: &str,
        tags: HashMap<String, String>,
    ) -> Result<Snapshot>;

    /// Delete a snapshot
    async fn delete_snapshot(&self, snapshot_id: &str) -> Result<()>;

    /// Find available volumes belonging to a backup set
    async fn find_volumes_by_backup_id(&self, backup_id: &str) -> Result<Vec<Volume>>;

    /// Look up volumes by ID, regardless of state
    async fn find_volumes_by_ids(&self, volume_ids: &[String]) -> Result<Vec<Volume>>;

    /// Create a volume from a snapshot in the given availability zone
    async fn create_volume(
        &self,
        snapshot_id: &str,
        availability_zone: &str,
        tags: HashMap<String, String>,
    ) -> Result<Volume>;

    /// Delete a volume
    async fn delete_volume(&self, volume_id: &str) -> Result<()>;

    /// Attach a volume to an instance at the given device slot
    async fn attach_volume(&self, instance_id: &str, volume_id: &str, device: &str) -> Result<()>;

    /// Detach a volume from whatever instance holds it
    async fn detach_volume(&self, volume_id: &str) -> Result<()>;

    /// Wait until every listed volume is available
    async fn wait_volumes_available(&self, volume_ids: &[String], timeout: Duration) -> Result<()>;

    /// Wait until every listed volume is in-use
    async fn wait_volumes_in_use(&self, volume_ids: &[String], timeout: Duration) -> Result<()>;
}

impl Ec2Operations for Ec2Client {
    async fn find_instances_by_tag(
        &self,
        tag_key: &str,
        tag_value: &str,
    ) -> Result<Vec<Instance>> {
        Ec2Client::find_instances_by_tag(self, tag_key, tag_value).await
    }

    async fn find_instances_by_ids(&self, instance_ids: &[String]) -> Result<Vec<Instance>> {
        Ec2Client::find_instances_by_ids(self, instance_ids).await
    }

    async fn stop_instances(&self, instance_ids: &[String]) -> Result<()> {
        Ec2Client::stop_instances(self, instance_ids).await
    }

    async fn start_instances(&self, instance_ids: &[String]) -> Result<Vec<(String, String)>> {
        Ec2Client::start_instances(self, instance_ids).await
    }

    async fn wait_instances_stopped(
        &self,
        instance_ids: &[String],
        timeout: Duration,
    ) -> Result<()> {
        Ec2Client::wait_instances_stopped(self, instance_ids, timeout).await
    }

    async fn find_snapshots_by_backup_id(&self, backup_id: &str) -> Result<Vec<Snapshot>> {
        Ec2Client::find_snapshots_by_backup_id(self, backup_id).await
    }

    async fn create_snapshot(
        &self,
        volume_id: &str,
        tags: HashMap<String, String>,
    ) -> Result<Snapshot> {
        Ec2Client::create_snapshot(self, volume_id, &tags).await
    }

    async fn delete_snapshot(&self, snapshot_id: &str) -> Result<()> {
        Ec2Client::delete_snapshot(self, snapshot_id).await
    }

    async fn find_volumes_by_backup_id(&self, backup_id: &str) -> Result<Vec<Volume>> {
        Ec2Client::find_volumes_by_backup_id(self, backup_id).await
    }

    async fn find_volumes_by_ids(&self, volume_ids: &[String]) -> Result<Vec<Volume>> {
        Ec2Client::find_volumes_by_ids(self, volume_ids).await
    }

    async fn create_volume(
        &self,
        snapshot_id: &str,
        availability_zone: &str,
        tags: HashMap<String, String>,
    ) -> Result<Volume> {
        Ec2Client::create_volume(self, snapshot_id, availability_zone, &tags).await
    }

    async fn delete_volume(&self, volume_id: &str) -> Result<()> {
        Ec2Client::delete_volume(self, volume_id).await
    }

    async fn attach_volume(&self, instance_id: &str, volume_id: &str, device: &str) -> Result<()> {
        Ec2Client::attach_volume(self, instance_id, volume_id, device).await
    }

    async fn detach_volume(&self, volume_id: &str) -> Result<()> {
        Ec2Client::detach_volume(self, volume_id).await
    }

    async fn wait_volumes_available(&self, volume_ids: &[String], timeout: Duration) -> Result<()> {
        Ec2Client::wait_volumes_available(self, volume_ids, timeout).await
    }

    async fn wait_volumes_in_use(&self, volume_ids: &[String], timeout: Duration) -> Result<()> {
        Ec2Client::wait_volumes_in_use(self, volume_ids, timeout).await
    }
}
