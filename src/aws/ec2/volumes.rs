//! EBS volume operations

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{Context, Result};
use aws_sdk_ec2::types::{Filter, ResourceType, VolumeState};
use tracing::{debug, info};

use super::Ec2Client;
use crate::aws::tags::{ec2_tag_spec, extract_tags, tag_filter, TAG_BACKUP_ID};
use crate::model::Volume;
use crate::wait::{wait_for_resource, WaitConfig};

impl Ec2Client {
    /// Find available volumes belonging to backup set `backup_id`.
    ///
    /// Only detached volumes qualify: a volume currently attached to an
    /// instance is in service and must never be offered for deletion.
    pub async fn find_volumes_by_backup_id(&self, backup_id: &str) -> Result<Vec<Volume>> {
        let mut volumes = Vec::new();
        let mut next_token: Option<String> = None;

        loop {
            let mut request = self
                .client
                .describe_volumes()
                .filters(tag_filter(TAG_BACKUP_ID, backup_id))
                .filters(Filter::builder().name("status").values("available").build());

            if let Some(token) = next_token.take() {
                request = request.next_token(token);
            }

            let response = request
                .send()
                .await
                .context("Failed to describe volumes")?;

            volumes.extend(response.volumes().iter().filter_map(convert_volume));

            next_token = response.next_token().map(|s| s.to_string());
            if next_token.is_none() {
                break;
            }
        }

        debug!(count = volumes.len(), backup_id = %backup_id, "Found volumes by backup id");

        Ok(volumes)
    }

    /// Look up volumes by ID, regardless of state.
    pub async fn find_volumes_by_ids(&self, volume_ids: &[String]) -> Result<Vec<Volume>> {
        if volume_ids.is_empty() {
            return Ok(Vec::new());
        }

        let response = self
            .client
            .describe_volumes()
            .set_volume_ids(Some(volume_ids.to_vec()))
            .send()
            .await
            .context("Failed to describe volumes")?;

        Ok(response.volumes().iter().filter_map(convert_volume).collect())
    }

    /// Create a volume from a snapshot in the given availability zone,
    /// tagged at creation time.
    pub async fn create_volume(
        &self,
        snapshot_id: &str,
        availability_zone: &str,
        tags: &HashMap<String, String>,
    ) -> Result<Volume> {
        info!(
            snapshot_id = %snapshot_id,
            availability_zone = %availability_zone,
            "Creating volume from snapshot"
        );

        let response = self
            .client
            .create_volume()
            .snapshot_id(snapshot_id)
            .availability_zone(availability_zone)
            .tag_specifications(ec2_tag_spec(ResourceType::Volume, tags))
            .send()
            .await
            .with_context(|| format!("Failed to create volume from snapshot {snapshot_id}"))?;

        let volume_id = response
            .volume_id()
            .context("No volume ID returned")?
            .to_string();

        info!(volume_id = %volume_id, snapshot_id = %snapshot_id, "Volume created");

        Ok(Volume {
            volume_id,
            state: response
                .state()
                .map(|s| s.as_str().to_string())
                .unwrap_or_else(|| "creating".to_string()),
            availability_zone: availability_zone.to_string(),
            snapshot_id: Some(snapshot_id.to_string()),
            tags: tags.clone(),
        })
    }

    /// Delete a volume
    pub async fn delete_volume(&self, volume_id: &str) -> Result<()> {
        info!(volume_id = %volume_id, "Deleting volume");

        self.client
            .delete_volume()
            .volume_id(volume_id)
            .send()
            .await
            .with_context(|| format!("Failed to delete volume {volume_id}"))?;

        Ok(())
    }

    /// Attach a volume to an instance at the given device slot
    pub async fn attach_volume(
        &self,
        instance_id: &str,
        volume_id: &str,
        device: &str,
    ) -> Result<()> {
        info!(
            volume_id = %volume_id,
            instance_id = %instance_id,
            device = %device,
            "Attaching volume"
        );

        self.client
            .attach_volume()
            .instance_id(instance_id)
            .volume_id(volume_id)
            .device(device)
            .send()
            .await
            .with_context(|| {
                format!("Failed to attach volume {volume_id} to {instance_id} at {device}")
            })?;

        Ok(())
    }

    /// Detach a volume from whatever instance holds it
    pub async fn detach_volume(&self, volume_id: &str) -> Result<()> {
        info!(volume_id = %volume_id, "Detaching volume");

        self.client
            .detach_volume()
            .volume_id(volume_id)
            .send()
            .await
            .with_context(|| format!("Failed to detach volume {volume_id}"))?;

        Ok(())
    }

    /// Wait for all given volumes to become available, using exponential
    /// backoff (2-15s) up to `timeout`.
    pub async fn wait_volumes_available(
        &self,
        volume_ids: &[String],
        timeout: Duration,
    ) -> Result<()> {
        if volume_ids.is_empty() {
            return Ok(());
        }

        info!(
            count = volume_ids.len(),
            timeout_secs = timeout.as_secs(),
            "Waiting for volumes to become available"
        );

        wait_for_resource(
            WaitConfig::with_timeout(timeout),
            || async move {
                self.check_volume_states(volume_ids, VolumeState::Available)
                    .await
            },
            &format!("{} volume(s) available", volume_ids.len()),
        )
        .await
    }

    /// Wait for all given volumes to reach the in-use state, using
    /// exponential backoff (2-15s) up to `timeout`.
    pub async fn wait_volumes_in_use(&self, volume_ids: &[String], timeout: Duration) -> Result<()> {
        if volume_ids.is_empty() {
            return Ok(());
        }

        info!(
            count = volume_ids.len(),
            timeout_secs = timeout.as_secs(),
            "Waiting for volumes to attach"
        );

        wait_for_resource(
            WaitConfig::with_timeout(timeout),
            || async move {
                self.check_volume_states(volume_ids, VolumeState::InUse)
                    .await
            },
            &format!("{} volume(s) in-use", volume_ids.len()),
        )
        .await
    }

    /// Single poll step shared by both volume waits: true when every volume
    /// reached `target`, error when any volume hit a terminal state.
    async fn check_volume_states(&self, volume_ids: &[String], target: VolumeState) -> Result<bool> {
        let response = self
            .client
            .describe_volumes()
            .set_volume_ids(Some(volume_ids.to_vec()))
            .send()
            .await
            .context("Failed to describe volumes")?;

        let mut all_reached = true;
        for volume in response.volumes() {
            let id = volume.volume_id().unwrap_or("unknown");
            let state = volume.state().unwrap_or(&VolumeState::Creating);

            if *state == target {
                continue;
            }

            match state {
                VolumeState::Error => anyhow::bail!("Volume {} entered error state", id),
                VolumeState::Deleting | VolumeState::Deleted => anyhow::bail!(
                    "Volume {} is {} while waiting for {}",
                    id,
                    state.as_str(),
                    target.as_str()
                ),
                _ => all_reached = false,
            }
        }

        Ok(all_reached)
    }
}

/// Convert an SDK volume into the crate's model, skipping entries with no
/// volume ID.
fn convert_volume(volume: &aws_sdk_ec2::types::Volume) -> Option<Volume> {
    Some(Volume {
        volume_id: volume.volume_id()?.to_string(),
        state: volume
            .state()
            .map(|s| s.as_str().to_string())
            .unwrap_or_else(|| "unknown".to_string()),
        availability_zone: volume.availability_zone().unwrap_or_default().to_string(),
        // AWS reports an empty string for volumes not created from a snapshot
        snapshot_id: volume.snapshot_id().filter(|s| !s.is_empty()).map(String::from),
        tags: extract_tags(volume.tags()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_sdk_ec2::types::Tag;

    #[test]
    fn test_convert_volume_full() {
        let volume = aws_sdk_ec2::types::Volume::builder()
            .volume_id("vol-1")
            .state(VolumeState::Available)
            .availability_zone("us-east-1a")
            .snapshot_id("snap-1")
            .tags(Tag::builder().key(TAG_BACKUP_ID).value("b42").build())
            .build();

        let converted = convert_volume(&volume).unwrap();
        assert_eq!(converted.volume_id, "vol-1");
        assert_eq!(converted.state, "available");
        assert_eq!(converted.availability_zone, "us-east-1a");
        assert_eq!(converted.snapshot_id.as_deref(), Some("snap-1"));
        assert_eq!(
            converted.tags.get(TAG_BACKUP_ID).map(String::as_str),
            Some("b42")
        );
    }

    #[test]
    fn test_convert_volume_requires_id() {
        let missing = aws_sdk_ec2::types::Volume::builder().build();
        assert!(convert_volume(&missing).is_none());
    }

    #[test]
    fn test_convert_volume_blank_snapshot_is_none() {
        let volume = aws_sdk_ec2::types::Volume::builder()
            .volume_id("vol-2")
            .snapshot_id("")
            .build();

        let converted = convert_volume(&volume).unwrap();
        assert_eq!(converted.snapshot_id, None);
        assert_eq!(converted.state, "unknown");
    }
}
