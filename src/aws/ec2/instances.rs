//! EC2 instance lifecycle operations

use super::Ec2Client;
use crate::aws::tags::{extract_tags, tag_filter};
use crate::model::{BlockDevice, Instance};
use crate::wait::{wait_for_resource, WaitConfig};
use anyhow::{Context, Result};
use aws_sdk_ec2::types::{Filter, InstanceStateName};
use std::time::Duration;
use tracing::{debug, info};

/// Instance states eligible for backup. Terminated and shutting-down
/// instances are excluded so stale entries never join a backup set.
const ACTIVE_INSTANCE_STATES: &[&str] = &["pending", "running", "stopping", "stopped"];

impl Ec2Client {
    /// Find all instances carrying the tag `tag_key=tag_value`.
    ///
    /// Follows the pagination token until the result set is exhausted, so
    /// backup groups larger than one describe page are still complete.
    pub async fn find_instances_by_tag(
        &self,
        tag_key: &str,
        tag_value: &str,
    ) -> Result<Vec<Instance>> {
        let state_filter = Filter::builder()
            .name("instance-state-name")
            .set_values(Some(
                ACTIVE_INSTANCE_STATES.iter().map(|s| s.to_string()).collect(),
            ))
            .build();

        let mut instances = Vec::new();
        let mut next_token: Option<String> = None;

        loop {
            let mut request = self
                .client
                .describe_instances()
                .filters(tag_filter(tag_key, tag_value))
                .filters(state_filter.clone());

            if let Some(token) = next_token.take() {
                request = request.next_token(token);
            }

            let response = request
                .send()
                .await
                .context("Failed to describe instances")?;

            for reservation in response.reservations() {
                for instance in reservation.instances() {
                    if let Some(converted) = convert_instance(instance) {
                        instances.push(converted);
                    }
                }
            }

            next_token = response.next_token().map(|s| s.to_string());
            if next_token.is_none() {
                break;
            }
        }

        debug!(
            count = instances.len(),
            key = %tag_key,
            value = %tag_value,
            "Found instances by tag"
        );

        Ok(instances)
    }

    /// Look up instances by ID.
    ///
    /// Terminated instances may be missing from the result; callers decide
    /// whether an absent ID is fatal.
    pub async fn find_instances_by_ids(&self, instance_ids: &[String]) -> Result<Vec<Instance>> {
        if instance_ids.is_empty() {
            return Ok(Vec::new());
        }

        let response = self
            .client
            .describe_instances()
            .set_instance_ids(Some(instance_ids.to_vec()))
            .send()
            .await
            .context("Failed to describe instances")?;

        let instances = response
            .reservations()
            .iter()
            .flat_map(|r| r.instances())
            .filter_map(convert_instance)
            .collect();

        Ok(instances)
    }

    /// Stop multiple instances in a single API call
    pub async fn stop_instances(&self, instance_ids: &[String]) -> Result<()> {
        if instance_ids.is_empty() {
            return Ok(());
        }

        info!(count = instance_ids.len(), "Stopping instances");

        self.client
            .stop_instances()
            .set_instance_ids(Some(instance_ids.to_vec()))
            .send()
            .await
            .context("Failed to stop instances")?;

        Ok(())
    }

    /// Start multiple instances in a single API call.
    ///
    /// Returns `(instance_id, current_state)` pairs from the response so
    /// callers can report each instance coming back up.
    pub async fn start_instances(&self, instance_ids: &[String]) -> Result<Vec<(String, String)>> {
        if instance_ids.is_empty() {
            return Ok(Vec::new());
        }

        info!(count = instance_ids.len(), "Starting instances");

        let response = self
            .client
            .start_instances()
            .set_instance_ids(Some(instance_ids.to_vec()))
            .send()
            .await
            .context("Failed to start instances")?;

        let changes = response
            .starting_instances()
            .iter()
            .filter_map(|change| {
                let id = change.instance_id()?.to_string();
                let state = change
                    .current_state()
                    .and_then(|s| s.name())
                    .map(|n| n.as_str().to_string())
                    .unwrap_or_else(|| "unknown".to_string());
                Some((id, state))
            })
            .collect();

        Ok(changes)
    }

    /// Wait for all given instances to reach the stopped state, using
    /// exponential backoff (2-15s) up to `timeout`.
    ///
    /// An instance entering a terminal state (terminated, shutting-down)
    /// aborts the wait with an error.
    pub async fn wait_instances_stopped(
        &self,
        instance_ids: &[String],
        timeout: Duration,
    ) -> Result<()> {
        if instance_ids.is_empty() {
            return Ok(());
        }

        info!(
            count = instance_ids.len(),
            timeout_secs = timeout.as_secs(),
            "Waiting for instances to stop"
        );

        wait_for_resource(
            WaitConfig::with_timeout(timeout),
            || async move {
                let response = self
                    .client
                    .describe_instances()
                    .set_instance_ids(Some(instance_ids.to_vec()))
                    .send()
                    .await
                    .context("Failed to describe instances")?;

                let mut all_stopped = true;
                for reservation in response.reservations() {
                    for instance in reservation.instances() {
                        let id = instance.instance_id().unwrap_or("unknown");
                        let state = instance
                            .state()
                            .and_then(|s| s.name())
                            .unwrap_or(&InstanceStateName::Pending);

                        match state {
                            InstanceStateName::Stopped => {}
                            InstanceStateName::Stopping
                            | InstanceStateName::Running
                            | InstanceStateName::Pending => {
                                all_stopped = false;
                            }
                            _ => {
                                let state_reason = instance
                                    .state_reason()
                                    .and_then(|r| r.message())
                                    .unwrap_or("no state reason provided");
                                anyhow::bail!(
                                    "Instance {} entered unexpected state while stopping: {:?} ({})",
                                    id,
                                    state,
                                    state_reason
                                );
                            }
                        }
                    }
                }

                Ok(all_stopped)
            },
            &format!("{} instance(s) stopped", instance_ids.len()),
        )
        .await
    }
}

/// Convert an SDK instance into the crate's model, skipping entries with
/// no instance ID.
fn convert_instance(instance: &aws_sdk_ec2::types::Instance) -> Option<Instance> {
    let instance_id = instance.instance_id()?.to_string();

    let state = instance
        .state()
        .and_then(|s| s.name())
        .map(|n| n.as_str().to_string())
        .unwrap_or_else(|| "unknown".to_string());

    let availability_zone = instance
        .placement()
        .and_then(|p| p.availability_zone())
        .unwrap_or_default()
        .to_string();

    let root_device_name = instance.root_device_name().unwrap_or_default().to_string();

    let block_devices = instance
        .block_device_mappings()
        .iter()
        .filter_map(|mapping| {
            Some(BlockDevice {
                device_name: mapping.device_name()?.to_string(),
                volume_id: mapping.ebs().and_then(|e| e.volume_id())?.to_string(),
            })
        })
        .collect();

    Some(Instance {
        instance_id,
        state,
        availability_zone,
        root_device_name,
        block_devices,
        tags: extract_tags(instance.tags()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_sdk_ec2::types::{
        EbsInstanceBlockDevice, InstanceBlockDeviceMapping, InstanceState, Placement, Tag,
    };

    fn sdk_instance() -> aws_sdk_ec2::types::Instance {
        aws_sdk_ec2::types::Instance::builder()
            .instance_id("i-123")
            .state(
                InstanceState::builder()
                    .name(InstanceStateName::Running)
                    .build(),
            )
            .placement(Placement::builder().availability_zone("us-east-1a").build())
            .root_device_name("/dev/xvda")
            .block_device_mappings(
                InstanceBlockDeviceMapping::builder()
                    .device_name("/dev/xvda")
                    .ebs(EbsInstanceBlockDevice::builder().volume_id("vol-1").build())
                    .build(),
            )
            .block_device_mappings(
                InstanceBlockDeviceMapping::builder()
                    .device_name("/dev/sdf")
                    .ebs(EbsInstanceBlockDevice::builder().volume_id("vol-2").build())
                    .build(),
            )
            .tags(Tag::builder().key("Name").value("web-1").build())
            .build()
    }

    #[test]
    fn test_convert_instance_full() {
        let converted = convert_instance(&sdk_instance()).unwrap();
        assert_eq!(converted.instance_id, "i-123");
        assert_eq!(converted.state, "running");
        assert_eq!(converted.availability_zone, "us-east-1a");
        assert_eq!(converted.root_device_name, "/dev/xvda");
        assert_eq!(converted.root_volume_id(), Some("vol-1"));
        assert_eq!(converted.block_devices.len(), 2);
        assert_eq!(
            converted.tags.get("Name").map(String::as_str),
            Some("web-1")
        );
    }

    #[test]
    fn test_convert_instance_requires_id() {
        let missing = aws_sdk_ec2::types::Instance::builder().build();
        assert!(convert_instance(&missing).is_none());
    }

    #[test]
    fn test_convert_instance_defaults_for_sparse_response() {
        let sparse = aws_sdk_ec2::types::Instance::builder()
            .instance_id("i-9")
            .build();
        let converted = convert_instance(&sparse).unwrap();
        assert_eq!(converted.state, "unknown");
        assert_eq!(converted.availability_zone, "");
        assert!(converted.block_devices.is_empty());
        assert_eq!(converted.root_volume_id(), None);
    }

    #[test]
    fn test_convert_skips_mappings_without_volume() {
        let instance = aws_sdk_ec2::types::Instance::builder()
            .instance_id("i-5")
            .root_device_name("/dev/xvda")
            .block_device_mappings(
                InstanceBlockDeviceMapping::builder()
                    .device_name("/dev/xvda")
                    .build(),
            )
            .build();
        let converted = convert_instance(&instance).unwrap();
        assert!(converted.block_devices.is_empty());
    }
}
