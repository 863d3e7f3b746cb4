//! EBS snapshot operations

use std::collections::HashMap;

use anyhow::{Context, Result};
use aws_sdk_ec2::primitives::DateTime as AwsDateTime;
use aws_sdk_ec2::types::ResourceType;
use chrono::{DateTime, Utc};
use tracing::{debug, info};

use super::Ec2Client;
use crate::aws::tags::{ec2_tag_spec, extract_tags, tag_filter, TAG_BACKUP_ID};
use crate::model::Snapshot;

impl Ec2Client {
    /// Find all snapshots belonging to backup set `backup_id`.
    ///
    /// Scoped to snapshots this account owns; public and shared snapshots
    /// never match. Follows the pagination token until exhausted.
    pub async fn find_snapshots_by_backup_id(&self, backup_id: &str) -> Result<Vec<Snapshot>> {
        let mut snapshots = Vec::new();
        let mut next_token: Option<String> = None;

        loop {
            let mut request = self
                .client
                .describe_snapshots()
                .owner_ids("self")
                .filters(tag_filter(TAG_BACKUP_ID, backup_id));

            if let Some(token) = next_token.take() {
                request = request.next_token(token);
            }

            let response = request
                .send()
                .await
                .context("Failed to describe snapshots")?;

            snapshots.extend(response.snapshots().iter().filter_map(convert_snapshot));

            next_token = response.next_token().map(|s| s.to_string());
            if next_token.is_none() {
                break;
            }
        }

        debug!(count = snapshots.len(), backup_id = %backup_id, "Found snapshots by backup id");

        Ok(snapshots)
    }

    /// Snapshot a volume, tagging the snapshot at creation time.
    ///
    /// Returns as soon as EC2 accepts the request; the snapshot completes
    /// in the background and is restorable from the moment it exists.
    pub async fn create_snapshot(
        &self,
        volume_id: &str,
        tags: &HashMap<String, String>,
    ) -> Result<Snapshot> {
        info!(volume_id = %volume_id, "Creating snapshot");

        let response = self
            .client
            .create_snapshot()
            .volume_id(volume_id)
            .tag_specifications(ec2_tag_spec(ResourceType::Snapshot, tags))
            .send()
            .await
            .with_context(|| format!("Failed to create snapshot of volume {volume_id}"))?;

        let snapshot_id = response
            .snapshot_id()
            .context("No snapshot ID returned")?
            .to_string();

        info!(snapshot_id = %snapshot_id, volume_id = %volume_id, "Snapshot created");

        Ok(Snapshot {
            snapshot_id,
            volume_id: Some(volume_id.to_string()),
            state: response
                .state()
                .map(|s| s.as_str().to_string())
                .unwrap_or_else(|| "pending".to_string()),
            started_at: response.start_time().and_then(convert_timestamp),
            tags: tags.clone(),
        })
    }

    /// Delete a snapshot
    pub async fn delete_snapshot(&self, snapshot_id: &str) -> Result<()> {
        info!(snapshot_id = %snapshot_id, "Deleting snapshot");

        self.client
            .delete_snapshot()
            .snapshot_id(snapshot_id)
            .send()
            .await
            .with_context(|| format!("Failed to delete snapshot {snapshot_id}"))?;

        Ok(())
    }
}

fn convert_timestamp(dt: &AwsDateTime) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(dt.secs(), dt.subsec_nanos())
}

/// Convert an SDK snapshot into the crate's model, skipping entries with
/// no snapshot ID.
fn convert_snapshot(snapshot: &aws_sdk_ec2::types::Snapshot) -> Option<Snapshot> {
    Some(Snapshot {
        snapshot_id: snapshot.snapshot_id()?.to_string(),
        volume_id: snapshot.volume_id().filter(|s| !s.is_empty()).map(String::from),
        state: snapshot
            .state()
            .map(|s| s.as_str().to_string())
            .unwrap_or_else(|| "unknown".to_string()),
        started_at: snapshot.start_time().and_then(convert_timestamp),
        tags: extract_tags(snapshot.tags()),
    })
}
