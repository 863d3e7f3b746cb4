//! EC2 client for instance, volume, and snapshot operations

mod instances;
mod operations;
mod snapshots;
mod volumes;

pub use operations::Ec2Operations;

#[cfg(test)]
pub use operations::MockEc2Operations;

use crate::aws::context::AwsContext;
use anyhow::Result;
use aws_sdk_ec2::Client;

/// EC2 client backing the backup, restore, and prune workflows
pub struct Ec2Client {
    pub(crate) client: Client,
}

impl Ec2Client {
    /// Create a new EC2 client (loads AWS config from the environment)
    pub async fn new(region: Option<&str>, profile: Option<&str>) -> Result<Self> {
        let ctx = AwsContext::with_profile(region, profile).await?;
        Ok(Self::from_context(&ctx))
    }

    /// Create an EC2 client from a pre-loaded AWS context
    pub fn from_context(ctx: &AwsContext) -> Self {
        Self {
            client: ctx.ec2_client(),
        }
    }
}
