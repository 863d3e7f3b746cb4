//! AWS configuration context
//!
//! Loads shared AWS configuration once (region, credentials, profile) and
//! hands out service clients built from it.

use std::sync::Arc;

use anyhow::Result;
use aws_config::{BehaviorVersion, Region, SdkConfig};
use tracing::info;

/// Shared AWS configuration for all service clients.
#[derive(Clone)]
pub struct AwsContext {
    config: Arc<SdkConfig>,
    region: Option<String>,
}

impl AwsContext {
    /// Load AWS configuration from the default provider chain.
    ///
    /// `region` overrides the environment/profile region when given.
    pub async fn new(region: Option<&str>) -> Result<Self> {
        Self::with_profile(region, None).await
    }

    /// Load AWS configuration, optionally from a named profile.
    pub async fn with_profile(region: Option<&str>, profile: Option<&str>) -> Result<Self> {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());

        if let Some(region) = region {
            loader = loader.region(Region::new(region.to_string()));
        }

        if let Some(profile) = profile {
            loader = loader.profile_name(profile);
        }

        let config = loader.load().await;
        let region = config.region().map(|r| r.to_string());

        match &region {
            Some(region) => info!(%region, "Loaded AWS configuration"),
            None => info!("Loaded AWS configuration without an explicit region"),
        }

        Ok(Self {
            config: Arc::new(config),
            region,
        })
    }

    /// Resolved region, if the provider chain produced one.
    pub fn region(&self) -> Option<&str> {
        self.region.as_deref()
    }

    /// Build an EC2 client from the shared configuration.
    pub fn ec2_client(&self) -> aws_sdk_ec2::Client {
        aws_sdk_ec2::Client::new(&self.config)
    }
}

impl std::fmt::Debug for AwsContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AwsContext")
            .field("region", &self.region)
            .finish_non_exhaustive()
    }
}
