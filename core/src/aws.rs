use aws_config::meta::region::RegionProviderChain;
use aws_config::{BehaviorVersion, Region, SdkConfig};
use tracing::info;

use crate::config::ConsumerConfig;

/// Used when neither `--region` nor the SDK's default chain yields a region.
pub const FALLBACK_REGION: &str = "us-east-1";

/// SDK clients shared by the source and the sinks. Cloning is cheap.
#[derive(Debug, Clone)]
pub struct AwsClients {
    pub s3: aws_sdk_s3::Client,
    pub dynamo: aws_sdk_dynamodb::Client,
}

impl AwsClients {
    /// Resolves region and credentials through the standard SDK chain.
    pub async fn load(config: &ConsumerConfig) -> Self {
        let sdk_config =
            load_sdk_config(config.region.as_deref(), config.endpoint_url.as_deref()).await;
        Self::from_sdk_config(&sdk_config, config.force_path_style())
    }

    pub fn from_sdk_config(sdk_config: &SdkConfig, force_path_style: bool) -> Self {
        let s3_config = aws_sdk_s3::config::Builder::from(sdk_config)
            .force_path_style(force_path_style)
            .build();

        Self {
            s3: aws_sdk_s3::Client::from_conf(s3_config),
            dynamo: aws_sdk_dynamodb::Client::new(sdk_config),
        }
    }
}

pub async fn load_sdk_config(region: Option<&str>, endpoint_url: Option<&str>) -> SdkConfig {
    let region_provider = RegionProviderChain::first_try(region.map(|r| Region::new(r.to_string())))
        .or_default_provider()
        .or_else(Region::new(FALLBACK_REGION));

    let mut loader = aws_config::defaults(BehaviorVersion::latest()).region(region_provider);
    if let Some(endpoint_url) = endpoint_url {
        loader = loader.endpoint_url(endpoint_url);
    }

    let sdk_config = loader.load().await;
    info!(
        "AWS SDK configured for region {}",
        sdk_config
            .region()
            .map(|r| r.as_ref())
            .unwrap_or(FALLBACK_REGION)
    );
    sdk_config
}
