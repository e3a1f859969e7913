use std::sync::Arc;
use std::time::Duration;

use aws_config::{retry::RetryConfig, timeout::TimeoutConfig, BehaviorVersion, Region};
use aws_credential_types::provider::SharedCredentialsProvider;

use super::{
    BucketClient, MessageBroker, MessageQueueClient, S3BucketClient, SnsMessageBroker,
    SqsMessageQueueClient,
};
use crate::config::{HmppsSqsProperties, Provider};

/// Static credentials for a single queue, DLQ or topic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
}

impl Credentials {
    /// Pairs an optional access key with an optional secret
    #[must_use]
    pub fn from_pair(access_key_id: Option<&str>, secret_access_key: Option<&str>) -> Option<Self> {
        Some(Self {
            access_key_id: access_key_id?.to_string(),
            secret_access_key: secret_access_key?.to_string(),
        })
    }
}

/// Builds provider clients for queues, topics and buckets
pub trait ClientFactory: Send + Sync {
    fn sqs_client(&self, credentials: Option<&Credentials>) -> Arc<dyn MessageQueueClient>;

    fn sns_client(&self, credentials: Option<&Credentials>) -> Arc<dyn MessageBroker>;

    fn bucket_client(&self) -> Arc<dyn BucketClient>;
}

/// Client factory for AWS and `LocalStack`
#[derive(Debug, Clone)]
pub struct AwsClientFactory {
    provider: Provider,
    sdk_config: aws_config::SdkConfig,
}

impl AwsClientFactory {
    /// Loads the shared SDK configuration for the configured provider
    pub async fn from_properties(properties: &HmppsSqsProperties) -> Self {
        let retry_config = RetryConfig::standard()
            .with_max_attempts(3)
            .with_initial_backoff(Duration::from_millis(50));

        let timeout_config = TimeoutConfig::builder()
            .operation_timeout(Duration::from_secs(30))
            .build();

        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(properties.region.clone()))
            .retry_config(retry_config)
            .timeout_config(timeout_config);

        if properties.provider == Provider::Localstack {
            loader = loader
                .endpoint_url(&properties.localstack_url)
                .credentials_provider(aws_credential_types::Credentials::from_keys(
                    "test", "test", None,
                ));
        }

        Self {
            provider: properties.provider,
            sdk_config: loader.load().await,
        }
    }

    fn config_for(&self, credentials: Option<&Credentials>) -> aws_config::SdkConfig {
        match credentials {
            Some(credentials) => self
                .sdk_config
                .to_builder()
                .credentials_provider(SharedCredentialsProvider::new(
                    aws_credential_types::Credentials::from_keys(
                        &credentials.access_key_id,
                        &credentials.secret_access_key,
                        None,
                    ),
                ))
                .build(),
            None => self.sdk_config.clone(),
        }
    }
}

impl ClientFactory for AwsClientFactory {
    fn sqs_client(&self, credentials: Option<&Credentials>) -> Arc<dyn MessageQueueClient> {
        let client = aws_sdk_sqs::Client::new(&self.config_for(credentials));
        Arc::new(SqsMessageQueueClient::new(client))
    }

    fn sns_client(&self, credentials: Option<&Credentials>) -> Arc<dyn MessageBroker> {
        let client = aws_sdk_sns::Client::new(&self.config_for(credentials));
        Arc::new(SnsMessageBroker::new(client))
    }

    fn bucket_client(&self) -> Arc<dyn BucketClient> {
        let s3_config: aws_sdk_s3::Config = (&self.sdk_config).into();
        let mut builder = s3_config.to_builder();

        // Override "force path style" to true for compatibility with LocalStack
        // https://github.com/awslabs/aws-sdk-rust/discussions/874
        if self.provider == Provider::Localstack {
            builder.set_force_path_style(Some(true));
        }

        Arc::new(S3BucketClient::new(aws_sdk_s3::Client::from_conf(
            builder.build(),
        )))
    }
}
