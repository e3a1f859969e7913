use async_trait::async_trait;
use aws_sdk_s3::Client as S3Client;

use super::BucketClient;
use crate::error::{QueueError, QueueResult};

/// S3 backed bucket client
#[derive(Debug, Clone)]
pub struct S3BucketClient {
    s3_client: S3Client,
}

impl S3BucketClient {
    #[must_use]
    pub const fn new(s3_client: S3Client) -> Self {
        Self { s3_client }
    }
}

#[async_trait]
impl BucketClient for S3BucketClient {
    async fn head_bucket(&self, bucket_name: &str) -> QueueResult<()> {
        self.s3_client
            .head_bucket()
            .bucket(bucket_name)
            .send()
            .await
            .map_err(|e| QueueError::from_sdk("HeadBucket", &e))?;

        Ok(())
    }
}
