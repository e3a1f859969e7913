use std::fmt;
use std::sync::Arc;

use crate::client::BucketClient;

/// A configured S3 bucket
pub struct HmppsBucket {
    id: String,
    bucket_name: String,
    client: Arc<dyn BucketClient>,
}

impl HmppsBucket {
    #[must_use]
    pub fn new(id: impl Into<String>, bucket_name: impl Into<String>, client: Arc<dyn BucketClient>) -> Self {
        Self {
            id: id.into(),
            bucket_name: bucket_name.into(),
            client,
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn bucket_name(&self) -> &str {
        &self.bucket_name
    }

    #[must_use]
    pub fn client(&self) -> &Arc<dyn BucketClient> {
        &self.client
    }
}

impl fmt::Debug for HmppsBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HmppsBucket")
            .field("id", &self.id)
            .field("bucket_name", &self.bucket_name)
            .finish_non_exhaustive()
    }
}
