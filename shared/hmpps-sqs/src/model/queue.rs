use std::fmt;
use std::sync::Arc;

use tokio::sync::OnceCell;

use crate::client::MessageQueueClient;
use crate::config::FIFO_SUFFIX;
use crate::error::{QueueError, QueueResult};
use crate::policy::ErrorVisibilityTimeouts;

/// A configured queue and its optional dead letter queue
///
/// Immutable after startup apart from the lazily resolved URLs and redrive
/// `maxReceiveCount`, which are cached after the first successful lookup.
pub struct HmppsQueue {
    id: String,
    queue_name: String,
    sqs_client: Arc<dyn MessageQueueClient>,
    dlq: Option<DeadLetterQueue>,
    error_visibility_timeouts: ErrorVisibilityTimeouts,
    queue_url: OnceCell<String>,
    max_receive_count: OnceCell<Option<u32>>,
}

struct DeadLetterQueue {
    name: String,
    client: Arc<dyn MessageQueueClient>,
    url: OnceCell<String>,
}

impl HmppsQueue {
    /// Creates a queue without a DLQ
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        queue_name: impl Into<String>,
        sqs_client: Arc<dyn MessageQueueClient>,
    ) -> Self {
        Self {
            id: id.into(),
            queue_name: queue_name.into(),
            sqs_client,
            dlq: None,
            error_visibility_timeouts: ErrorVisibilityTimeouts::default(),
            queue_url: OnceCell::new(),
            max_receive_count: OnceCell::new(),
        }
    }

    /// Attaches a dead letter queue
    #[must_use]
    pub fn with_dlq(
        mut self,
        dlq_name: impl Into<String>,
        sqs_dlq_client: Arc<dyn MessageQueueClient>,
    ) -> Self {
        self.dlq = Some(DeadLetterQueue {
            name: dlq_name.into(),
            client: sqs_dlq_client,
            url: OnceCell::new(),
        });
        self
    }

    #[must_use]
    pub fn with_error_visibility_timeouts(mut self, timeouts: ErrorVisibilityTimeouts) -> Self {
        self.error_visibility_timeouts = timeouts;
        self
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn queue_name(&self) -> &str {
        &self.queue_name
    }

    #[must_use]
    pub fn dlq_name(&self) -> Option<&str> {
        self.dlq.as_ref().map(|dlq| dlq.name.as_str())
    }

    #[must_use]
    pub fn sqs_client(&self) -> &Arc<dyn MessageQueueClient> {
        &self.sqs_client
    }

    #[must_use]
    pub fn sqs_dlq_client(&self) -> Option<&Arc<dyn MessageQueueClient>> {
        self.dlq.as_ref().map(|dlq| &dlq.client)
    }

    #[must_use]
    pub const fn error_visibility_timeouts(&self) -> &ErrorVisibilityTimeouts {
        &self.error_visibility_timeouts
    }

    #[must_use]
    pub fn is_fifo(&self) -> bool {
        self.queue_name.ends_with(FIFO_SUFFIX)
    }

    /// URL of the queue, resolved once
    ///
    /// # Errors
    ///
    /// Returns `QueueError` if the provider lookup fails; failures are not cached
    pub async fn queue_url(&self) -> QueueResult<String> {
        self.queue_url
            .get_or_try_init(|| self.sqs_client.queue_url(&self.queue_name))
            .await
            .cloned()
    }

    /// URL of the DLQ, resolved once, or `None` if the queue has no DLQ
    ///
    /// # Errors
    ///
    /// Returns `QueueError` if the provider lookup fails; failures are not cached
    pub async fn dlq_url(&self) -> QueueResult<Option<String>> {
        let Some(dlq) = &self.dlq else {
            return Ok(None);
        };
        dlq.url
            .get_or_try_init(|| dlq.client.queue_url(&dlq.name))
            .await
            .cloned()
            .map(Some)
    }

    /// `maxReceiveCount` of the redrive policy, read once from the provider
    ///
    /// # Errors
    ///
    /// Returns `QueueError` if the attributes cannot be read; failures are not cached
    pub async fn max_receive_count(&self) -> QueueResult<Option<u32>> {
        if self.dlq.is_none() {
            return Ok(None);
        }
        self.max_receive_count
            .get_or_try_init(|| async {
                let queue_url = self.queue_url().await?;
                let attributes = self.sqs_client.queue_attributes(&queue_url).await?;
                Ok::<_, QueueError>(
                    attributes
                        .redrive_policy
                        .map(|policy| policy.max_receive_count),
                )
            })
            .await
            .copied()
    }
}

impl fmt::Debug for HmppsQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HmppsQueue")
            .field("id", &self.id)
            .field("queue_name", &self.queue_name)
            .field("dlq_name", &self.dlq_name())
            .field("error_visibility_timeouts", &self.error_visibility_timeouts)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::testing::InMemoryQueueClient;

    #[tokio::test]
    async fn test_urls_resolved_and_cached() {
        let client = Arc::new(InMemoryQueueClient::new());
        client.create("events");
        client.create("events-dlq");

        let queue = HmppsQueue::new("events", "events", client.clone())
            .with_dlq("events-dlq", client.clone());

        let queue_url = queue.queue_url().await.unwrap();
        assert_eq!(queue_url, InMemoryQueueClient::url_for("events"));
        assert_eq!(
            queue.dlq_url().await.unwrap(),
            Some(InMemoryQueueClient::url_for("events-dlq"))
        );

        queue.queue_url().await.unwrap();
        queue.dlq_url().await.unwrap();
        assert_eq!(client.calls("GetQueueUrl"), 2);
    }

    #[tokio::test]
    async fn test_missing_queue_is_not_cached() {
        let client = Arc::new(InMemoryQueueClient::new());
        let queue = HmppsQueue::new("late", "late", client.clone());

        assert!(queue.queue_url().await.is_err());

        client.create("late");
        assert_eq!(
            queue.queue_url().await.unwrap(),
            InMemoryQueueClient::url_for("late")
        );
    }

    #[tokio::test]
    async fn test_max_receive_count_read_once() {
        let client = Arc::new(InMemoryQueueClient::new());
        client.create("events-dlq");
        client.create_with_redrive("events", "events-dlq", 3);

        let queue = HmppsQueue::new("events", "events", client.clone())
            .with_dlq("events-dlq", client.clone());

        assert_eq!(queue.max_receive_count().await.unwrap(), Some(3));
        assert_eq!(queue.max_receive_count().await.unwrap(), Some(3));
        assert_eq!(client.calls("GetQueueAttributes"), 1);
    }

    #[tokio::test]
    async fn test_no_dlq_means_no_max_receive_count() {
        let client = Arc::new(InMemoryQueueClient::new());
        client.create("plain");

        let queue = HmppsQueue::new("plain", "plain", client.clone());

        assert_eq!(queue.max_receive_count().await.unwrap(), None);
        assert_eq!(queue.dlq_url().await.unwrap(), None);
        assert_eq!(client.calls("GetQueueAttributes"), 0);
    }
}
