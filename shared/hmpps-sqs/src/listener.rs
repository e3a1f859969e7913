use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::client::ReceivedMessage;
use crate::error::QueueResult;
use crate::model::HmppsQueue;
use crate::visibility::ErrorVisibilityHandler;

/// Error returned by a [`MessageHandler`]
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Processes messages received by a [`QueueListener`]
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, message: &ReceivedMessage) -> Result<(), HandlerError>;
}

/// Polls a queue and dispatches its messages to a handler
///
/// Handled messages are deleted. Failed ones get their visibility timeout
/// from the [`ErrorVisibilityHandler`] and are redelivered by the provider.
/// Use [`QueueRegistry::error_visibility_handler`](crate::registry::QueueRegistry::error_visibility_handler)
/// so the configured default schedule applies.
pub struct QueueListener {
    queue: Arc<HmppsQueue>,
    handler: Arc<dyn MessageHandler>,
    visibility: ErrorVisibilityHandler,
    max_messages: i32,
    wait_time_seconds: i32,
    shutdown: CancellationToken,
}

impl QueueListener {
    #[must_use]
    pub fn new(
        queue: Arc<HmppsQueue>,
        handler: Arc<dyn MessageHandler>,
        visibility: ErrorVisibilityHandler,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            queue,
            handler,
            visibility,
            max_messages: 10,
            wait_time_seconds: 20,
            shutdown,
        }
    }

    #[must_use]
    pub const fn with_polling(mut self, max_messages: i32, wait_time_seconds: i32) -> Self {
        self.max_messages = max_messages;
        self.wait_time_seconds = wait_time_seconds;
        self
    }

    /// Polls until the shutdown token is cancelled
    ///
    /// Cancellation interrupts a pending receive but never a batch already
    /// received, so handled messages are always deleted.
    pub async fn start(self) {
        info!(queue_id = %self.queue.id(), "Starting queue listener");

        loop {
            let received = tokio::select! {
                biased;
                () = self.shutdown.cancelled() => break,
                received = self.receive() => received,
            };

            match received {
                Ok((queue_url, messages)) => {
                    self.process(&queue_url, messages).await;
                }
                Err(e) => {
                    warn!(queue_id = %self.queue.id(), error = %e, "Failed to poll queue");
                    tokio::select! {
                        () = tokio::time::sleep(Duration::from_secs(1)) => {},
                        () = self.shutdown.cancelled() => {},
                    }
                }
            }
        }

        info!(queue_id = %self.queue.id(), "Queue listener shutdown complete");
    }

    /// Receives one batch and processes it, returning how many were handled
    ///
    /// # Errors
    ///
    /// Returns `QueueError` if the queue cannot be resolved or read
    #[instrument(skip(self), fields(queue_id = %self.queue.id()))]
    pub async fn poll_once(&self) -> QueueResult<usize> {
        let (queue_url, messages) = self.receive().await?;
        Ok(self.process(&queue_url, messages).await)
    }

    async fn receive(&self) -> QueueResult<(String, Vec<ReceivedMessage>)> {
        let queue_url = self.queue.queue_url().await?;
        let messages = self
            .queue
            .sqs_client()
            .receive_messages(&queue_url, self.max_messages, self.wait_time_seconds)
            .await?;
        Ok((queue_url, messages))
    }

    async fn process(&self, queue_url: &str, messages: Vec<ReceivedMessage>) -> usize {
        let mut handled = 0;
        for message in messages {
            match self.handler.handle(&message).await {
                Ok(()) => {
                    handled += 1;
                    if let Err(e) = self
                        .queue
                        .sqs_client()
                        .delete(queue_url, &message.receipt_handle)
                        .await
                    {
                        warn!(message_id = %message.message_id, error = %e, "Failed to delete handled message");
                    }
                }
                Err(e) => {
                    warn!(message_id = %message.message_id, error = %e, "Failed to handle message");
                    self.visibility.apply(&self.queue, &message).await;
                }
            }
        }
        handled
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::policy::{ErrorVisibilityTimeouts, VisibilityTimeoutPolicy};
    use crate::testing::InMemoryQueueClient;

    struct RejectContaining(&'static str);

    #[async_trait]
    impl MessageHandler for RejectContaining {
        async fn handle(&self, message: &ReceivedMessage) -> Result<(), HandlerError> {
            if message.body.contains(self.0) {
                return Err("rejected".into());
            }
            Ok(())
        }
    }

    fn listener(client: &Arc<InMemoryQueueClient>, shutdown: CancellationToken) -> QueueListener {
        client.create("work-dlq");
        client.create_with_redrive("work", "work-dlq", 5);
        let queue = HmppsQueue::new("work", "work", client.clone())
            .with_dlq("work-dlq", client.clone())
            .with_error_visibility_timeouts(ErrorVisibilityTimeouts {
                error_visibility_timeout: vec![30],
                ..ErrorVisibilityTimeouts::default()
            });
        QueueListener::new(
            Arc::new(queue),
            Arc::new(RejectContaining("bad")),
            ErrorVisibilityHandler::new(VisibilityTimeoutPolicy::default()),
            shutdown,
        )
        .with_polling(10, 0)
    }

    #[tokio::test]
    async fn test_handled_deleted_failed_delayed() {
        let client = Arc::new(InMemoryQueueClient::new());
        let listener = listener(&client, CancellationToken::new());
        client.seed_body("work", "good");
        client.seed_body("work", "bad");

        assert_eq!(listener.poll_once().await.unwrap(), 1);

        assert_eq!(client.calls("DeleteMessage"), 1);
        assert_eq!(client.in_flight("work"), 1);
        let changes = client.visibility_changes();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].2, 30);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_stops_when_cancelled() {
        let client = Arc::new(InMemoryQueueClient::new());
        let shutdown = CancellationToken::new();
        let listener = listener(&client, shutdown.clone());
        client.seed_body("work", "good");

        let handle = tokio::spawn(listener.start());
        while client.calls("DeleteMessage") == 0 {
            tokio::task::yield_now().await;
        }
        shutdown.cancel();

        handle.await.unwrap();
        assert!(client.visible("work").is_empty());
    }

    struct CancelOnHandle(CancellationToken);

    #[async_trait]
    impl MessageHandler for CancelOnHandle {
        async fn handle(&self, _message: &ReceivedMessage) -> Result<(), HandlerError> {
            self.0.cancel();
            tokio::task::yield_now().await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_shutdown_finishes_current_batch() {
        let client = Arc::new(InMemoryQueueClient::new());
        client.create("work");
        let shutdown = CancellationToken::new();
        let listener = QueueListener::new(
            Arc::new(HmppsQueue::new("work", "work", client.clone())),
            Arc::new(CancelOnHandle(shutdown.clone())),
            ErrorVisibilityHandler::default(),
            shutdown,
        )
        .with_polling(10, 0);
        client.seed_body("work", "first");
        client.seed_body("work", "second");
        client.seed_body("work", "third");

        listener.start().await;

        assert_eq!(client.calls("DeleteMessage"), 3);
        assert_eq!(client.in_flight("work"), 0);
        assert!(client.visible("work").is_empty());
    }
}
