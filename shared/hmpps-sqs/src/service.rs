//! Dead letter queue retry, purge and inspection

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{error, info, instrument, warn};

use crate::client::{MessageQueueClient, OutboundMessage};
use crate::error::QueueResult;
use crate::json::JsonDecoder;
use crate::model::{
    DlqMessage, GetDlqResult, HmppsQueue, PurgeQueueRequest, PurgeQueueResult, RetryDlqResult,
};
use crate::registry::QueueRegistry;
use crate::telemetry::{TelemetryClient, PURGE_QUEUE_EVENT, RETRY_DLQ_EVENT};

/// Upper bound on the time a single DLQ retry keeps receiving
pub const DEFAULT_DRAIN_DEADLINE: Duration = Duration::from_secs(300);

/// Largest batch the provider returns from one receive
const MAX_RECEIVE_BATCH: i32 = 10;

/// Moves, discards and inspects messages on the configured queues
pub struct HmppsQueueService {
    registry: Arc<QueueRegistry>,
    telemetry: Arc<dyn TelemetryClient>,
    decoder: JsonDecoder,
    drain_deadline: Duration,
}

impl HmppsQueueService {
    #[must_use]
    pub fn new(
        registry: Arc<QueueRegistry>,
        telemetry: Arc<dyn TelemetryClient>,
        decoder: JsonDecoder,
    ) -> Self {
        Self {
            registry,
            telemetry,
            decoder,
            drain_deadline: DEFAULT_DRAIN_DEADLINE,
        }
    }

    #[must_use]
    pub const fn with_drain_deadline(mut self, drain_deadline: Duration) -> Self {
        self.drain_deadline = drain_deadline;
        self
    }

    #[must_use]
    pub const fn registry(&self) -> &Arc<QueueRegistry> {
        &self.registry
    }

    /// Moves the messages on a queue's DLQ back onto the queue
    ///
    /// The number of messages attempted is the DLQ count observed up front;
    /// messages that arrive later are left for the next run. A message is sent
    /// before it is deleted, so a crash in between leaves it on both queues.
    ///
    /// # Errors
    ///
    /// Returns `QueueError` if the queues cannot be resolved or counted.
    /// Failures moving individual messages are logged and skipped.
    #[instrument(skip_all, fields(queue_id = %queue.id()))]
    pub async fn retry_dlq(&self, queue: &HmppsQueue) -> QueueResult<RetryDlqResult> {
        let (Some(dlq_client), Some(dlq_name)) = (queue.sqs_dlq_client(), queue.dlq_name()) else {
            return Ok(RetryDlqResult::empty());
        };
        let Some(dlq_url) = queue.dlq_url().await? else {
            return Ok(RetryDlqResult::empty());
        };

        let messages_found_count = dlq_client.approximate_message_count(&dlq_url).await?;
        let deadline = Instant::now() + self.drain_deadline;
        let mut messages = Vec::new();

        if messages_found_count > 0 {
            let queue_url = queue.queue_url().await?;
            for _ in 0..messages_found_count {
                if Instant::now() >= deadline {
                    warn!(dlq_name, moved = messages.len(), "DLQ retry deadline reached");
                    break;
                }
                match self
                    .retry_one(queue, dlq_client.as_ref(), &dlq_url, &queue_url)
                    .await
                {
                    Ok(Some(message)) => messages.push(message),
                    Ok(None) => {}
                    Err(e) => warn!(dlq_name, error = %e, "Failed to retry DLQ message"),
                }
            }

            self.telemetry.track_event(
                RETRY_DLQ_EVENT,
                &HashMap::from([
                    ("dlq-name".to_string(), dlq_name.to_string()),
                    ("messages-found".to_string(), messages_found_count.to_string()),
                    ("messages-retried".to_string(), messages.len().to_string()),
                ]),
            );
        }

        info!(
            dlq_name,
            messages_found = messages_found_count,
            messages_retried = messages.len(),
            "Retried DLQ"
        );

        Ok(RetryDlqResult {
            messages_found_count,
            messages,
        })
    }

    async fn retry_one(
        &self,
        queue: &HmppsQueue,
        dlq_client: &dyn MessageQueueClient,
        dlq_url: &str,
        queue_url: &str,
    ) -> QueueResult<Option<DlqMessage>> {
        let Some(message) = dlq_client.receive_one(dlq_url).await? else {
            return Ok(None);
        };

        let (message_group_id, message_deduplication_id) = if queue.is_fifo() {
            (
                message.message_group_id().map(ToString::to_string),
                Some(uuid::Uuid::new_v4().to_string()),
            )
        } else {
            (None, None)
        };

        queue
            .sqs_client()
            .send(
                queue_url,
                OutboundMessage {
                    body: message.body.clone(),
                    message_attributes: message.message_attributes.clone(),
                    message_group_id,
                    message_deduplication_id,
                },
            )
            .await?;
        dlq_client.delete(dlq_url, &message.receipt_handle).await?;

        Ok(Some(DlqMessage {
            body: self.decoder.decode_object(&message.body),
            message_id: message.message_id,
            message_attributes: message.message_attributes,
        }))
    }

    /// Retries the DLQ of every queue in configuration order
    ///
    /// A queue whose retry fails is reported with an empty result and the
    /// sweep carries on.
    pub async fn retry_all_dlqs(&self) -> Vec<RetryDlqResult> {
        let mut results = Vec::with_capacity(self.registry.queues().len());
        for queue in self.registry.queues() {
            let result = match self.retry_dlq(queue).await {
                Ok(result) => result,
                Err(e) => {
                    error!(queue_id = %queue.id(), error = %e, "Failed to retry DLQ");
                    RetryDlqResult::empty()
                }
            };
            results.push(result);
        }
        results
    }

    /// Purges a queue unless it already looks empty
    ///
    /// # Errors
    ///
    /// Returns `QueueError` if the queue cannot be counted or purged
    #[instrument(skip_all, fields(queue_name = %request.queue_name))]
    pub async fn purge_queue(&self, request: &PurgeQueueRequest) -> QueueResult<PurgeQueueResult> {
        let messages_found_count = request
            .client
            .approximate_message_count(&request.queue_url)
            .await?;

        if messages_found_count > 0 {
            request.client.purge(&request.queue_url).await?;
            self.telemetry.track_event(
                PURGE_QUEUE_EVENT,
                &HashMap::from([
                    ("queue-name".to_string(), request.queue_name.clone()),
                    ("messages-found".to_string(), messages_found_count.to_string()),
                ]),
            );
            info!(messages_found = messages_found_count, "Purged queue");
        }

        Ok(PurgeQueueResult {
            messages_found_count,
        })
    }

    /// Purges the DLQ of a queue; a queue without a DLQ has nothing to purge
    ///
    /// # Errors
    ///
    /// Returns `QueueError` if the DLQ cannot be resolved, counted or purged
    pub async fn purge_dlq(&self, queue: &HmppsQueue) -> QueueResult<PurgeQueueResult> {
        match self.dlq_purge_request(queue).await? {
            Some(request) => self.purge_queue(&request).await,
            None => Ok(PurgeQueueResult {
                messages_found_count: 0,
            }),
        }
    }

    /// Finds a queue or DLQ by name, main queue names first
    ///
    /// # Errors
    ///
    /// Returns `QueueError` if the URL of a matching queue cannot be resolved
    pub async fn find_queue_to_purge(&self, name: &str) -> QueueResult<Option<PurgeQueueRequest>> {
        if let Some(queue) = self.registry.find_by_queue_name(name) {
            return Ok(Some(PurgeQueueRequest {
                queue_name: queue.queue_name().to_string(),
                client: queue.sqs_client().clone(),
                queue_url: queue.queue_url().await?,
            }));
        }
        match self.registry.find_by_dlq_name(name) {
            Some(queue) => self.dlq_purge_request(queue).await,
            None => Ok(None),
        }
    }

    async fn dlq_purge_request(&self, queue: &HmppsQueue) -> QueueResult<Option<PurgeQueueRequest>> {
        let (Some(client), Some(dlq_name)) = (queue.sqs_dlq_client(), queue.dlq_name()) else {
            return Ok(None);
        };
        Ok(queue.dlq_url().await?.map(|queue_url| PurgeQueueRequest {
            queue_name: dlq_name.to_string(),
            client: client.clone(),
            queue_url,
        }))
    }

    /// Reads up to `max_messages` DLQ messages without deleting them
    ///
    /// Messages read stay invisible for the DLQ's visibility timeout, so a
    /// second call shortly after returns fewer.
    ///
    /// # Errors
    ///
    /// Returns `QueueError` if the DLQ cannot be resolved, counted or read
    #[instrument(skip_all, fields(queue_id = %queue.id(), max_messages = max_messages))]
    pub async fn get_dlq_messages(&self, queue: &HmppsQueue, max_messages: i32) -> QueueResult<GetDlqResult> {
        let (Some(dlq_client), Some(dlq_url)) = (queue.sqs_dlq_client(), queue.dlq_url().await?) else {
            return Ok(GetDlqResult {
                messages_found_count: 0,
                messages_returned_count: 0,
                messages: Vec::new(),
            });
        };

        let messages_found_count = dlq_client.approximate_message_count(&dlq_url).await?;
        let wanted = messages_found_count.min(max_messages).max(0);

        let mut messages = Vec::new();
        while i32::try_from(messages.len()).unwrap_or(i32::MAX) < wanted {
            let remaining = wanted - i32::try_from(messages.len()).unwrap_or(i32::MAX);
            let batch = dlq_client
                .receive_messages(&dlq_url, remaining.min(MAX_RECEIVE_BATCH), 0)
                .await?;
            if batch.is_empty() {
                break;
            }
            messages.extend(batch.into_iter().map(|message| DlqMessage {
                body: self.decoder.decode_object(&message.body),
                message_id: message.message_id,
                message_attributes: message.message_attributes,
            }));
        }

        Ok(GetDlqResult {
            messages_found_count,
            messages_returned_count: i32::try_from(messages.len()).unwrap_or(i32::MAX),
            messages,
        })
    }
}

impl fmt::Debug for HmppsQueueService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HmppsQueueService")
            .field("registry", &self.registry)
            .field("decoder", &self.decoder)
            .field("drain_deadline", &self.drain_deadline)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::client::{MessageAttributeValue, MessageAttributes};
    use crate::testing::{InMemoryQueueClient, RecordingTelemetryClient};

    struct Fixture {
        client: Arc<InMemoryQueueClient>,
        telemetry: Arc<RecordingTelemetryClient>,
        service: HmppsQueueService,
    }

    fn fixture() -> Fixture {
        let client = Arc::new(InMemoryQueueClient::new());
        for name in ["events", "events-dlq", "orders.fifo", "orders-dlq.fifo", "plain"] {
            client.create(name);
        }
        let registry = QueueRegistry::new(
            vec![
                HmppsQueue::new("events", "events", client.clone())
                    .with_dlq("events-dlq", client.clone()),
                HmppsQueue::new("orders", "orders.fifo", client.clone())
                    .with_dlq("orders-dlq.fifo", client.clone()),
                HmppsQueue::new("plain", "plain", client.clone()),
            ],
            Vec::new(),
            Vec::new(),
        );
        let telemetry = Arc::new(RecordingTelemetryClient::new());
        let service = HmppsQueueService::new(
            Arc::new(registry),
            telemetry.clone(),
            JsonDecoder::default(),
        );
        Fixture {
            client,
            telemetry,
            service,
        }
    }

    impl Fixture {
        fn queue(&self, id: &str) -> Arc<HmppsQueue> {
            self.service.registry().find_by_queue_id(id).unwrap().clone()
        }
    }

    #[tokio::test]
    async fn test_retry_moves_every_message() {
        let f = fixture();
        let mut attributes = MessageAttributes::new();
        attributes.insert("eventType".to_string(), MessageAttributeValue::string("a"));
        f.client.seed(
            "events-dlq",
            OutboundMessage {
                body: r#"{"id":1}"#.to_string(),
                message_attributes: attributes.clone(),
                ..OutboundMessage::default()
            },
        );
        f.client.seed_body("events-dlq", r#"{"id":2}"#);

        let result = f.service.retry_dlq(&f.queue("events")).await.unwrap();

        assert_eq!(result.messages_found_count, 2);
        assert_eq!(result.messages.len(), 2);
        assert_eq!(result.messages[0].body["id"], json!(1));
        assert_eq!(result.messages[1].body["id"], json!(2));

        assert!(f.client.visible("events-dlq").is_empty());
        assert_eq!(f.client.in_flight("events-dlq"), 0);
        let moved = f.client.visible("events");
        assert_eq!(moved.len(), 2);
        assert_eq!(moved[0].body, r#"{"id":1}"#);
        assert_eq!(moved[0].message_attributes, attributes);
        assert_eq!(moved[1].body, r#"{"id":2}"#);
        assert_eq!(result.messages[0].message_attributes, attributes);
        assert!(result.messages[1].message_attributes.is_empty());

        let events = f.telemetry.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].0, "RetryDLQ");
        assert_eq!(events[0].1["dlq-name"], "events-dlq");
        assert_eq!(events[0].1["messages-found"], "2");
        assert_eq!(events[0].1["messages-retried"], "2");
    }

    #[tokio::test]
    async fn test_retry_reports_raced_messages() {
        let f = fixture();
        f.client.seed_body("events-dlq", r#"{"id":1}"#);
        f.client.report_count("events-dlq", 2);

        let result = f.service.retry_dlq(&f.queue("events")).await.unwrap();

        assert_eq!(result.messages_found_count, 2);
        assert_eq!(result.messages.len(), 1);
        assert_eq!(f.client.calls("ReceiveMessage"), 2);

        let events = f.telemetry.events();
        assert_eq!(events[0].1["messages-found"], "2");
        assert_eq!(events[0].1["messages-retried"], "1");
    }

    #[tokio::test]
    async fn test_retry_without_dlq_is_empty() {
        let f = fixture();

        let result = f.service.retry_dlq(&f.queue("plain")).await.unwrap();

        assert_eq!(result, RetryDlqResult::empty());
        assert_eq!(f.client.calls("ReceiveMessage"), 0);
        assert!(f.telemetry.events().is_empty());
    }

    #[tokio::test]
    async fn test_retry_empty_dlq_emits_nothing() {
        let f = fixture();

        let result = f.service.retry_dlq(&f.queue("events")).await.unwrap();

        assert_eq!(result, RetryDlqResult::empty());
        assert!(f.telemetry.events().is_empty());
    }

    #[tokio::test]
    async fn test_retry_keeps_message_when_send_fails() {
        let f = fixture();
        f.client.seed_body("events-dlq", r#"{"id":1}"#);
        f.client.fail_operation("SendMessage");

        let result = f.service.retry_dlq(&f.queue("events")).await.unwrap();

        assert_eq!(result.messages_found_count, 1);
        assert!(result.messages.is_empty());
        assert_eq!(f.client.calls("DeleteMessage"), 0);
        assert_eq!(f.client.in_flight("events-dlq"), 1);
    }

    #[tokio::test]
    async fn test_fifo_retry_forwards_group() {
        let f = fixture();
        f.client.seed(
            "orders-dlq.fifo",
            OutboundMessage {
                body: "{}".to_string(),
                message_group_id: Some("booking-1".to_string()),
                message_deduplication_id: Some("original".to_string()),
                ..OutboundMessage::default()
            },
        );

        let result = f.service.retry_dlq(&f.queue("orders")).await.unwrap();

        assert_eq!(result.messages.len(), 1);
        let moved = f.client.visible("orders.fifo");
        assert_eq!(moved[0].message_group_id.as_deref(), Some("booking-1"));
        assert!(moved[0].message_deduplication_id.is_some());
        assert_ne!(moved[0].message_deduplication_id.as_deref(), Some("original"));
    }

    #[tokio::test]
    async fn test_retry_stops_at_deadline() {
        let f = fixture();
        f.client.seed_body("events-dlq", "{}");
        let service = HmppsQueueService::new(
            f.service.registry().clone(),
            f.telemetry.clone(),
            JsonDecoder::default(),
        )
        .with_drain_deadline(Duration::ZERO);

        let result = service.retry_dlq(&f.queue("events")).await.unwrap();

        assert_eq!(result.messages_found_count, 1);
        assert!(result.messages.is_empty());
        assert_eq!(f.client.visible("events-dlq").len(), 1);
    }

    #[tokio::test]
    async fn test_retry_all_continues_after_failure() {
        let f = fixture();
        f.client.seed_body("events-dlq", "{}");
        f.client.seed(
            "orders-dlq.fifo",
            OutboundMessage {
                body: "{}".to_string(),
                message_group_id: Some("g".to_string()),
                ..OutboundMessage::default()
            },
        );
        f.client.fail_queue("events-dlq");

        let results = f.service.retry_all_dlqs().await;

        assert_eq!(results.len(), 3);
        assert_eq!(results[0], RetryDlqResult::empty());
        assert_eq!(results[1].messages_found_count, 1);
        assert_eq!(results[1].messages.len(), 1);
        assert_eq!(results[2], RetryDlqResult::empty());
    }

    #[tokio::test]
    async fn test_retry_all_follows_document_order() {
        let properties = crate::HmppsSqsProperties::from_toml(
            r#"
            provider = "localstack"

            [queues.zeta]
            queue_name = "zeta-queue"
            dlq_name = "zeta-dlq"

            [queues.alpha]
            queue_name = "alpha-queue"
            dlq_name = "alpha-dlq"
        "#,
        )
        .unwrap();
        let factory = crate::testing::InMemoryClientFactory::new();
        let registry = QueueRegistry::build(&properties, &factory).unwrap();
        crate::provisioning::provision(&properties, &registry).await.unwrap();
        factory.queues.seed_body("zeta-dlq", "{}");
        factory.queues.seed_body("alpha-dlq", "{}");
        factory.queues.seed_body("alpha-dlq", "{}");
        let service = HmppsQueueService::new(
            Arc::new(registry),
            Arc::new(RecordingTelemetryClient::new()),
            JsonDecoder::default(),
        );

        let found: Vec<i32> = service
            .retry_all_dlqs()
            .await
            .iter()
            .map(|result| result.messages_found_count)
            .collect();

        assert_eq!(found, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_purge_empty_queue_is_noop() {
        let f = fixture();
        let request = f.service.find_queue_to_purge("events").await.unwrap().unwrap();

        let result = f.service.purge_queue(&request).await.unwrap();

        assert_eq!(result.messages_found_count, 0);
        assert_eq!(f.client.calls("PurgeQueue"), 0);
        assert!(f.telemetry.events().is_empty());
    }

    #[tokio::test]
    async fn test_purge_dlq_by_name() {
        let f = fixture();
        f.client.seed_body("events-dlq", "{}");
        f.client.seed_body("events-dlq", "{}");

        let request = f.service.find_queue_to_purge("events-dlq").await.unwrap().unwrap();
        assert_eq!(request.queue_name, "events-dlq");
        let result = f.service.purge_queue(&request).await.unwrap();

        assert_eq!(result.messages_found_count, 2);
        assert_eq!(f.client.calls("PurgeQueue"), 1);
        assert!(f.client.visible("events-dlq").is_empty());

        let events = f.telemetry.events();
        assert_eq!(events[0].0, "PurgeQueue");
        assert_eq!(events[0].1["queue-name"], "events-dlq");
        assert_eq!(events[0].1["messages-found"], "2");
    }

    #[tokio::test]
    async fn test_purge_unknown_or_missing_dlq() {
        let f = fixture();

        assert!(f.service.find_queue_to_purge("nothing").await.unwrap().is_none());
        let result = f.service.purge_dlq(&f.queue("plain")).await.unwrap();
        assert_eq!(result.messages_found_count, 0);
        assert_eq!(f.client.calls("PurgeQueue"), 0);
    }

    #[tokio::test]
    async fn test_get_dlq_messages_caps_at_max() {
        let f = fixture();
        for id in 0..20 {
            f.client.seed_body("events-dlq", &format!(r#"{{"bookingId":{}}}"#, 12_345_678 + id));
        }

        let result = f.service.get_dlq_messages(&f.queue("events"), 12).await.unwrap();

        assert_eq!(result.messages_found_count, 20);
        assert_eq!(result.messages_returned_count, 12);
        assert_eq!(result.messages.len(), 12);
        assert!(result.messages[0].body["bookingId"].is_i64());
        assert_eq!(result.messages[0].body["bookingId"], json!(12_345_678));
        assert_eq!(f.client.calls("DeleteMessage"), 0);
        assert_eq!(f.client.in_flight("events-dlq"), 12);
    }

    #[tokio::test]
    async fn test_get_dlq_messages_without_dlq() {
        let f = fixture();

        let result = f.service.get_dlq_messages(&f.queue("plain"), 100).await.unwrap();

        assert_eq!(result.messages_found_count, 0);
        assert!(result.messages.is_empty());
    }
}
