//! Creates the configured topics, queues and subscriptions on `LocalStack`

use std::collections::HashMap;

use serde_json::json;
use tracing::info;

use crate::config::{HmppsSqsProperties, QueueProperties};
use crate::error::{QueueError, QueueResult};
use crate::model::HmppsQueue;
use crate::registry::QueueRegistry;

fn fifo_attributes(attributes: &mut HashMap<String, String>) {
    attributes.insert("FifoQueue".to_string(), "true".to_string());
}

/// Creates every topic, DLQ and queue and subscribes queues to their topics
///
/// Creation is idempotent, so this can run on every startup.
///
/// # Errors
///
/// Returns the first `QueueError` raised by the provider
pub async fn provision(properties: &HmppsSqsProperties, registry: &QueueRegistry) -> QueueResult<()> {
    for (id, topic_properties) in &properties.topics {
        let Some(topic) = registry.find_by_topic_id(id) else {
            continue;
        };
        let mut attributes = HashMap::new();
        if topic.is_fifo() {
            attributes.insert("FifoTopic".to_string(), "true".to_string());
        }
        let arn = topic
            .sns_client()
            .create_topic(topic_properties.name(), attributes)
            .await?;
        info!(topic_id = %id, arn, "Created topic");
    }

    for (id, queue_properties) in &properties.queues {
        let Some(queue) = registry.find_by_queue_id(id) else {
            continue;
        };
        provision_queue(queue, queue_properties, registry).await?;
    }

    Ok(())
}

async fn provision_queue(
    queue: &HmppsQueue,
    properties: &QueueProperties,
    registry: &QueueRegistry,
) -> QueueResult<()> {
    let mut attributes = HashMap::from([(
        "VisibilityTimeout".to_string(),
        properties.visibility_timeout.to_string(),
    )]);

    if let (Some(dlq_name), Some(dlq_client)) = (queue.dlq_name(), queue.sqs_dlq_client()) {
        let mut dlq_attributes = HashMap::new();
        if properties.is_fifo() {
            fifo_attributes(&mut dlq_attributes);
        }
        let dlq_url = dlq_client.create_queue(dlq_name, dlq_attributes).await?;
        let dlq_arn = dlq_client
            .queue_attributes(&dlq_url)
            .await?
            .queue_arn
            .ok_or(QueueError::MissingField {
                operation: "GetQueueAttributes",
                field: "QueueArn",
            })?;
        attributes.insert(
            "RedrivePolicy".to_string(),
            json!({
                "deadLetterTargetArn": dlq_arn,
                "maxReceiveCount": properties.dlq_max_receive_count.to_string(),
            })
            .to_string(),
        );
        info!(queue_id = %queue.id(), dlq_name, "Created DLQ");
    }

    if properties.is_fifo() {
        fifo_attributes(&mut attributes);
        if let Some(limit) = &properties.fifo_throughput_limit {
            attributes.insert("FifoThroughputLimit".to_string(), limit.clone());
            if limit == "perMessageGroupId" {
                attributes.insert("DeduplicationScope".to_string(), "messageGroup".to_string());
            }
        }
    }

    let queue_url = queue
        .sqs_client()
        .create_queue(queue.queue_name(), attributes)
        .await?;
    info!(queue_id = %queue.id(), queue_url, "Created queue");

    let Some(topic) = properties
        .subscribe_topic_id
        .as_deref()
        .and_then(|topic_id| registry.find_by_topic_id(topic_id))
    else {
        return Ok(());
    };

    let queue_arn = queue
        .sqs_client()
        .queue_attributes(&queue_url)
        .await?
        .queue_arn
        .ok_or(QueueError::MissingField {
            operation: "GetQueueAttributes",
            field: "QueueArn",
        })?;
    let subscription_arn = topic
        .sns_client()
        .subscribe(topic.arn(), &queue_arn, properties.subscribe_filter.as_deref())
        .await?;
    info!(queue_id = %queue.id(), topic_id = %topic.id(), subscription_arn, "Subscribed queue to topic");

    Ok(())
}
