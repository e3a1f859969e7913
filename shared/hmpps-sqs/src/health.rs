//! Health of the configured queues, topics and buckets
//!
//! Checks never fail: a provider error turns the component DOWN and is
//! recorded under the `error` detail.

use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::Serialize;
use serde_json::{json, Value};
use strum::Display;

use crate::error::QueueError;
use crate::model::{HmppsBucket, HmppsQueue, HmppsTopic};
use crate::registry::QueueRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, JsonSchema, Display)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum HealthStatus {
    Up,
    Down,
}

/// Health of a single queue, topic or bucket
#[derive(Debug, Clone, PartialEq, Serialize, JsonSchema)]
pub struct HealthComponent {
    pub status: HealthStatus,
    pub details: BTreeMap<String, Value>,
}

impl HealthComponent {
    fn new() -> Self {
        Self {
            status: HealthStatus::Up,
            details: BTreeMap::new(),
        }
    }

    fn detail(&mut self, name: &str, value: impl Into<Value>) {
        self.details.insert(name.to_string(), value.into());
    }

    fn down(&mut self, error: &QueueError) {
        self.status = HealthStatus::Down;
        self.detail("error", error.to_string());
    }
}

/// Health of every component, UP only if all of them are
#[derive(Debug, Clone, PartialEq, Serialize, JsonSchema)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub components: BTreeMap<String, HealthComponent>,
}

impl HealthReport {
    #[must_use]
    pub fn is_up(&self) -> bool {
        self.status == HealthStatus::Up
    }
}

pub async fn queue_health(queue: &HmppsQueue) -> HealthComponent {
    let mut health = HealthComponent::new();
    health.detail("queueName", queue.queue_name());

    let attributes = match queue.queue_url().await {
        Ok(url) => queue.sqs_client().queue_attributes(&url).await,
        Err(e) => Err(e),
    };
    let attributes = match attributes {
        Ok(attributes) => {
            health.detail("messagesOnQueue", attributes.messages_on_queue);
            health.detail("messagesInFlight", attributes.messages_in_flight);
            Some(attributes)
        }
        Err(e) => {
            health.down(&e);
            None
        }
    };

    let (Some(dlq_name), Some(dlq_client)) = (queue.dlq_name(), queue.sqs_dlq_client()) else {
        return health;
    };
    health.detail("dlqName", dlq_name);

    if attributes.is_some_and(|attributes| attributes.redrive_policy.is_none()) {
        health.status = HealthStatus::Down;
        health.detail("dlqStatus", HealthStatus::Down.to_string());
        health.detail("error", "The main queue has no redrive policy");
        return health;
    }

    let dlq_attributes = match queue.dlq_url().await {
        Ok(Some(url)) => dlq_client.queue_attributes(&url).await.map(Some),
        Ok(None) => Ok(None),
        Err(e) => Err(e),
    };
    match dlq_attributes {
        Ok(Some(attributes)) => {
            health.detail("dlqStatus", HealthStatus::Up.to_string());
            health.detail("messagesOnDlq", attributes.messages_on_queue);
        }
        Ok(None) => {}
        Err(e) => {
            health.detail("dlqStatus", HealthStatus::Down.to_string());
            health.down(&e);
        }
    }

    health
}

pub async fn topic_health(topic: &HmppsTopic) -> HealthComponent {
    let mut health = HealthComponent::new();
    health.detail("topicArn", topic.arn());

    match topic.sns_client().topic_attributes(topic.arn()).await {
        Ok(attributes) => {
            health.detail("subscriptionsConfirmed", attributes.subscriptions_confirmed);
            health.detail("subscriptionsPending", attributes.subscriptions_pending);
        }
        Err(e) => health.down(&e),
    }

    health
}

pub async fn bucket_health(bucket: &HmppsBucket) -> HealthComponent {
    let mut health = HealthComponent::new();
    health.detail("bucketName", bucket.bucket_name());

    if let Err(e) = bucket.client().head_bucket(bucket.bucket_name()).await {
        health.down(&e);
    }

    health
}

/// Checks every component of the registry, keyed by id
pub async fn health_report(registry: &QueueRegistry) -> HealthReport {
    let mut components = BTreeMap::new();

    for queue in registry.queues() {
        components.insert(queue.id().to_string(), queue_health(queue).await);
    }
    for topic in registry.topics() {
        components.insert(topic.id().to_string(), topic_health(topic).await);
    }
    for bucket in registry.buckets() {
        components.insert(bucket.id().to_string(), bucket_health(bucket).await);
    }

    let status = if components
        .values()
        .all(|component| component.status == HealthStatus::Up)
    {
        HealthStatus::Up
    } else {
        HealthStatus::Down
    };

    if status == HealthStatus::Down {
        tracing::warn!(details = %json!(components), "Health check is DOWN");
    }

    HealthReport { status, components }
}
