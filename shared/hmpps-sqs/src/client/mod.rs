//! Provider capabilities consumed by the queue service
//!
//! The service never talks to an SDK directly; it goes through
//! [`MessageQueueClient`], [`MessageBroker`] and [`BucketClient`], which are
//! implemented for AWS in the submodules and in memory by `crate::testing`.

mod factory;
mod s3;
mod sns;
mod sqs;

use std::collections::HashMap;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::QueueResult;

pub use factory::{AwsClientFactory, ClientFactory, Credentials};
pub use s3::S3BucketClient;
pub use sns::SnsMessageBroker;
pub use sqs::SqsMessageQueueClient;

/// System attribute carrying the delivery count of a message
pub const APPROXIMATE_RECEIVE_COUNT: &str = "ApproximateReceiveCount";

/// System attribute carrying the FIFO message group of a message
pub const MESSAGE_GROUP_ID: &str = "MessageGroupId";

/// Message attribute carrying the event type of a domain event
pub const EVENT_TYPE: &str = "eventType";

/// A typed message attribute, forwarded verbatim between queues
#[derive(Debug, Clone, PartialEq, Eq, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MessageAttributeValue {
    /// `String`, `Number`, `Binary` or a custom `String.x` type
    pub data_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub string_value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub binary_value: Option<Vec<u8>>,
}

impl MessageAttributeValue {
    /// Creates a `String` attribute
    #[must_use]
    pub fn string(value: impl Into<String>) -> Self {
        Self {
            data_type: "String".to_string(),
            string_value: Some(value.into()),
            binary_value: None,
        }
    }
}

/// Message attributes keyed by attribute name
pub type MessageAttributes = HashMap<String, MessageAttributeValue>;

/// A message received from a queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedMessage {
    pub message_id: String,
    /// Receipt handle used to delete the message or change its visibility
    pub receipt_handle: String,
    pub body: String,
    /// System attributes such as `ApproximateReceiveCount`
    pub attributes: HashMap<String, String>,
    pub message_attributes: MessageAttributes,
}

impl ReceivedMessage {
    /// Number of times the message has been delivered, at least 1
    #[must_use]
    pub fn receive_count(&self) -> u32 {
        self.attributes
            .get(APPROXIMATE_RECEIVE_COUNT)
            .and_then(|count| count.parse::<u32>().ok())
            .map_or(1, |count| count.max(1))
    }

    #[must_use]
    pub fn message_group_id(&self) -> Option<&str> {
        self.attributes.get(MESSAGE_GROUP_ID).map(String::as_str)
    }
}

/// A message to send to a queue
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OutboundMessage {
    pub body: String,
    pub message_attributes: MessageAttributes,
    /// Required by FIFO queues
    pub message_group_id: Option<String>,
    pub message_deduplication_id: Option<String>,
}

/// A message to publish to a topic
pub type PublishRequest = OutboundMessage;

/// Redrive policy attached to a queue that has a DLQ
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedrivePolicy {
    pub dead_letter_target_arn: String,
    #[serde(deserialize_with = "number_or_string")]
    pub max_receive_count: u32,
}

impl RedrivePolicy {
    /// Parses the `RedrivePolicy` queue attribute
    ///
    /// # Errors
    ///
    /// Returns `serde_json::Error` if the attribute is not a redrive policy
    pub fn parse(attribute: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(attribute)
    }
}

// The provider returns maxReceiveCount either as a number or as a string.
fn number_or_string<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(u32),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Number(n) => Ok(n),
        Raw::Text(s) => s.parse().map_err(serde::de::Error::custom),
    }
}

/// Snapshot of the attributes of a queue
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct QueueAttributes {
    pub queue_arn: Option<String>,
    /// `ApproximateNumberOfMessages`
    pub messages_on_queue: i32,
    /// `ApproximateNumberOfMessagesNotVisible`
    pub messages_in_flight: i32,
    pub redrive_policy: Option<RedrivePolicy>,
}

/// Snapshot of the attributes of a topic
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TopicAttributes {
    pub subscriptions_confirmed: i32,
    pub subscriptions_pending: i32,
}

/// Queue operations offered by the message provider
#[async_trait]
pub trait MessageQueueClient: Send + Sync {
    /// Resolves the URL of a queue from its name
    async fn queue_url(&self, queue_name: &str) -> QueueResult<String>;

    async fn queue_attributes(&self, queue_url: &str) -> QueueResult<QueueAttributes>;

    /// `ApproximateNumberOfMessages` of a queue
    async fn approximate_message_count(&self, queue_url: &str) -> QueueResult<i32> {
        Ok(self.queue_attributes(queue_url).await?.messages_on_queue)
    }

    /// Receives at most one message with all of its attributes, without waiting
    async fn receive_one(&self, queue_url: &str) -> QueueResult<Option<ReceivedMessage>>;

    /// Receives up to `max_messages` messages, long polling for `wait_time_seconds`
    async fn receive_messages(
        &self,
        queue_url: &str,
        max_messages: i32,
        wait_time_seconds: i32,
    ) -> QueueResult<Vec<ReceivedMessage>>;

    /// Sends a message and returns its provider message id
    async fn send(&self, queue_url: &str, message: OutboundMessage) -> QueueResult<String>;

    async fn delete(&self, queue_url: &str, receipt_handle: &str) -> QueueResult<()>;

    async fn purge(&self, queue_url: &str) -> QueueResult<()>;

    async fn change_visibility(
        &self,
        queue_url: &str,
        receipt_handle: &str,
        visibility_timeout: i32,
    ) -> QueueResult<()>;

    /// Creates a queue, returning its URL. Creating an existing queue is not an error.
    async fn create_queue(
        &self,
        queue_name: &str,
        attributes: HashMap<String, String>,
    ) -> QueueResult<String>;
}

/// Pub/sub operations offered by the message provider
#[async_trait]
pub trait MessageBroker: Send + Sync {
    /// Publishes a message and returns its provider message id
    async fn publish(&self, topic_arn: &str, request: PublishRequest) -> QueueResult<String>;

    /// Subscribes a queue to a topic, returning the subscription ARN
    async fn subscribe(
        &self,
        topic_arn: &str,
        queue_arn: &str,
        filter_policy: Option<&str>,
    ) -> QueueResult<String>;

    async fn topic_attributes(&self, topic_arn: &str) -> QueueResult<TopicAttributes>;

    /// Creates a topic, returning its ARN. Creating an existing topic is not an error.
    async fn create_topic(
        &self,
        topic_name: &str,
        attributes: HashMap<String, String>,
    ) -> QueueResult<String>;
}

/// Object storage operations used for health reporting
#[async_trait]
pub trait BucketClient: Send + Sync {
    /// Succeeds if the bucket exists and is reachable
    async fn head_bucket(&self, bucket_name: &str) -> QueueResult<()>;
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_redrive_policy_number_or_string() {
        let policy = RedrivePolicy::parse(
            r#"{"deadLetterTargetArn":"arn:aws:sqs:eu-west-2:000000000000:dlq","maxReceiveCount":"3"}"#,
        )
        .unwrap();
        assert_eq!(policy.max_receive_count, 3);

        let policy = RedrivePolicy::parse(
            r#"{"deadLetterTargetArn":"arn:aws:sqs:eu-west-2:000000000000:dlq","maxReceiveCount":7}"#,
        )
        .unwrap();
        assert_eq!(policy.max_receive_count, 7);
        assert_eq!(
            policy.dead_letter_target_arn,
            "arn:aws:sqs:eu-west-2:000000000000:dlq"
        );
    }

    #[test]
    fn test_receive_count_defaults_to_one() {
        let mut message = ReceivedMessage {
            message_id: "1".to_string(),
            receipt_handle: "r".to_string(),
            body: "{}".to_string(),
            attributes: HashMap::new(),
            message_attributes: MessageAttributes::new(),
        };
        assert_eq!(message.receive_count(), 1);

        message
            .attributes
            .insert(APPROXIMATE_RECEIVE_COUNT.to_string(), "4".to_string());
        assert_eq!(message.receive_count(), 4);

        message
            .attributes
            .insert(APPROXIMATE_RECEIVE_COUNT.to_string(), "garbage".to_string());
        assert_eq!(message.receive_count(), 1);
    }
}
