//! AWS SNS implementation of [`MessageBroker`]

use std::collections::HashMap;

use async_trait::async_trait;
use aws_sdk_sns::{primitives::Blob, Client as SnsClient};

use super::{MessageAttributes, MessageBroker, PublishRequest, TopicAttributes};
use crate::error::{QueueError, QueueResult};

/// SNS backed message broker
#[derive(Debug, Clone)]
pub struct SnsMessageBroker {
    sns_client: SnsClient,
}

impl SnsMessageBroker {
    #[must_use]
    pub const fn new(sns_client: SnsClient) -> Self {
        Self { sns_client }
    }

    fn to_sdk_attributes(
        attributes: MessageAttributes,
    ) -> QueueResult<HashMap<String, aws_sdk_sns::types::MessageAttributeValue>> {
        attributes
            .into_iter()
            .map(|(name, value)| {
                let sdk_value = aws_sdk_sns::types::MessageAttributeValue::builder()
                    .data_type(value.data_type)
                    .set_string_value(value.string_value)
                    .set_binary_value(value.binary_value.map(Blob::new))
                    .build()
                    .map_err(|e| QueueError::InvalidMessage(e.to_string()))?;
                Ok((name, sdk_value))
            })
            .collect()
    }
}

#[async_trait]
impl MessageBroker for SnsMessageBroker {
    async fn publish(&self, topic_arn: &str, request: PublishRequest) -> QueueResult<String> {
        let attributes = Self::to_sdk_attributes(request.message_attributes)?;

        let result = self
            .sns_client
            .publish()
            .topic_arn(topic_arn)
            .message(request.body)
            .set_message_attributes((!attributes.is_empty()).then_some(attributes))
            .set_message_group_id(request.message_group_id)
            .set_message_deduplication_id(request.message_deduplication_id)
            .send()
            .await
            .map_err(|e| QueueError::from_sdk("Publish", &e))?;

        Ok(result.message_id().unwrap_or_default().to_string())
    }

    async fn subscribe(
        &self,
        topic_arn: &str,
        queue_arn: &str,
        filter_policy: Option<&str>,
    ) -> QueueResult<String> {
        let mut request = self
            .sns_client
            .subscribe()
            .topic_arn(topic_arn)
            .protocol("sqs")
            .endpoint(queue_arn);
        if let Some(filter_policy) = filter_policy {
            request = request.attributes("FilterPolicy", filter_policy);
        }

        let result = request
            .send()
            .await
            .map_err(|e| QueueError::from_sdk("Subscribe", &e))?;

        Ok(result.subscription_arn().unwrap_or_default().to_string())
    }

    async fn topic_attributes(&self, topic_arn: &str) -> QueueResult<TopicAttributes> {
        let result = self
            .sns_client
            .get_topic_attributes()
            .topic_arn(topic_arn)
            .send()
            .await
            .map_err(|e| QueueError::from_sdk("GetTopicAttributes", &e))?;

        let count = |name: &str| {
            result
                .attributes()
                .and_then(|attrs| attrs.get(name))
                .and_then(|value| value.parse::<i32>().ok())
                .unwrap_or_default()
        };

        Ok(TopicAttributes {
            subscriptions_confirmed: count("SubscriptionsConfirmed"),
            subscriptions_pending: count("SubscriptionsPending"),
        })
    }

    async fn create_topic(
        &self,
        topic_name: &str,
        attributes: HashMap<String, String>,
    ) -> QueueResult<String> {
        let result = self
            .sns_client
            .create_topic()
            .name(topic_name)
            .set_attributes(Some(attributes))
            .send()
            .await
            .map_err(|e| QueueError::from_sdk("CreateTopic", &e))?;

        result
            .topic_arn()
            .map(ToString::to_string)
            .ok_or(QueueError::MissingField {
                operation: "CreateTopic",
                field: "TopicArn",
            })
    }
}
