//! AWS SQS implementation of [`MessageQueueClient`]

use std::collections::HashMap;

use async_trait::async_trait;
use aws_sdk_sqs::{
    primitives::Blob,
    types::{MessageSystemAttributeName, QueueAttributeName},
    Client as SqsClient,
};

use super::{
    MessageAttributeValue, MessageAttributes, MessageQueueClient, OutboundMessage,
    QueueAttributes, ReceivedMessage, RedrivePolicy,
};
use crate::error::{QueueError, QueueResult};

/// SQS backed queue client
#[derive(Debug, Clone)]
pub struct SqsMessageQueueClient {
    sqs_client: SqsClient,
}

impl SqsMessageQueueClient {
    /// Wraps a pre-configured SQS client
    #[must_use]
    pub const fn new(sqs_client: SqsClient) -> Self {
        Self { sqs_client }
    }

    fn parse_message(message: &aws_sdk_sqs::types::Message) -> Option<ReceivedMessage> {
        let attributes = message
            .attributes()
            .map(|attrs| {
                attrs
                    .iter()
                    .map(|(name, value)| (name.as_str().to_string(), value.clone()))
                    .collect()
            })
            .unwrap_or_default();

        let message_attributes = message
            .message_attributes()
            .map(|attrs| {
                attrs
                    .iter()
                    .map(|(name, value)| {
                        (
                            name.clone(),
                            MessageAttributeValue {
                                data_type: value.data_type().to_string(),
                                string_value: value.string_value().map(ToString::to_string),
                                binary_value: value.binary_value().map(|b| b.as_ref().to_vec()),
                            },
                        )
                    })
                    .collect()
            })
            .unwrap_or_default();

        Some(ReceivedMessage {
            message_id: message.message_id()?.to_string(),
            receipt_handle: message.receipt_handle()?.to_string(),
            body: message.body().unwrap_or_default().to_string(),
            attributes,
            message_attributes,
        })
    }

    fn to_sdk_attributes(
        attributes: MessageAttributes,
    ) -> QueueResult<HashMap<String, aws_sdk_sqs::types::MessageAttributeValue>> {
        attributes
            .into_iter()
            .map(|(name, value)| {
                let sdk_value = aws_sdk_sqs::types::MessageAttributeValue::builder()
                    .data_type(value.data_type)
                    .set_string_value(value.string_value)
                    .set_binary_value(value.binary_value.map(Blob::new))
                    .build()
                    .map_err(|e| QueueError::InvalidMessage(e.to_string()))?;
                Ok((name, sdk_value))
            })
            .collect()
    }

    async fn receive(
        &self,
        queue_url: &str,
        max_messages: i32,
        wait_time_seconds: i32,
    ) -> QueueResult<Vec<ReceivedMessage>> {
        let result = self
            .sqs_client
            .receive_message()
            .queue_url(queue_url)
            .max_number_of_messages(max_messages)
            .wait_time_seconds(wait_time_seconds)
            .message_attribute_names("All")
            .message_system_attribute_names(MessageSystemAttributeName::All)
            .send()
            .await
            .map_err(|e| QueueError::from_sdk("ReceiveMessage", &e))?;

        Ok(result
            .messages()
            .iter()
            .filter_map(|msg| {
                let parsed = Self::parse_message(msg);
                if parsed.is_none() {
                    tracing::error!("Received message without id or receipt handle");
                }
                parsed
            })
            .collect())
    }
}

#[async_trait]
impl MessageQueueClient for SqsMessageQueueClient {
    async fn queue_url(&self, queue_name: &str) -> QueueResult<String> {
        let result = self
            .sqs_client
            .get_queue_url()
            .queue_name(queue_name)
            .send()
            .await
            .map_err(|e| QueueError::from_sdk("GetQueueUrl", &e))?;

        result
            .queue_url()
            .map(ToString::to_string)
            .ok_or(QueueError::MissingField {
                operation: "GetQueueUrl",
                field: "QueueUrl",
            })
    }

    async fn queue_attributes(&self, queue_url: &str) -> QueueResult<QueueAttributes> {
        let result = self
            .sqs_client
            .get_queue_attributes()
            .queue_url(queue_url)
            .attribute_names(QueueAttributeName::All)
            .send()
            .await
            .map_err(|e| QueueError::from_sdk("GetQueueAttributes", &e))?;

        let Some(attributes) = result.attributes() else {
            return Ok(QueueAttributes::default());
        };

        let count = |name: &QueueAttributeName| {
            attributes
                .get(name)
                .and_then(|value| value.parse::<i32>().ok())
                .unwrap_or_default()
        };

        let redrive_policy = match attributes.get(&QueueAttributeName::RedrivePolicy) {
            Some(raw) => Some(RedrivePolicy::parse(raw).map_err(|e| {
                QueueError::InvalidMessage(format!("Unreadable RedrivePolicy {raw}: {e}"))
            })?),
            None => None,
        };

        Ok(QueueAttributes {
            queue_arn: attributes.get(&QueueAttributeName::QueueArn).cloned(),
            messages_on_queue: count(&QueueAttributeName::ApproximateNumberOfMessages),
            messages_in_flight: count(&QueueAttributeName::ApproximateNumberOfMessagesNotVisible),
            redrive_policy,
        })
    }

    async fn receive_one(&self, queue_url: &str) -> QueueResult<Option<ReceivedMessage>> {
        Ok(self.receive(queue_url, 1, 0).await?.into_iter().next())
    }

    async fn receive_messages(
        &self,
        queue_url: &str,
        max_messages: i32,
        wait_time_seconds: i32,
    ) -> QueueResult<Vec<ReceivedMessage>> {
        // SQS caps at 10 messages per request.
        self.receive(queue_url, max_messages.clamp(1, 10), wait_time_seconds)
            .await
    }

    async fn send(&self, queue_url: &str, message: OutboundMessage) -> QueueResult<String> {
        let attributes = Self::to_sdk_attributes(message.message_attributes)?;

        let result = self
            .sqs_client
            .send_message()
            .queue_url(queue_url)
            .message_body(message.body)
            .set_message_attributes((!attributes.is_empty()).then_some(attributes))
            .set_message_group_id(message.message_group_id)
            .set_message_deduplication_id(message.message_deduplication_id)
            .send()
            .await
            .map_err(|e| QueueError::from_sdk("SendMessage", &e))?;

        Ok(result
            .message_id()
            .map(std::string::ToString::to_string)
            .unwrap_or_default())
    }

    async fn delete(&self, queue_url: &str, receipt_handle: &str) -> QueueResult<()> {
        self.sqs_client
            .delete_message()
            .queue_url(queue_url)
            .receipt_handle(receipt_handle)
            .send()
            .await
            .map_err(|e| QueueError::from_sdk("DeleteMessage", &e))?;

        Ok(())
    }

    async fn purge(&self, queue_url: &str) -> QueueResult<()> {
        self.sqs_client
            .purge_queue()
            .queue_url(queue_url)
            .send()
            .await
            .map_err(|e| QueueError::from_sdk("PurgeQueue", &e))?;

        Ok(())
    }

    async fn change_visibility(
        &self,
        queue_url: &str,
        receipt_handle: &str,
        visibility_timeout: i32,
    ) -> QueueResult<()> {
        self.sqs_client
            .change_message_visibility()
            .queue_url(queue_url)
            .receipt_handle(receipt_handle)
            .visibility_timeout(visibility_timeout)
            .send()
            .await
            .map_err(|e| QueueError::from_sdk("ChangeMessageVisibility", &e))?;

        Ok(())
    }

    async fn create_queue(
        &self,
        queue_name: &str,
        attributes: HashMap<String, String>,
    ) -> QueueResult<String> {
        let attributes = attributes
            .into_iter()
            .map(|(name, value)| (QueueAttributeName::from(name.as_str()), value))
            .collect::<HashMap<_, _>>();

        let result = self
            .sqs_client
            .create_queue()
            .queue_name(queue_name)
            .set_attributes(Some(attributes))
            .send()
            .await
            .map_err(|e| QueueError::from_sdk("CreateQueue", &e))?;

        result
            .queue_url()
            .map(ToString::to_string)
            .ok_or(QueueError::MissingField {
                operation: "CreateQueue",
                field: "QueueUrl",
            })
    }
}
