use std::fmt;
use std::sync::Arc;

use crate::client::{
    MessageAttributeValue, MessageAttributes, MessageBroker, PublishRequest, EVENT_TYPE,
};
use crate::config::FIFO_SUFFIX;
use crate::error::{QueueError, QueueResult};

/// A configured SNS topic
pub struct HmppsTopic {
    id: String,
    arn: String,
    sns_client: Arc<dyn MessageBroker>,
}

impl HmppsTopic {
    #[must_use]
    pub fn new(id: impl Into<String>, arn: impl Into<String>, sns_client: Arc<dyn MessageBroker>) -> Self {
        Self {
            id: id.into(),
            arn: arn.into(),
            sns_client,
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn arn(&self) -> &str {
        &self.arn
    }

    #[must_use]
    pub fn sns_client(&self) -> &Arc<dyn MessageBroker> {
        &self.sns_client
    }

    #[must_use]
    pub fn is_fifo(&self) -> bool {
        self.arn.ends_with(FIFO_SUFFIX)
    }

    /// Publishes a domain event, tagging it with its `eventType`
    ///
    /// # Errors
    ///
    /// Returns `QueueError::MissingMessageGroupId` when publishing to a FIFO
    /// topic without a group, or the provider error if the publish fails
    pub async fn publish(
        &self,
        event_type: &str,
        body: impl Into<String>,
        mut attributes: MessageAttributes,
        message_group_id: Option<String>,
    ) -> QueueResult<String> {
        let message_deduplication_id = if self.is_fifo() {
            if message_group_id.is_none() {
                return Err(QueueError::MissingMessageGroupId(self.arn.clone()));
            }
            Some(uuid::Uuid::new_v4().to_string())
        } else {
            None
        };

        attributes.insert(
            EVENT_TYPE.to_string(),
            MessageAttributeValue::string(event_type),
        );

        let message_id = self
            .sns_client
            .publish(
                &self.arn,
                PublishRequest {
                    body: body.into(),
                    message_attributes: attributes,
                    message_group_id,
                    message_deduplication_id,
                },
            )
            .await?;

        tracing::debug!(topic_id = %self.id, event_type, message_id, "Published event");
        Ok(message_id)
    }
}

impl fmt::Debug for HmppsTopic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HmppsTopic")
            .field("id", &self.id)
            .field("arn", &self.arn)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::testing::InMemoryMessageBroker;

    #[tokio::test]
    async fn test_publish_adds_event_type() {
        let broker = Arc::new(InMemoryMessageBroker::new());
        broker.create("arn:aws:sns:eu-west-2:000000000000:events");
        let topic = HmppsTopic::new(
            "events",
            "arn:aws:sns:eu-west-2:000000000000:events",
            broker.clone(),
        );

        let mut attributes = MessageAttributes::new();
        attributes.insert("source".to_string(), MessageAttributeValue::string("nomis"));

        topic
            .publish("prisoner.released", r#"{"id":1}"#, attributes, None)
            .await
            .unwrap();

        let published = broker.published("arn:aws:sns:eu-west-2:000000000000:events");
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].body, r#"{"id":1}"#);
        assert_eq!(
            published[0].message_attributes[EVENT_TYPE],
            MessageAttributeValue::string("prisoner.released")
        );
        assert_eq!(
            published[0].message_attributes["source"],
            MessageAttributeValue::string("nomis")
        );
        assert_eq!(published[0].message_deduplication_id, None);
    }

    #[tokio::test]
    async fn test_fifo_publish_requires_group() {
        let broker = Arc::new(InMemoryMessageBroker::new());
        broker.create("arn:aws:sns:eu-west-2:000000000000:ordered.fifo");
        let topic = HmppsTopic::new(
            "ordered",
            "arn:aws:sns:eu-west-2:000000000000:ordered.fifo",
            broker.clone(),
        );

        let err = topic
            .publish("x", "{}", MessageAttributes::new(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, QueueError::MissingMessageGroupId(_)));

        topic
            .publish("x", "{}", MessageAttributes::new(), Some("group".to_string()))
            .await
            .unwrap();
        let published = broker.published("arn:aws:sns:eu-west-2:000000000000:ordered.fifo");
        assert_eq!(published[0].message_group_id.as_deref(), Some("group"));
        assert!(published[0].message_deduplication_id.is_some());
    }
}
