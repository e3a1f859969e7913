use std::fmt;
use std::sync::Arc;

use schemars::JsonSchema;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::client::{MessageAttributes, MessageQueueClient};

/// A DLQ message as reported to operators
#[derive(Debug, Clone, PartialEq, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DlqMessage {
    /// Decoded body, or `{"rawBody": ...}` if it is not a JSON object
    pub body: Map<String, Value>,
    pub message_id: String,
    /// Message attributes as received, omitted when there are none
    #[serde(skip_serializing_if = "MessageAttributes::is_empty")]
    pub message_attributes: MessageAttributes,
}

/// Outcome of moving DLQ messages back onto their main queue
#[derive(Debug, Clone, PartialEq, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RetryDlqResult {
    /// Approximate number of messages on the DLQ when the retry started
    pub messages_found_count: i32,
    /// Messages actually moved back
    pub messages: Vec<DlqMessage>,
}

impl RetryDlqResult {
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            messages_found_count: 0,
            messages: Vec::new(),
        }
    }
}

/// Outcome of purging a queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PurgeQueueResult {
    pub messages_found_count: i32,
}

/// Messages peeked from a DLQ without removing them
#[derive(Debug, Clone, PartialEq, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GetDlqResult {
    pub messages_found_count: i32,
    pub messages_returned_count: i32,
    pub messages: Vec<DlqMessage>,
}

/// A queue (main or DLQ) to purge and the client able to reach it
#[derive(Clone)]
pub struct PurgeQueueRequest {
    pub queue_name: String,
    pub client: Arc<dyn MessageQueueClient>,
    pub queue_url: String,
}

impl fmt::Debug for PurgeQueueRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PurgeQueueRequest")
            .field("queue_name", &self.queue_name)
            .field("queue_url", &self.queue_url)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    #[test]
    fn test_results_serialize_camel_case() {
        let mut body = Map::new();
        body.insert("id".to_string(), json!(1));

        let result = GetDlqResult {
            messages_found_count: 3,
            messages_returned_count: 1,
            messages: vec![DlqMessage {
                body,
                message_id: "m-1".to_string(),
                message_attributes: MessageAttributes::new(),
            }],
        };

        assert_eq!(
            serde_json::to_value(&result).unwrap(),
            json!({
                "messagesFoundCount": 3,
                "messagesReturnedCount": 1,
                "messages": [{ "body": { "id": 1 }, "messageId": "m-1" }]
            })
        );
        let mut message_attributes = MessageAttributes::new();
        message_attributes.insert(
            "eventType".to_string(),
            crate::client::MessageAttributeValue::string("prisoner.released"),
        );
        let message = DlqMessage {
            body: Map::new(),
            message_id: "m-2".to_string(),
            message_attributes,
        };
        assert_eq!(
            serde_json::to_value(&message).unwrap(),
            json!({
                "body": {},
                "messageId": "m-2",
                "messageAttributes": {
                    "eventType": { "dataType": "String", "stringValue": "prisoner.released" }
                }
            })
        );

        assert_eq!(
            serde_json::to_value(RetryDlqResult::empty()).unwrap(),
            json!({ "messagesFoundCount": 0, "messages": [] })
        );
    }
}
