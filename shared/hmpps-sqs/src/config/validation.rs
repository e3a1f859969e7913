use std::collections::HashSet;

use thiserror::Error;

use super::{HmppsSqsProperties, Provider};

/// Name suffix identifying FIFO queues and topics
pub const FIFO_SUFFIX: &str = ".fifo";

/// Largest visibility timeout SQS accepts (12 hours)
pub const MAX_VISIBILITY_TIMEOUT_SECS: i32 = 43_200;

/// Startup configuration errors, each one stops the application from starting
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The configuration file could not be read
    #[error("Unable to read configuration {path}: {reason}")]
    Unreadable {
        /// Path that was read
        path: String,
        /// Underlying IO error
        reason: String,
    },

    /// The configuration document could not be parsed
    #[error("Malformed configuration: {0}")]
    Malformed(String),

    /// Queue, topic and bucket ids must be lowercase
    #[error("Id {0} must be lowercase")]
    IdNotLowercase(String),

    /// A required name is empty
    #[error("{kind} {id} has an empty {field}")]
    Blank {
        kind: &'static str,
        id: String,
        field: &'static str,
    },

    /// Two entries share a value that must be unique
    #[error("Found duplicated {field} {value}")]
    Duplicate { field: &'static str, value: String },

    /// FIFO naming is inconsistent between a queue and its DLQ
    #[error("Queue {id} mixes FIFO and standard names: {queue_name} / {dlq_name}")]
    FifoMismatch {
        id: String,
        queue_name: String,
        dlq_name: String,
    },

    /// FIFO throughput limit declared on a standard queue
    #[error("Queue {0} declares fifo_throughput_limit but is not a FIFO queue")]
    ThroughputLimitOnStandardQueue(String),

    /// FIFO throughput limit has an unsupported value
    #[error("Queue {id} has an invalid fifo_throughput_limit {value}")]
    InvalidThroughputLimit { id: String, value: String },

    /// Queue subscribes to an unknown topic
    #[error("Queue {id} wants to subscribe to {topic_id} but it does not exist")]
    UnknownTopic { id: String, topic_id: String },

    /// Only FIFO queues can subscribe to FIFO topics
    #[error("Queue {id} is not FIFO but subscribes to FIFO topic {topic_id}")]
    FifoTopicStandardQueue { id: String, topic_id: String },

    /// A subscription filter is set without a topic to subscribe to
    #[error("Queue {0} has a subscribe_filter but no subscribe_topic_id")]
    FilterWithoutTopic(String),

    /// A subscription filter is not a JSON object
    #[error("Queue {id} has an invalid subscribe_filter: {reason}")]
    InvalidFilter { id: String, reason: String },

    /// A visibility timeout is negative or above the provider maximum
    #[error("Queue {id} has an invalid visibility timeout {value}")]
    InvalidVisibilityTimeout { id: String, value: i32 },

    /// Max receive count must allow at least one delivery
    #[error("Queue {0} must have a dlq_max_receive_count of at least 1")]
    InvalidMaxReceiveCount(String),

    /// Static credentials must come as an access key and secret pair
    #[error("{kind} {id} has an access key id without a secret access key or vice versa")]
    IncompleteCredentials { kind: &'static str, id: String },

    /// `LocalStack` topic ARNs must live in the configured region
    #[error("Topic {id} ARN {arn} does not match region {region}")]
    TopicRegionMismatch {
        id: String,
        arn: String,
        region: String,
    },
}

/// Validates properties without touching any provider
///
/// # Errors
///
/// Returns the first `ConfigError` found, checking queues before topics
pub fn validate(properties: &HmppsSqsProperties) -> Result<(), ConfigError> {
    let ids = properties
        .queues
        .keys()
        .chain(properties.topics.keys())
        .chain(properties.buckets.keys());
    for id in ids {
        if id.to_lowercase() != *id {
            return Err(ConfigError::IdNotLowercase(id.clone()));
        }
    }

    validate_queues(properties)?;
    validate_topics(properties)?;

    for (id, bucket) in &properties.buckets {
        if bucket.bucket_name.trim().is_empty() {
            return Err(blank("Bucket", id, "bucket_name"));
        }
    }
    unique(
        "bucket_name",
        properties.buckets.values().map(|b| b.bucket_name.as_str()),
    )?;

    Ok(())
}

fn validate_queues(properties: &HmppsSqsProperties) -> Result<(), ConfigError> {
    for (id, queue) in &properties.queues {
        if queue.queue_name.trim().is_empty() {
            return Err(blank("Queue", id, "queue_name"));
        }

        if let Some(dlq_name) = &queue.dlq_name {
            if dlq_name.trim().is_empty() {
                return Err(blank("Queue", id, "dlq_name"));
            }
            if queue.is_fifo() != dlq_name.ends_with(FIFO_SUFFIX) {
                return Err(ConfigError::FifoMismatch {
                    id: id.clone(),
                    queue_name: queue.queue_name.clone(),
                    dlq_name: dlq_name.clone(),
                });
            }
        }

        if let Some(limit) = &queue.fifo_throughput_limit {
            if !queue.is_fifo() {
                return Err(ConfigError::ThroughputLimitOnStandardQueue(id.clone()));
            }
            if limit != "perQueue" && limit != "perMessageGroupId" {
                return Err(ConfigError::InvalidThroughputLimit {
                    id: id.clone(),
                    value: limit.clone(),
                });
            }
        }

        match (&queue.subscribe_topic_id, &queue.subscribe_filter) {
            (Some(topic_id), _) => {
                let Some(topic) = properties.topics.get(topic_id) else {
                    return Err(ConfigError::UnknownTopic {
                        id: id.clone(),
                        topic_id: topic_id.clone(),
                    });
                };
                if topic.is_fifo() && !queue.is_fifo() {
                    return Err(ConfigError::FifoTopicStandardQueue {
                        id: id.clone(),
                        topic_id: topic_id.clone(),
                    });
                }
            }
            (None, Some(_)) => return Err(ConfigError::FilterWithoutTopic(id.clone())),
            (None, None) => {}
        }

        if let Some(filter) = &queue.subscribe_filter {
            match serde_json::from_str::<serde_json::Value>(filter) {
                Ok(serde_json::Value::Object(_)) => {}
                Ok(_) => {
                    return Err(ConfigError::InvalidFilter {
                        id: id.clone(),
                        reason: "filter policy must be a JSON object".to_string(),
                    })
                }
                Err(e) => {
                    return Err(ConfigError::InvalidFilter {
                        id: id.clone(),
                        reason: e.to_string(),
                    })
                }
            }
        }

        let timeouts = std::iter::once(queue.visibility_timeout)
            .chain(queue.error_visibility_timeout.iter().copied())
            .chain(
                queue
                    .event_error_visibility_timeout
                    .values()
                    .flatten()
                    .copied(),
            );
        for value in timeouts {
            if !(0..=MAX_VISIBILITY_TIMEOUT_SECS).contains(&value) {
                return Err(ConfigError::InvalidVisibilityTimeout {
                    id: id.clone(),
                    value,
                });
            }
        }

        if queue.dlq_max_receive_count == 0 {
            return Err(ConfigError::InvalidMaxReceiveCount(id.clone()));
        }

        if queue.queue_access_key_id.is_some() != queue.queue_secret_access_key.is_some()
            || queue.dlq_access_key_id.is_some() != queue.dlq_secret_access_key.is_some()
        {
            return Err(ConfigError::IncompleteCredentials {
                kind: "Queue",
                id: id.clone(),
            });
        }
    }

    for value in &properties.default_error_visibility_timeout {
        if !(0..=MAX_VISIBILITY_TIMEOUT_SECS).contains(value) {
            return Err(ConfigError::InvalidVisibilityTimeout {
                id: "default".to_string(),
                value: *value,
            });
        }
    }

    let queues = properties.queues.values();
    unique("queue_name", queues.clone().map(|q| q.queue_name.as_str()))?;
    unique("dlq_name", queues.clone().filter_map(|q| q.dlq_name.as_deref()))?;
    unique(
        "queue_access_key_id",
        queues
            .clone()
            .filter_map(|q| q.queue_access_key_id.as_deref()),
    )?;
    unique(
        "dlq_access_key_id",
        queues.filter_map(|q| q.dlq_access_key_id.as_deref()),
    )?;

    Ok(())
}

fn validate_topics(properties: &HmppsSqsProperties) -> Result<(), ConfigError> {
    for (id, topic) in &properties.topics {
        if topic.arn.trim().is_empty() {
            return Err(blank("Topic", id, "arn"));
        }
        if topic.access_key_id.is_some() != topic.secret_access_key.is_some() {
            return Err(ConfigError::IncompleteCredentials {
                kind: "Topic",
                id: id.clone(),
            });
        }
        if properties.provider == Provider::Localstack
            && !topic
                .arn
                .starts_with(&format!("arn:aws:sns:{}:", properties.region))
        {
            return Err(ConfigError::TopicRegionMismatch {
                id: id.clone(),
                arn: topic.arn.clone(),
                region: properties.region.clone(),
            });
        }
    }

    let topics = properties.topics.values();
    unique("topic arn", topics.clone().map(|t| t.arn.as_str()))?;
    unique(
        "topic access_key_id",
        topics.filter_map(|t| t.access_key_id.as_deref()),
    )?;

    Ok(())
}

fn blank(kind: &'static str, id: &str, field: &'static str) -> ConfigError {
    ConfigError::Blank {
        kind,
        id: id.to_string(),
        field,
    }
}

fn unique<'a>(
    field: &'static str,
    values: impl Iterator<Item = &'a str>,
) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();
    for value in values {
        if !seen.insert(value) {
            return Err(ConfigError::Duplicate {
                field,
                value: value.to_string(),
            });
        }
    }
    Ok(())
}
