//! Queue, topic and bucket configuration
//!
//! Properties are read once at startup from a TOML document and validated
//! with [`validate`] before any client is built.

mod validation;

use std::collections::HashMap;
use std::path::Path;

use indexmap::IndexMap;
use serde::Deserialize;
use strum::{Display, EnumString};

pub use validation::{validate, ConfigError, FIFO_SUFFIX, MAX_VISIBILITY_TIMEOUT_SECS};

/// Which provider endpoints the clients talk to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Provider {
    /// Real AWS endpoints
    #[default]
    Aws,
    /// A `LocalStack` container, queues and topics are provisioned on startup
    Localstack,
}

/// Root configuration for all queues, topics and buckets
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HmppsSqsProperties {
    /// Provider the clients are built for
    pub provider: Provider,
    /// AWS region
    pub region: String,
    /// `LocalStack` endpoint, only used when `provider = "localstack"`
    pub localstack_url: String,
    /// Schedule used when neither the queue nor the event type has one
    pub default_error_visibility_timeout: Vec<i32>,
    /// Queues keyed by logical id, in document order
    pub queues: IndexMap<String, QueueProperties>,
    /// Topics keyed by logical id, in document order
    pub topics: IndexMap<String, TopicProperties>,
    /// Buckets keyed by logical id, in document order
    pub buckets: IndexMap<String, BucketProperties>,
}

impl Default for HmppsSqsProperties {
    fn default() -> Self {
        Self {
            provider: Provider::Aws,
            region: "eu-west-2".to_string(),
            localstack_url: "http://localhost:4566".to_string(),
            default_error_visibility_timeout: Vec::new(),
            queues: IndexMap::new(),
            topics: IndexMap::new(),
            buckets: IndexMap::new(),
        }
    }
}

/// Configuration of a single queue and its optional DLQ
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QueueProperties {
    pub queue_name: String,
    #[serde(default)]
    pub dlq_name: Option<String>,
    #[serde(default)]
    pub subscribe_topic_id: Option<String>,
    /// SNS filter policy applied to the topic subscription
    #[serde(default)]
    pub subscribe_filter: Option<String>,
    #[serde(default = "default_dlq_max_receive_count")]
    pub dlq_max_receive_count: u32,
    #[serde(default = "default_visibility_timeout")]
    pub visibility_timeout: i32,
    #[serde(default)]
    pub error_visibility_timeout: Vec<i32>,
    #[serde(default)]
    pub event_error_visibility_timeout: HashMap<String, Vec<i32>>,
    /// Only valid for FIFO queues, `perQueue` or `perMessageGroupId`
    #[serde(default)]
    pub fifo_throughput_limit: Option<String>,
    #[serde(default)]
    pub queue_access_key_id: Option<String>,
    #[serde(default)]
    pub queue_secret_access_key: Option<String>,
    #[serde(default)]
    pub dlq_access_key_id: Option<String>,
    #[serde(default)]
    pub dlq_secret_access_key: Option<String>,
}

const fn default_dlq_max_receive_count() -> u32 {
    5
}

const fn default_visibility_timeout() -> i32 {
    30
}

impl QueueProperties {
    /// Creates queue properties with defaults for everything but the name
    #[must_use]
    pub fn new(queue_name: impl Into<String>) -> Self {
        Self {
            queue_name: queue_name.into(),
            dlq_name: None,
            subscribe_topic_id: None,
            subscribe_filter: None,
            dlq_max_receive_count: default_dlq_max_receive_count(),
            visibility_timeout: default_visibility_timeout(),
            error_visibility_timeout: Vec::new(),
            event_error_visibility_timeout: HashMap::new(),
            fifo_throughput_limit: None,
            queue_access_key_id: None,
            queue_secret_access_key: None,
            dlq_access_key_id: None,
            dlq_secret_access_key: None,
        }
    }

    /// Sets the DLQ name
    #[must_use]
    pub fn with_dlq(mut self, dlq_name: impl Into<String>) -> Self {
        self.dlq_name = Some(dlq_name.into());
        self
    }

    #[must_use]
    pub fn is_fifo(&self) -> bool {
        self.queue_name.ends_with(FIFO_SUFFIX)
    }
}

/// Configuration of a single SNS topic
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TopicProperties {
    pub arn: String,
    #[serde(default)]
    pub access_key_id: Option<String>,
    #[serde(default)]
    pub secret_access_key: Option<String>,
}

impl TopicProperties {
    #[must_use]
    pub fn new(arn: impl Into<String>) -> Self {
        Self {
            arn: arn.into(),
            access_key_id: None,
            secret_access_key: None,
        }
    }

    /// Topic name, the last segment of the ARN
    #[must_use]
    pub fn name(&self) -> &str {
        self.arn.rsplit(':').next().unwrap_or(&self.arn)
    }

    #[must_use]
    pub fn is_fifo(&self) -> bool {
        self.arn.ends_with(FIFO_SUFFIX)
    }
}

/// Configuration of a single S3 bucket
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BucketProperties {
    pub bucket_name: String,
}

impl HmppsSqsProperties {
    /// Parses and validates properties from a TOML document
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the document is malformed or breaks a validation rule
    pub fn from_toml(document: &str) -> Result<Self, ConfigError> {
        let properties: Self =
            toml::from_str(document).map_err(|e| ConfigError::Malformed(e.to_string()))?;
        validate(&properties)?;
        Ok(properties)
    }

    /// Reads, parses and validates properties from a TOML file
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file cannot be read or is invalid
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let document = std::fs::read_to_string(path).map_err(|e| ConfigError::Unreadable {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_toml(&document)
    }
}
