//! Lookup of the configured queues, topics and buckets

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::info;

use crate::client::{BucketClient, ClientFactory, Credentials, MessageBroker, MessageQueueClient};
use crate::config::{validate, ConfigError, HmppsSqsProperties, QueueProperties};
use crate::model::{HmppsBucket, HmppsQueue, HmppsTopic};
use crate::policy::{ErrorVisibilityTimeouts, VisibilityTimeoutPolicy};
use crate::visibility::ErrorVisibilityHandler;

const DEFAULT_CLIENT_KEY: &str = "default";

/// Memoised provider clients keyed by name
pub struct ClientCache<T: ?Sized> {
    clients: Mutex<HashMap<String, Arc<T>>>,
}

impl<T: ?Sized> ClientCache<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            clients: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the client stored under `key`, creating it on first use
    pub fn get_or_create(&self, key: &str, create: impl FnOnce() -> Arc<T>) -> Arc<T> {
        let mut clients = self.clients.lock().unwrap_or_else(PoisonError::into_inner);
        clients
            .entry(key.to_string())
            .or_insert_with(create)
            .clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.clients
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: ?Sized> Default for ClientCache<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ?Sized> fmt::Debug for ClientCache<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientCache")
            .field("len", &self.len())
            .finish()
    }
}

fn client_key(credentials: Option<&Credentials>) -> String {
    credentials.map_or_else(
        || DEFAULT_CLIENT_KEY.to_string(),
        |credentials| credentials.access_key_id.clone(),
    )
}

/// Holds every configured queue, topic and bucket after startup
///
/// Iteration follows the order entries appear in the configuration; lookups
/// are by index.
#[derive(Debug, Default)]
pub struct QueueRegistry {
    queues: Vec<Arc<HmppsQueue>>,
    topics: Vec<Arc<HmppsTopic>>,
    buckets: Vec<Arc<HmppsBucket>>,
    queues_by_id: HashMap<String, usize>,
    queues_by_name: HashMap<String, usize>,
    queues_by_dlq_name: HashMap<String, usize>,
    topics_by_id: HashMap<String, usize>,
    buckets_by_id: HashMap<String, usize>,
    visibility_policy: VisibilityTimeoutPolicy,
}

impl QueueRegistry {
    #[must_use]
    pub fn new(queues: Vec<HmppsQueue>, topics: Vec<HmppsTopic>, buckets: Vec<HmppsBucket>) -> Self {
        let queues: Vec<_> = queues.into_iter().map(Arc::new).collect();
        let topics: Vec<_> = topics.into_iter().map(Arc::new).collect();
        let buckets: Vec<_> = buckets.into_iter().map(Arc::new).collect();

        let index = |keys: Vec<Option<String>>| -> HashMap<String, usize> {
            keys.into_iter()
                .enumerate()
                .filter_map(|(position, key)| key.map(|key| (key, position)))
                .collect()
        };

        Self {
            queues_by_id: index(queues.iter().map(|q| Some(q.id().to_string())).collect()),
            queues_by_name: index(queues.iter().map(|q| Some(q.queue_name().to_string())).collect()),
            queues_by_dlq_name: index(queues.iter().map(|q| q.dlq_name().map(ToString::to_string)).collect()),
            topics_by_id: index(topics.iter().map(|t| Some(t.id().to_string())).collect()),
            buckets_by_id: index(buckets.iter().map(|b| Some(b.id().to_string())).collect()),
            queues,
            topics,
            buckets,
            visibility_policy: VisibilityTimeoutPolicy::default(),
        }
    }

    /// Replaces the policy used for failed deliveries
    #[must_use]
    pub fn with_visibility_policy(mut self, visibility_policy: VisibilityTimeoutPolicy) -> Self {
        self.visibility_policy = visibility_policy;
        self
    }

    /// Validates the configuration and wires a handle for every entry
    ///
    /// Queues, DLQs and topics sharing credentials share a client.
    ///
    /// # Errors
    ///
    /// Returns the first `ConfigError` found in `properties`
    pub fn build(properties: &HmppsSqsProperties, factory: &dyn ClientFactory) -> Result<Self, ConfigError> {
        validate(properties)?;

        let sqs_clients = ClientCache::<dyn MessageQueueClient>::new();
        let sns_clients = ClientCache::<dyn MessageBroker>::new();

        let queues = properties
            .queues
            .iter()
            .map(|(id, queue)| {
                let credentials = Credentials::from_pair(
                    queue.queue_access_key_id.as_deref(),
                    queue.queue_secret_access_key.as_deref(),
                );
                let client = sqs_clients.get_or_create(&client_key(credentials.as_ref()), || {
                    factory.sqs_client(credentials.as_ref())
                });
                let handle = HmppsQueue::new(id.as_str(), queue.queue_name.as_str(), client)
                    .with_error_visibility_timeouts(error_visibility_timeouts(queue));

                match &queue.dlq_name {
                    Some(dlq_name) => {
                        let credentials = Credentials::from_pair(
                            queue.dlq_access_key_id.as_deref(),
                            queue.dlq_secret_access_key.as_deref(),
                        );
                        let dlq_client = sqs_clients
                            .get_or_create(&client_key(credentials.as_ref()), || {
                                factory.sqs_client(credentials.as_ref())
                            });
                        handle.with_dlq(dlq_name.as_str(), dlq_client)
                    }
                    None => handle,
                }
            })
            .collect();

        let topics = properties
            .topics
            .iter()
            .map(|(id, topic)| {
                let credentials = Credentials::from_pair(
                    topic.access_key_id.as_deref(),
                    topic.secret_access_key.as_deref(),
                );
                let client = sns_clients.get_or_create(&client_key(credentials.as_ref()), || {
                    factory.sns_client(credentials.as_ref())
                });
                HmppsTopic::new(id.as_str(), topic.arn.as_str(), client)
            })
            .collect();

        let buckets = if properties.buckets.is_empty() {
            Vec::new()
        } else {
            let client: Arc<dyn BucketClient> = factory.bucket_client();
            properties
                .buckets
                .iter()
                .map(|(id, bucket)| HmppsBucket::new(id.as_str(), bucket.bucket_name.as_str(), client.clone()))
                .collect()
        };

        let registry = Self::new(queues, topics, buckets)
            .with_visibility_policy(VisibilityTimeoutPolicy::from_properties(properties));
        info!(
            queues = registry.queues.len(),
            topics = registry.topics.len(),
            buckets = registry.buckets.len(),
            sqs_clients = sqs_clients.len(),
            sns_clients = sns_clients.len(),
            "Built queue registry"
        );
        Ok(registry)
    }

    /// Queues in configuration order
    #[must_use]
    pub fn queues(&self) -> &[Arc<HmppsQueue>] {
        &self.queues
    }

    /// Policy carrying the configured default error visibility schedule
    #[must_use]
    pub const fn visibility_policy(&self) -> &VisibilityTimeoutPolicy {
        &self.visibility_policy
    }

    /// Handler for listeners on this registry's queues
    #[must_use]
    pub fn error_visibility_handler(&self) -> ErrorVisibilityHandler {
        ErrorVisibilityHandler::new(self.visibility_policy.clone())
    }

    #[must_use]
    pub fn topics(&self) -> &[Arc<HmppsTopic>] {
        &self.topics
    }

    #[must_use]
    pub fn buckets(&self) -> &[Arc<HmppsBucket>] {
        &self.buckets
    }

    #[must_use]
    pub fn find_by_queue_id(&self, queue_id: &str) -> Option<&Arc<HmppsQueue>> {
        self.queues_by_id.get(queue_id).map(|&i| &self.queues[i])
    }

    #[must_use]
    pub fn find_by_queue_name(&self, queue_name: &str) -> Option<&Arc<HmppsQueue>> {
        self.queues_by_name.get(queue_name).map(|&i| &self.queues[i])
    }

    #[must_use]
    pub fn find_by_dlq_name(&self, dlq_name: &str) -> Option<&Arc<HmppsQueue>> {
        self.queues_by_dlq_name.get(dlq_name).map(|&i| &self.queues[i])
    }

    #[must_use]
    pub fn find_by_topic_id(&self, topic_id: &str) -> Option<&Arc<HmppsTopic>> {
        self.topics_by_id.get(topic_id).map(|&i| &self.topics[i])
    }

    #[must_use]
    pub fn find_by_bucket_id(&self, bucket_id: &str) -> Option<&Arc<HmppsBucket>> {
        self.buckets_by_id.get(bucket_id).map(|&i| &self.buckets[i])
    }
}

fn error_visibility_timeouts(queue: &QueueProperties) -> ErrorVisibilityTimeouts {
    ErrorVisibilityTimeouts {
        error_visibility_timeout: queue.error_visibility_timeout.clone(),
        event_error_visibility_timeout: queue.event_error_visibility_timeout.clone(),
    }
}
