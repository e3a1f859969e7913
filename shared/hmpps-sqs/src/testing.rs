//! In-memory provider fakes
//!
//! Behave closely enough to SQS/SNS/S3 for the queue service to be
//! exercised end to end: visibility, receive counts, redrive policies and
//! topic fan-out are modelled; timing is not.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::client::{
    BucketClient, ClientFactory, Credentials, MessageAttributes, MessageBroker, MessageQueueClient, OutboundMessage,
    PublishRequest, QueueAttributes, ReceivedMessage, RedrivePolicy, TopicAttributes,
    APPROXIMATE_RECEIVE_COUNT, MESSAGE_GROUP_ID,
};
use crate::config::FIFO_SUFFIX;
use crate::error::{QueueError, QueueResult};
use crate::telemetry::TelemetryClient;

const ACCOUNT: &str = "000000000000";
const REGION: &str = "eu-west-2";

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn injected(operation: &'static str) -> QueueError {
    QueueError::Provider {
        operation,
        message: "injected failure".to_string(),
        upstream: true,
    }
}

fn not_found(operation: &'static str, what: &str) -> QueueError {
    QueueError::Provider {
        operation,
        message: format!("{what} does not exist"),
        upstream: false,
    }
}

/// A message stored on an in-memory queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredMessage {
    pub message_id: String,
    pub body: String,
    pub message_attributes: MessageAttributes,
    pub message_group_id: Option<String>,
    pub message_deduplication_id: Option<String>,
    pub receive_count: u32,
}

#[derive(Debug, Default)]
struct QueueState {
    attributes: HashMap<String, String>,
    visible: VecDeque<StoredMessage>,
    in_flight: Vec<(String, StoredMessage)>,
    redrive_policy: Option<RedrivePolicy>,
    reported_count: Option<i32>,
}

#[derive(Debug, Default)]
struct QueueStore {
    queues: BTreeMap<String, QueueState>,
    calls: HashMap<&'static str, usize>,
    failing_operations: HashSet<&'static str>,
    failing_queues: HashSet<String>,
    visibility_changes: Vec<(String, String, i32)>,
    next_id: u64,
}

impl QueueStore {
    fn record(&mut self, operation: &'static str, queue_name: Option<&str>) -> QueueResult<()> {
        *self.calls.entry(operation).or_default() += 1;
        if self.failing_operations.contains(operation)
            || queue_name.is_some_and(|name| self.failing_queues.contains(name))
        {
            return Err(injected(operation));
        }
        Ok(())
    }

    fn queue(&mut self, operation: &'static str, queue_url: &str) -> QueueResult<&mut QueueState> {
        let name = InMemoryQueueClient::name_from_url(queue_url);
        self.queues
            .get_mut(name)
            .ok_or_else(|| not_found(operation, name))
    }

    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

/// In-memory [`MessageQueueClient`]
#[derive(Debug, Default)]
pub struct InMemoryQueueClient {
    store: Mutex<QueueStore>,
}

impl InMemoryQueueClient {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// URL the fake hands out for a queue name
    #[must_use]
    pub fn url_for(queue_name: &str) -> String {
        format!("http://localhost:4566/{ACCOUNT}/{queue_name}")
    }

    /// ARN the fake hands out for a queue name
    #[must_use]
    pub fn arn_for(queue_name: &str) -> String {
        format!("arn:aws:sqs:{REGION}:{ACCOUNT}:{queue_name}")
    }

    fn name_from_url(queue_url: &str) -> &str {
        queue_url.rsplit('/').next().unwrap_or(queue_url)
    }

    /// Creates an empty queue, returning its URL
    pub fn create(&self, queue_name: &str) -> String {
        lock(&self.store)
            .queues
            .entry(queue_name.to_string())
            .or_default();
        Self::url_for(queue_name)
    }

    /// Creates a queue whose redrive policy points at `dlq_name`
    pub fn create_with_redrive(&self, queue_name: &str, dlq_name: &str, max_receive_count: u32) -> String {
        lock(&self.store)
            .queues
            .entry(queue_name.to_string())
            .or_default()
            .redrive_policy = Some(RedrivePolicy {
            dead_letter_target_arn: Self::arn_for(dlq_name),
            max_receive_count,
        });
        Self::url_for(queue_name)
    }

    /// Puts a message straight onto a queue, bypassing call counters
    pub fn seed(&self, queue_name: &str, message: OutboundMessage) -> String {
        let mut store = lock(&self.store);
        let id = store.next_id();
        let message_id = format!("msg-{id}");
        store
            .queues
            .entry(queue_name.to_string())
            .or_default()
            .visible
            .push_back(StoredMessage {
                message_id: message_id.clone(),
                body: message.body,
                message_attributes: message.message_attributes,
                message_group_id: message.message_group_id,
                message_deduplication_id: message.message_deduplication_id,
                receive_count: 0,
            });
        message_id
    }

    /// Seeds a message with only a body
    pub fn seed_body(&self, queue_name: &str, body: &str) -> String {
        self.seed(
            queue_name,
            OutboundMessage {
                body: body.to_string(),
                ..OutboundMessage::default()
            },
        )
    }

    /// Messages currently visible on a queue
    #[must_use]
    pub fn visible(&self, queue_name: &str) -> Vec<StoredMessage> {
        lock(&self.store)
            .queues
            .get(queue_name)
            .map(|queue| queue.visible.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of received but not deleted messages on a queue
    #[must_use]
    pub fn in_flight(&self, queue_name: &str) -> usize {
        lock(&self.store)
            .queues
            .get(queue_name)
            .map_or(0, |queue| queue.in_flight.len())
    }

    /// Makes every in-flight message visible again, as if their visibility timeouts expired
    pub fn expire_visibility(&self, queue_name: &str) {
        let mut store = lock(&self.store);
        if let Some(queue) = store.queues.get_mut(queue_name) {
            let expired: Vec<_> = queue.in_flight.drain(..).map(|(_, message)| message).collect();
            queue.visible.extend(expired);
        }
    }

    /// Reports `count` as the approximate message count regardless of the real content
    pub fn report_count(&self, queue_name: &str, count: i32) {
        lock(&self.store)
            .queues
            .entry(queue_name.to_string())
            .or_default()
            .reported_count = Some(count);
    }

    /// Attributes a queue was created with
    #[must_use]
    pub fn attributes_of(&self, queue_name: &str) -> HashMap<String, String> {
        lock(&self.store)
            .queues
            .get(queue_name)
            .map(|queue| queue.attributes.clone())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn queue_names(&self) -> Vec<String> {
        lock(&self.store).queues.keys().cloned().collect()
    }

    /// Number of calls made to a provider operation, e.g. `PurgeQueue`
    #[must_use]
    pub fn calls(&self, operation: &str) -> usize {
        lock(&self.store).calls.get(operation).copied().unwrap_or(0)
    }

    /// Visibility changes as `(queue name, receipt handle, seconds)`
    #[must_use]
    pub fn visibility_changes(&self) -> Vec<(String, String, i32)> {
        lock(&self.store).visibility_changes.clone()
    }

    /// Makes every call to `operation` fail
    pub fn fail_operation(&self, operation: &'static str) {
        lock(&self.store).failing_operations.insert(operation);
    }

    /// Makes every call touching `queue_name` fail
    pub fn fail_queue(&self, queue_name: &str) {
        lock(&self.store).failing_queues.insert(queue_name.to_string());
    }

    pub fn clear_failures(&self) {
        let mut store = lock(&self.store);
        store.failing_operations.clear();
        store.failing_queues.clear();
    }

    fn receive(&self, queue_url: &str, max_messages: usize) -> QueueResult<Vec<ReceivedMessage>> {
        let name = Self::name_from_url(queue_url).to_string();
        let mut store = lock(&self.store);
        store.record("ReceiveMessage", Some(&name))?;

        let mut received = Vec::new();
        for _ in 0..max_messages {
            let id = store.next_id();
            let queue = store.queue("ReceiveMessage", queue_url)?;
            let Some(mut message) = queue.visible.pop_front() else {
                break;
            };
            message.receive_count += 1;
            let receipt_handle = format!("{name}-{}-{id}", message.message_id);

            let mut attributes = HashMap::new();
            attributes.insert(
                APPROXIMATE_RECEIVE_COUNT.to_string(),
                message.receive_count.to_string(),
            );
            if let Some(group) = &message.message_group_id {
                attributes.insert(MESSAGE_GROUP_ID.to_string(), group.clone());
            }

            received.push(ReceivedMessage {
                message_id: message.message_id.clone(),
                receipt_handle: receipt_handle.clone(),
                body: message.body.clone(),
                attributes,
                message_attributes: message.message_attributes.clone(),
            });
            queue.in_flight.push((receipt_handle, message));
        }
        Ok(received)
    }
}

#[async_trait]
impl MessageQueueClient for InMemoryQueueClient {
    async fn queue_url(&self, queue_name: &str) -> QueueResult<String> {
        let mut store = lock(&self.store);
        store.record("GetQueueUrl", Some(queue_name))?;
        if store.queues.contains_key(queue_name) {
            Ok(Self::url_for(queue_name))
        } else {
            Err(not_found("GetQueueUrl", queue_name))
        }
    }

    async fn queue_attributes(&self, queue_url: &str) -> QueueResult<QueueAttributes> {
        let name = Self::name_from_url(queue_url).to_string();
        let mut store = lock(&self.store);
        store.record("GetQueueAttributes", Some(&name))?;
        let queue = store.queue("GetQueueAttributes", queue_url)?;
        let visible = i32::try_from(queue.visible.len()).unwrap_or(i32::MAX);

        Ok(QueueAttributes {
            queue_arn: Some(Self::arn_for(&name)),
            messages_on_queue: queue.reported_count.unwrap_or(visible),
            messages_in_flight: i32::try_from(queue.in_flight.len()).unwrap_or(i32::MAX),
            redrive_policy: queue.redrive_policy.clone(),
        })
    }

    async fn receive_one(&self, queue_url: &str) -> QueueResult<Option<ReceivedMessage>> {
        Ok(self.receive(queue_url, 1)?.into_iter().next())
    }

    async fn receive_messages(
        &self,
        queue_url: &str,
        max_messages: i32,
        _wait_time_seconds: i32,
    ) -> QueueResult<Vec<ReceivedMessage>> {
        let max_messages = usize::try_from(max_messages.clamp(1, 10)).unwrap_or(1);
        self.receive(queue_url, max_messages)
    }

    async fn send(&self, queue_url: &str, message: OutboundMessage) -> QueueResult<String> {
        let name = Self::name_from_url(queue_url).to_string();
        let mut store = lock(&self.store);
        store.record("SendMessage", Some(&name))?;
        if name.ends_with(FIFO_SUFFIX) && message.message_group_id.is_none() {
            return Err(QueueError::MissingMessageGroupId(name));
        }

        let id = store.next_id();
        let message_id = format!("msg-{id}");
        store.queue("SendMessage", queue_url)?.visible.push_back(StoredMessage {
            message_id: message_id.clone(),
            body: message.body,
            message_attributes: message.message_attributes,
            message_group_id: message.message_group_id,
            message_deduplication_id: message.message_deduplication_id,
            receive_count: 0,
        });
        Ok(message_id)
    }

    async fn delete(&self, queue_url: &str, receipt_handle: &str) -> QueueResult<()> {
        let name = Self::name_from_url(queue_url).to_string();
        let mut store = lock(&self.store);
        store.record("DeleteMessage", Some(&name))?;
        let queue = store.queue("DeleteMessage", queue_url)?;
        let position = queue
            .in_flight
            .iter()
            .position(|(handle, _)| handle == receipt_handle)
            .ok_or_else(|| not_found("DeleteMessage", receipt_handle))?;
        queue.in_flight.remove(position);
        Ok(())
    }

    async fn purge(&self, queue_url: &str) -> QueueResult<()> {
        let name = Self::name_from_url(queue_url).to_string();
        let mut store = lock(&self.store);
        store.record("PurgeQueue", Some(&name))?;
        let queue = store.queue("PurgeQueue", queue_url)?;
        queue.visible.clear();
        queue.in_flight.clear();
        Ok(())
    }

    async fn change_visibility(
        &self,
        queue_url: &str,
        receipt_handle: &str,
        visibility_timeout: i32,
    ) -> QueueResult<()> {
        let name = Self::name_from_url(queue_url).to_string();
        let mut store = lock(&self.store);
        store.record("ChangeMessageVisibility", Some(&name))?;
        let queue = store.queue("ChangeMessageVisibility", queue_url)?;
        let position = queue
            .in_flight
            .iter()
            .position(|(handle, _)| handle == receipt_handle)
            .ok_or_else(|| not_found("ChangeMessageVisibility", receipt_handle))?;
        if visibility_timeout == 0 {
            let (_, message) = queue.in_flight.remove(position);
            queue.visible.push_back(message);
        }
        store
            .visibility_changes
            .push((name, receipt_handle.to_string(), visibility_timeout));
        Ok(())
    }

    async fn create_queue(
        &self,
        queue_name: &str,
        attributes: HashMap<String, String>,
    ) -> QueueResult<String> {
        let mut store = lock(&self.store);
        store.record("CreateQueue", Some(queue_name))?;
        let redrive_policy = attributes
            .get("RedrivePolicy")
            .map(|policy| RedrivePolicy::parse(policy))
            .transpose()?;
        let queue = store.queues.entry(queue_name.to_string()).or_default();
        if queue.attributes.is_empty() {
            queue.attributes = attributes;
            queue.redrive_policy = redrive_policy;
        }
        Ok(Self::url_for(queue_name))
    }
}

#[derive(Debug, Default)]
struct TopicState {
    attributes: HashMap<String, String>,
    subscriptions: Vec<(String, Option<String>)>,
    published: Vec<PublishRequest>,
    pending: i32,
}

#[derive(Debug, Default)]
struct TopicStore {
    topics: BTreeMap<String, TopicState>,
    calls: HashMap<&'static str, usize>,
    failing_operations: HashSet<&'static str>,
    next_id: u64,
}

/// In-memory [`MessageBroker`]
///
/// With [`InMemoryMessageBroker::delivering_to`] published messages are
/// wrapped in a notification envelope and delivered to subscribed queues
/// whose filter policy matches.
#[derive(Debug, Default)]
pub struct InMemoryMessageBroker {
    store: Mutex<TopicStore>,
    queues: Option<Arc<InMemoryQueueClient>>,
}

impl InMemoryMessageBroker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn delivering_to(queues: Arc<InMemoryQueueClient>) -> Self {
        Self {
            store: Mutex::default(),
            queues: Some(queues),
        }
    }

    #[must_use]
    pub fn arn_for(topic_name: &str) -> String {
        format!("arn:aws:sns:{REGION}:{ACCOUNT}:{topic_name}")
    }

    /// Registers an existing topic
    pub fn create(&self, topic_arn: &str) {
        lock(&self.store)
            .topics
            .entry(topic_arn.to_string())
            .or_default();
    }

    /// Sets the number of pending subscriptions reported for a topic
    pub fn set_pending(&self, topic_arn: &str, pending: i32) {
        lock(&self.store)
            .topics
            .entry(topic_arn.to_string())
            .or_default()
            .pending = pending;
    }

    #[must_use]
    pub fn published(&self, topic_arn: &str) -> Vec<PublishRequest> {
        lock(&self.store)
            .topics
            .get(topic_arn)
            .map(|topic| topic.published.clone())
            .unwrap_or_default()
    }

    /// Subscriptions of a topic as `(queue arn, filter policy)`
    #[must_use]
    pub fn subscriptions(&self, topic_arn: &str) -> Vec<(String, Option<String>)> {
        lock(&self.store)
            .topics
            .get(topic_arn)
            .map(|topic| topic.subscriptions.clone())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn attributes_of(&self, topic_arn: &str) -> HashMap<String, String> {
        lock(&self.store)
            .topics
            .get(topic_arn)
            .map(|topic| topic.attributes.clone())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn topic_arns(&self) -> Vec<String> {
        lock(&self.store).topics.keys().cloned().collect()
    }

    #[must_use]
    pub fn calls(&self, operation: &str) -> usize {
        lock(&self.store).calls.get(operation).copied().unwrap_or(0)
    }

    pub fn fail_operation(&self, operation: &'static str) {
        lock(&self.store).failing_operations.insert(operation);
    }

    fn record(store: &mut TopicStore, operation: &'static str) -> QueueResult<()> {
        *store.calls.entry(operation).or_default() += 1;
        if store.failing_operations.contains(operation) {
            return Err(injected(operation));
        }
        Ok(())
    }

    fn envelope(topic_arn: &str, message_id: &str, request: &PublishRequest) -> String {
        let attributes: serde_json::Map<String, Value> = request
            .message_attributes
            .iter()
            .map(|(name, value)| {
                (
                    name.clone(),
                    json!({ "Type": value.data_type, "Value": value.string_value }),
                )
            })
            .collect();

        json!({
            "Type": "Notification",
            "MessageId": message_id,
            "TopicArn": topic_arn,
            "Message": request.body,
            "MessageAttributes": attributes,
        })
        .to_string()
    }
}

/// Matches the attribute form of an SNS filter policy: every key must be
/// present with one of the listed string values.
fn filter_matches(filter_policy: &str, attributes: &MessageAttributes) -> bool {
    let Ok(Value::Object(policy)) = serde_json::from_str::<Value>(filter_policy) else {
        return false;
    };
    policy.iter().all(|(name, allowed)| {
        let Some(value) = attributes.get(name).and_then(|v| v.string_value.as_deref()) else {
            return false;
        };
        allowed
            .as_array()
            .is_some_and(|allowed| allowed.iter().any(|a| a.as_str() == Some(value)))
    })
}

#[async_trait]
impl MessageBroker for InMemoryMessageBroker {
    async fn publish(&self, topic_arn: &str, request: PublishRequest) -> QueueResult<String> {
        let (message_id, deliveries) = {
            let mut store = lock(&self.store);
            Self::record(&mut store, "Publish")?;
            store.next_id += 1;
            let message_id = format!("sns-{}", store.next_id);
            let topic = store
                .topics
                .get_mut(topic_arn)
                .ok_or_else(|| not_found("Publish", topic_arn))?;

            let body = Self::envelope(topic_arn, &message_id, &request);
            let deliveries: Vec<String> = topic
                .subscriptions
                .iter()
                .filter(|(_, filter)| {
                    filter
                        .as_deref()
                        .is_none_or(|filter| filter_matches(filter, &request.message_attributes))
                })
                .filter_map(|(queue_arn, _)| queue_arn.rsplit(':').next().map(ToString::to_string))
                .collect();
            topic.published.push(request.clone());

            (message_id, deliveries.into_iter().map(|queue| (queue, body.clone())).collect::<Vec<_>>())
        };

        if let Some(queues) = &self.queues {
            for (queue_name, body) in deliveries {
                queues.seed(
                    &queue_name,
                    OutboundMessage {
                        body,
                        message_group_id: request.message_group_id.clone(),
                        ..OutboundMessage::default()
                    },
                );
            }
        }

        Ok(message_id)
    }

    async fn subscribe(
        &self,
        topic_arn: &str,
        queue_arn: &str,
        filter_policy: Option<&str>,
    ) -> QueueResult<String> {
        let mut store = lock(&self.store);
        Self::record(&mut store, "Subscribe")?;
        let topic = store
            .topics
            .get_mut(topic_arn)
            .ok_or_else(|| not_found("Subscribe", topic_arn))?;
        topic
            .subscriptions
            .push((queue_arn.to_string(), filter_policy.map(ToString::to_string)));
        Ok(format!("{topic_arn}:sub-{}", topic.subscriptions.len()))
    }

    async fn topic_attributes(&self, topic_arn: &str) -> QueueResult<TopicAttributes> {
        let mut store = lock(&self.store);
        Self::record(&mut store, "GetTopicAttributes")?;
        let topic = store
            .topics
            .get(topic_arn)
            .ok_or_else(|| not_found("GetTopicAttributes", topic_arn))?;
        Ok(TopicAttributes {
            subscriptions_confirmed: i32::try_from(topic.subscriptions.len()).unwrap_or(i32::MAX),
            subscriptions_pending: topic.pending,
        })
    }

    async fn create_topic(
        &self,
        topic_name: &str,
        attributes: HashMap<String, String>,
    ) -> QueueResult<String> {
        let mut store = lock(&self.store);
        Self::record(&mut store, "CreateTopic")?;
        let arn = Self::arn_for(topic_name);
        let topic = store.topics.entry(arn.clone()).or_default();
        if topic.attributes.is_empty() {
            topic.attributes = attributes;
        }
        Ok(arn)
    }
}

/// In-memory [`BucketClient`]
#[derive(Debug, Default)]
pub struct InMemoryBucketClient {
    buckets: Mutex<HashSet<String>>,
}

impl InMemoryBucketClient {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&self, bucket_name: &str) {
        lock(&self.buckets).insert(bucket_name.to_string());
    }
}

#[async_trait]
impl BucketClient for InMemoryBucketClient {
    async fn head_bucket(&self, bucket_name: &str) -> QueueResult<()> {
        if lock(&self.buckets).contains(bucket_name) {
            Ok(())
        } else {
            Err(not_found("HeadBucket", bucket_name))
        }
    }
}

/// Telemetry client remembering every event
#[derive(Debug, Default)]
pub struct RecordingTelemetryClient {
    events: Mutex<Vec<(String, HashMap<String, String>)>>,
}

impl RecordingTelemetryClient {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn events(&self) -> Vec<(String, HashMap<String, String>)> {
        lock(&self.events).clone()
    }
}

impl TelemetryClient for RecordingTelemetryClient {
    fn track_event(&self, name: &str, properties: &HashMap<String, String>) {
        lock(&self.events).push((name.to_string(), properties.clone()));
    }
}

/// Client factory handing out shared in-memory fakes
#[derive(Debug)]
pub struct InMemoryClientFactory {
    pub queues: Arc<InMemoryQueueClient>,
    pub broker: Arc<InMemoryMessageBroker>,
    pub buckets: Arc<InMemoryBucketClient>,
    created: Mutex<HashMap<&'static str, usize>>,
}

impl InMemoryClientFactory {
    #[must_use]
    pub fn new() -> Self {
        let queues = Arc::new(InMemoryQueueClient::new());
        Self {
            broker: Arc::new(InMemoryMessageBroker::delivering_to(queues.clone())),
            queues,
            buckets: Arc::new(InMemoryBucketClient::new()),
            created: Mutex::default(),
        }
    }

    #[must_use]
    pub fn sqs_clients_created(&self) -> usize {
        lock(&self.created).get("sqs").copied().unwrap_or(0)
    }

    #[must_use]
    pub fn sns_clients_created(&self) -> usize {
        lock(&self.created).get("sns").copied().unwrap_or(0)
    }

    fn count(&self, kind: &'static str) {
        *lock(&self.created).entry(kind).or_default() += 1;
    }
}

impl Default for InMemoryClientFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientFactory for InMemoryClientFactory {
    fn sqs_client(&self, _credentials: Option<&Credentials>) -> Arc<dyn MessageQueueClient> {
        self.count("sqs");
        self.queues.clone()
    }

    fn sns_client(&self, _credentials: Option<&Credentials>) -> Arc<dyn MessageBroker> {
        self.count("sns");
        self.broker.clone()
    }

    fn bucket_client(&self) -> Arc<dyn BucketClient> {
        self.count("s3");
        self.buckets.clone()
    }
}
