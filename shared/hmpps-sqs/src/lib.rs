//! SQS, SNS and S3 integration for HMPPS services
//!
//! Wires configured queues, topics and buckets to provider clients, applies
//! error visibility timeouts to failed deliveries and moves, purges or
//! inspects messages on dead letter queues.

#![warn(clippy::all, clippy::pedantic, clippy::nursery)]

/// Synchronous adapter over the queue service
pub mod blocking;

/// Provider capabilities and their AWS implementations
pub mod client;

/// Configuration properties and startup validation
pub mod config;

/// Error types
pub mod error;

/// Health checks
pub mod health;

/// Message body decoding
pub mod json;

/// Queue polling
pub mod listener;

/// Queue, topic and bucket handles plus operation results
pub mod model;

/// Error visibility timeout policy
pub mod policy;

/// `LocalStack` resource creation
pub mod provisioning;

/// Queue registry and client cache
pub mod registry;

/// DLQ retry, purge and inspection
pub mod service;

/// Operational telemetry
pub mod telemetry;

/// Applies the visibility policy to failed deliveries
pub mod visibility;

/// In-memory provider fakes
#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use blocking::BlockingQueueService;
pub use config::{ConfigError, HmppsSqsProperties, Provider};
pub use error::{QueueError, QueueResult};
pub use json::{JsonDecoder, NumberPolicy};
pub use model::{HmppsBucket, HmppsQueue, HmppsTopic};
pub use registry::{ClientCache, QueueRegistry};
pub use service::HmppsQueueService;
