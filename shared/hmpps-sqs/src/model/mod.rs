//! Runtime view of the configured queues, topics and buckets

mod bucket;
mod queue;
mod results;
mod topic;

pub use bucket::HmppsBucket;
pub use queue::HmppsQueue;
pub use results::{DlqMessage, GetDlqResult, PurgeQueueRequest, PurgeQueueResult, RetryDlqResult};
pub use topic::HmppsTopic;
