use std::sync::Arc;

use tokio::runtime::{Builder, Runtime};

use crate::error::QueueResult;
use crate::model::{GetDlqResult, HmppsQueue, PurgeQueueRequest, PurgeQueueResult, RetryDlqResult};
use crate::service::HmppsQueueService;

/// Synchronous facade over [`HmppsQueueService`] for callers without a runtime
///
/// Must not be used from inside an async context.
#[derive(Debug)]
pub struct BlockingQueueService {
    inner: Arc<HmppsQueueService>,
    runtime: Runtime,
}

impl BlockingQueueService {
    /// Wraps a service with a dedicated current-thread runtime
    ///
    /// # Errors
    ///
    /// Returns `std::io::Error` if the runtime cannot be created
    pub fn new(inner: Arc<HmppsQueueService>) -> std::io::Result<Self> {
        let runtime = Builder::new_current_thread().enable_all().build()?;
        Ok(Self { inner, runtime })
    }

    #[must_use]
    pub const fn inner(&self) -> &Arc<HmppsQueueService> {
        &self.inner
    }

    /// See [`HmppsQueueService::retry_dlq`]
    ///
    /// # Errors
    ///
    /// Same as the async operation
    pub fn retry_dlq(&self, queue: &HmppsQueue) -> QueueResult<RetryDlqResult> {
        self.runtime.block_on(self.inner.retry_dlq(queue))
    }

    #[must_use]
    pub fn retry_all_dlqs(&self) -> Vec<RetryDlqResult> {
        self.runtime.block_on(self.inner.retry_all_dlqs())
    }

    /// See [`HmppsQueueService::purge_queue`]
    ///
    /// # Errors
    ///
    /// Same as the async operation
    pub fn purge_queue(&self, request: &PurgeQueueRequest) -> QueueResult<PurgeQueueResult> {
        self.runtime.block_on(self.inner.purge_queue(request))
    }

    /// See [`HmppsQueueService::purge_dlq`]
    ///
    /// # Errors
    ///
    /// Same as the async operation
    pub fn purge_dlq(&self, queue: &HmppsQueue) -> QueueResult<PurgeQueueResult> {
        self.runtime.block_on(self.inner.purge_dlq(queue))
    }

    /// See [`HmppsQueueService::find_queue_to_purge`]
    ///
    /// # Errors
    ///
    /// Same as the async operation
    pub fn find_queue_to_purge(&self, name: &str) -> QueueResult<Option<PurgeQueueRequest>> {
        self.runtime.block_on(self.inner.find_queue_to_purge(name))
    }

    /// See [`HmppsQueueService::get_dlq_messages`]
    ///
    /// # Errors
    ///
    /// Same as the async operation
    pub fn get_dlq_messages(&self, queue: &HmppsQueue, max_messages: i32) -> QueueResult<GetDlqResult> {
        self.runtime
            .block_on(self.inner.get_dlq_messages(queue, max_messages))
    }
}
