use tracing::{info, warn};

use crate::client::ReceivedMessage;
use crate::model::HmppsQueue;
use crate::policy::{extract_event_type, VisibilityTimeoutPolicy};

/// Hides a message that failed processing for the time the policy picks
#[derive(Debug, Clone, Default)]
pub struct ErrorVisibilityHandler {
    policy: VisibilityTimeoutPolicy,
}

impl ErrorVisibilityHandler {
    #[must_use]
    pub const fn new(policy: VisibilityTimeoutPolicy) -> Self {
        Self { policy }
    }

    #[must_use]
    pub const fn policy(&self) -> &VisibilityTimeoutPolicy {
        &self.policy
    }

    /// Applies the visibility timeout for a failed delivery and returns it
    ///
    /// Never fails: a provider error changing the visibility is logged and the
    /// message simply reappears after the queue's own visibility timeout.
    pub async fn apply(&self, queue: &HmppsQueue, message: &ReceivedMessage) -> i32 {
        let receive_count = message.receive_count();
        let max_receive_count = match queue.max_receive_count().await {
            Ok(max_receive_count) => max_receive_count,
            Err(e) => {
                warn!(queue_id = %queue.id(), error = %e, "Failed to read maxReceiveCount");
                None
            }
        };
        let event_type = extract_event_type(&message.body, &message.message_attributes);

        let timeout = self.policy.next_timeout(
            queue.error_visibility_timeouts(),
            event_type.as_deref(),
            receive_count,
            max_receive_count,
        );

        let queue_url = match queue.queue_url().await {
            Ok(url) => url,
            Err(e) => {
                warn!(queue_id = %queue.id(), error = %e, "Failed to resolve queue url");
                return timeout;
            }
        };

        if let Err(e) = queue
            .sqs_client()
            .change_visibility(&queue_url, &message.receipt_handle, timeout)
            .await
        {
            warn!(queue_id = %queue.id(), error = %e, "Failed to change message visibility");
        }

        info!(
            queue_id = %queue.id(),
            event_type = event_type.as_deref().unwrap_or("none"),
            receive_count,
            visibility_timeout = timeout,
            "Setting visibility timeout after failed delivery"
        );

        timeout
    }
}
