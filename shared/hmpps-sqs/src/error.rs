use aws_sdk_sqs::error::{DisplayErrorContext, SdkError};
use thiserror::Error;

/// Result type alias for queue operations
pub type QueueResult<T> = Result<T, QueueError>;

/// Error types for queue, topic and bucket operations
#[derive(Error, Debug)]
pub enum QueueError {
    /// A call to the message provider failed
    #[error("{operation} failed: {message}")]
    Provider {
        /// Provider operation that failed, e.g. `ReceiveMessage`
        operation: &'static str,
        /// Rendered provider error
        message: String,
        /// Whether the provider answered with a 5xx
        upstream: bool,
    },

    /// The provider answered without a field we rely on
    #[error("{operation} response is missing {field}")]
    MissingField {
        /// Provider operation that was called
        operation: &'static str,
        /// Name of the missing field
        field: &'static str,
    },

    /// Error serializing message to JSON
    #[error("Failed to serialize message: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Invalid message format
    #[error("Invalid message format: {0}")]
    InvalidMessage(String),

    /// Message group ID is required for FIFO queues and topics
    #[error("Message group ID required for FIFO destination {0}")]
    MissingMessageGroupId(String),
}

impl QueueError {
    /// Builds a provider error from an AWS SDK error
    pub fn from_sdk<E>(operation: &'static str, err: &SdkError<E>) -> Self
    where
        E: std::error::Error + 'static,
    {
        Self::Provider {
            operation,
            message: DisplayErrorContext(err).to_string(),
            upstream: Self::check_sdk_error_status(err),
        }
    }

    /// Checks if this error represents an upstream (5xx) error
    #[must_use]
    pub const fn is_upstream_error(&self) -> bool {
        matches!(self, Self::Provider { upstream: true, .. })
    }

    fn check_sdk_error_status<E>(sdk_err: &SdkError<E>) -> bool {
        if let SdkError::ServiceError(err) = sdk_err {
            return err.raw().status().as_u16() >= 500;
        }
        false
    }
}
