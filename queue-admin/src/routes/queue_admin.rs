//! DLQ administration: retry, purge and inspection

use std::sync::Arc;

use axum::{
    extract::{Path, Query},
    Extension, Json,
};
use hmpps_sqs::model::{GetDlqResult, PurgeQueueResult, RetryDlqResult};
use hmpps_sqs::HmppsQueueService;
use schemars::JsonSchema;
use serde::Deserialize;

use crate::types::AppError;

const fn default_max_messages() -> i32 {
    100
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct DlqPath {
    /// Name of the dead letter queue
    dlq_name: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct QueuePath {
    /// Name of a queue or dead letter queue
    queue_name: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GetDlqMessagesQuery {
    /// Upper bound on the messages returned
    #[serde(default = "default_max_messages")]
    max_messages: i32,
}

/// Retry a DLQ
///
/// Moves every message on the DLQ back onto its main queue.
///
/// # Errors
///
/// - `not_found` if no queue has this DLQ
/// - `upstream_error` / `internal_error` if the provider fails
pub async fn retry_dlq(
    Extension(service): Extension<Arc<HmppsQueueService>>,
    Path(DlqPath { dlq_name }): Path<DlqPath>,
) -> Result<Json<RetryDlqResult>, AppError> {
    let queue = service
        .registry()
        .find_by_dlq_name(&dlq_name)
        .ok_or(AppError::not_found("DLQ not found"))?;

    Ok(Json(service.retry_dlq(queue).await?))
}

/// Retry all DLQs
///
/// Retries the DLQ of every configured queue, in configuration order. Meant
/// for an internal scheduler and not protected by the admin token.
pub async fn retry_all_dlqs(
    Extension(service): Extension<Arc<HmppsQueueService>>,
) -> Json<Vec<RetryDlqResult>> {
    Json(service.retry_all_dlqs().await)
}

/// Purge a queue
///
/// Accepts a main queue name or a DLQ name.
///
/// # Errors
///
/// - `not_found` if the name matches no configured queue
/// - `upstream_error` / `internal_error` if the provider fails
pub async fn purge_queue(
    Extension(service): Extension<Arc<HmppsQueueService>>,
    Path(QueuePath { queue_name }): Path<QueuePath>,
) -> Result<Json<PurgeQueueResult>, AppError> {
    let request = service
        .find_queue_to_purge(&queue_name)
        .await?
        .ok_or(AppError::not_found("Queue not found"))?;

    Ok(Json(service.purge_queue(&request).await?))
}

/// Get DLQ messages
///
/// Reads messages without removing them. Messages read stay hidden for the
/// DLQ's visibility timeout, so calling again soon after returns fewer.
///
/// # Errors
///
/// - `not_found` if no queue has this DLQ
/// - `upstream_error` / `internal_error` if the provider fails
pub async fn get_dlq_messages(
    Extension(service): Extension<Arc<HmppsQueueService>>,
    Path(DlqPath { dlq_name }): Path<DlqPath>,
    Query(query): Query<GetDlqMessagesQuery>,
) -> Result<Json<GetDlqResult>, AppError> {
    let queue = service
        .registry()
        .find_by_dlq_name(&dlq_name)
        .ok_or(AppError::not_found("DLQ not found"))?;

    Ok(Json(
        service.get_dlq_messages(queue, query.max_messages).await?,
    ))
}
