use std::sync::Arc;

use axum::{http::StatusCode, response::IntoResponse, Extension, Json};
use hmpps_sqs::health::health_report;
use hmpps_sqs::HmppsQueueService;

/// Health of every configured queue, topic and bucket
///
/// Returns 503 when any of them is DOWN.
pub async fn handler(Extension(service): Extension<Arc<HmppsQueueService>>) -> impl IntoResponse {
    let report = health_report(service.registry()).await;
    let status = if report.is_up() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(report))
}
