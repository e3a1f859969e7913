use std::sync::Arc;
use std::time::Duration;

use aide::openapi::OpenApi;
use axum::{Extension, Router};
use datadog_tracing::axum::{OtelAxumLayer, OtelInResponseLayer};
use hmpps_sqs::HmppsQueueService;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::middleware::AdminAuth;
use crate::routes;
use crate::types::Environment;

/// Builds the application router with its shared state
pub fn router(
    environment: Environment,
    service: Arc<HmppsQueueService>,
    admin_auth: AdminAuth,
    request_timeout: Duration,
) -> Router {
    let mut openapi = OpenApi::default();

    routes::handler()
        .finish_api(&mut openapi)
        .layer(Extension(Arc::new(openapi)))
        .layer(Extension(environment))
        .layer(Extension(service))
        .layer(Extension(admin_auth))
        .layer(tower_http::timeout::TimeoutLayer::new(request_timeout))
}

/// Starts the server with the given environment and dependencies
///
/// # Errors
///
/// Returns an error if the server fails to start or bind to the port
pub async fn start(
    environment: Environment,
    service: Arc<HmppsQueueService>,
    admin_auth: AdminAuth,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let port = environment.port();
    let request_timeout = environment.request_timeout();

    let router = router(environment, service, admin_auth, request_timeout)
        // Include trace context as header into the response
        .layer(OtelInResponseLayer)
        // Start OpenTelemetry trace on incoming request
        .layer(OtelAxumLayer::default());

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));

    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("🔄 Queue Admin started on http://{addr}");

    axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(anyhow::Error::from)
}
