mod docs;
pub mod health;
pub mod queue_admin;

use aide::axum::{
    routing::{get, put},
    ApiRouter,
};
use axum::middleware;

use crate::middleware::admin_auth_middleware;

/// Creates the router with all handler routes
pub fn handler() -> ApiRouter {
    let scheduler_routes = ApiRouter::new().api_route(
        "/queue-admin/retry-all-dlqs",
        put(queue_admin::retry_all_dlqs),
    );

    let admin_routes = ApiRouter::new()
        .api_route(
            "/queue-admin/retry-dlq/{dlq_name}",
            put(queue_admin::retry_dlq),
        )
        .api_route(
            "/queue-admin/purge-queue/{queue_name}",
            put(queue_admin::purge_queue),
        )
        .api_route(
            "/queue-admin/get-dlq-messages/{dlq_name}",
            get(queue_admin::get_dlq_messages),
        )
        .layer(middleware::from_fn(admin_auth_middleware));

    ApiRouter::new()
        .merge(docs::handler())
        .route("/health", axum::routing::get(health::handler))
        .merge(scheduler_routes)
        .merge(admin_routes)
}
