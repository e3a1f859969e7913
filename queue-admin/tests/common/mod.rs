// Not every helper is used in every test, so we allow dead code
#![allow(unused_imports, dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::{body::Body, http::Request, response::Response, Router};
use hmpps_sqs::config::{QueueProperties, TopicProperties};
use hmpps_sqs::provisioning::provision;
use hmpps_sqs::testing::{InMemoryClientFactory, RecordingTelemetryClient};
use hmpps_sqs::{HmppsQueueService, HmppsSqsProperties, JsonDecoder, Provider, QueueRegistry};
use http_body_util::BodyExt;
use queue_admin::{middleware::AdminAuth, server, types::Environment};
use tower::ServiceExt;

pub const ADMIN_TOKEN: &str = "test-admin-token";

/// Setup test environment variables with all the required configuration
pub fn setup_test_env() {
    dotenvy::from_path(".env.example").ok();

    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .try_init()
        .ok();
}

fn properties() -> HmppsSqsProperties {
    let mut properties = HmppsSqsProperties {
        provider: Provider::Localstack,
        ..HmppsSqsProperties::default()
    };
    properties.topics.insert(
        "domainevents".to_string(),
        TopicProperties::new("arn:aws:sns:eu-west-2:000000000000:domain-events"),
    );
    properties.queues.insert(
        "audit".to_string(),
        QueueProperties::new("audit-queue"),
    );

    let mut events = QueueProperties::new("events-queue").with_dlq("events-dlq");
    events.subscribe_topic_id = Some("domainevents".to_string());
    properties.queues.insert("events".to_string(), events);

    properties.queues.insert(
        "orders".to_string(),
        QueueProperties::new("orders.fifo").with_dlq("orders-dlq.fifo"),
    );
    properties
}

/// Router over in-memory queues
pub struct TestSetup {
    pub router: Router,
    pub factory: InMemoryClientFactory,
    pub telemetry: Arc<RecordingTelemetryClient>,
    pub service: Arc<HmppsQueueService>,
}

impl TestSetup {
    pub async fn new() -> Self {
        Self::with_auth(AdminAuth::new(Some(ADMIN_TOKEN), false)).await
    }

    pub async fn with_auth(admin_auth: AdminAuth) -> Self {
        setup_test_env();

        let properties = properties();
        let factory = InMemoryClientFactory::new();
        let registry = Arc::new(QueueRegistry::build(&properties, &factory).unwrap());
        provision(&properties, &registry).await.unwrap();

        let telemetry = Arc::new(RecordingTelemetryClient::new());
        let service = Arc::new(HmppsQueueService::new(
            registry,
            telemetry.clone(),
            JsonDecoder::default(),
        ));

        let router = server::router(
            Environment::Development {
                disable_auth: false,
            },
            service.clone(),
            admin_auth,
            Duration::from_secs(5),
        );

        Self {
            router,
            factory,
            telemetry,
            service,
        }
    }

    pub async fn send(
        &self,
        method: &str,
        route: &str,
        token: Option<&str>,
    ) -> Result<Response, Box<dyn std::error::Error>> {
        let mut builder = Request::builder().uri(route).method(method);
        if let Some(token) = token {
            builder = builder.header("Authorization", format!("Bearer {token}"));
        }
        let request = builder.body(Body::empty())?;

        let response = self.router.clone().oneshot(request).await?;
        Ok(response)
    }

    pub async fn admin_put(&self, route: &str) -> Response {
        self.send("PUT", route, Some(ADMIN_TOKEN)).await.unwrap()
    }

    pub async fn admin_get(&self, route: &str) -> Response {
        self.send("GET", route, Some(ADMIN_TOKEN)).await.unwrap()
    }
}

/// Parse response body to JSON
pub async fn parse_response_body(response: Response) -> serde_json::Value {
    let body = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&body).unwrap()
}
