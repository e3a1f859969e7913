use std::sync::Arc;

use anyhow::Context;
use datadog_tracing::axum::shutdown_signal;
use hmpps_sqs::client::AwsClientFactory;
use hmpps_sqs::provisioning::provision;
use hmpps_sqs::telemetry::MetricsTelemetryClient;
use hmpps_sqs::{HmppsQueueService, HmppsSqsProperties, JsonDecoder, Provider, QueueRegistry};
use metrics_exporter_dogstatsd::DogStatsDBuilder;
use queue_admin::{middleware::AdminAuth, server, sweeper::DlqRetrySweeper, types::Environment};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let environment = Environment::from_env();

    // Configure logging format based on environment
    // Use JSON format for staging/production (Datadog), regular format for development
    match environment {
        Environment::Production | Environment::Staging => {
            fmt()
                .json()
                .with_env_filter(EnvFilter::from_default_env())
                .init();
        }
        Environment::Development { .. } => {
            fmt().with_env_filter(EnvFilter::from_default_env()).init();
        }
    }

    if let Ok(dd_agent_host) = std::env::var("DD_AGENT_HOST") {
        DogStatsDBuilder::default()
            .with_remote_address(format!("{dd_agent_host}:8125"))
            .context("Invalid DogStatsD address")?
            .install()
            .context("Failed to install DogStatsD recorder")?;
        info!("✅ Initialized DogStatsD metrics");
    }

    let admin_auth = AdminAuth::from_environment(&environment);
    if !admin_auth.is_configured() {
        anyhow::bail!("QUEUE_ADMIN_TOKEN must be set unless auth is disabled in development");
    }

    let config_path = environment.config_path();
    let properties = HmppsSqsProperties::from_file(&config_path)
        .with_context(|| format!("Invalid queue configuration {}", config_path.display()))?;

    let factory = AwsClientFactory::from_properties(&properties).await;
    let registry = Arc::new(QueueRegistry::build(&properties, &factory)?);

    if properties.provider == Provider::Localstack {
        provision(&properties, &registry)
            .await
            .context("Failed to provision LocalStack resources")?;
        info!("✅ Provisioned LocalStack resources");
    }

    let service = Arc::new(
        HmppsQueueService::new(
            registry,
            Arc::new(MetricsTelemetryClient),
            JsonDecoder::default(),
        )
        .with_drain_deadline(environment.drain_deadline()),
    );

    // Single shutdown token for everything
    let shutdown_token = CancellationToken::new();
    let signal_token = shutdown_token.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Shutting down Queue Admin...");
        signal_token.cancel();
    });

    let sweeper_handle = environment.dlq_retry_interval().map(|interval| {
        tokio::spawn(DlqRetrySweeper::new(service.clone(), interval, shutdown_token.clone()).start())
    });

    let server_result = server::start(environment, service, admin_auth, shutdown_token).await;

    if let Some(handle) = sweeper_handle {
        handle.await.ok();
    }

    info!("✅ Queue Admin shutdown complete");

    server_result
}
