use std::sync::Arc;
use std::time::Duration;

use hmpps_sqs::HmppsQueueService;
use metrics::counter;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Periodically retries every DLQ, standing in for an external cron job
pub struct DlqRetrySweeper {
    service: Arc<HmppsQueueService>,
    interval: Duration,
    shutdown: CancellationToken,
}

impl DlqRetrySweeper {
    #[must_use]
    pub const fn new(
        service: Arc<HmppsQueueService>,
        interval: Duration,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            service,
            interval,
            shutdown,
        }
    }

    pub async fn start(self) {
        info!(interval_secs = self.interval.as_secs(), "Starting DLQ retry sweeper");

        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.sweep_once().await;
                }
                () = self.shutdown.cancelled() => {
                    info!("DLQ retry sweeper shutting down");
                    break;
                }
            }
        }
    }

    /// Retries every DLQ once and returns the number of messages moved
    pub async fn sweep_once(&self) -> usize {
        let results = self.service.retry_all_dlqs().await;
        let moved: usize = results.iter().map(|result| result.messages.len()).sum();

        counter!("queue_admin.dlq_sweeps").increment(1);
        info!(queues = results.len(), moved, "Swept DLQs");
        moved
    }
}

#[cfg(test)]
mod tests {
    use hmpps_sqs::config::QueueProperties;
    use hmpps_sqs::provisioning::provision;
    use hmpps_sqs::testing::{InMemoryClientFactory, RecordingTelemetryClient};
    use hmpps_sqs::{HmppsSqsProperties, JsonDecoder, Provider, QueueRegistry};
    use pretty_assertions::assert_eq;

    use super::*;

    async fn sweeper(shutdown: CancellationToken) -> (DlqRetrySweeper, InMemoryClientFactory) {
        let mut properties = HmppsSqsProperties {
            provider: Provider::Localstack,
            ..HmppsSqsProperties::default()
        };
        properties.queues.insert(
            "events".to_string(),
            QueueProperties::new("events-queue").with_dlq("events-dlq"),
        );

        let factory = InMemoryClientFactory::new();
        let registry = Arc::new(QueueRegistry::build(&properties, &factory).unwrap());
        provision(&properties, &registry).await.unwrap();
        let service = Arc::new(HmppsQueueService::new(
            registry,
            Arc::new(RecordingTelemetryClient::new()),
            JsonDecoder::default(),
        ));

        (
            DlqRetrySweeper::new(service, Duration::from_secs(3600), shutdown),
            factory,
        )
    }

    #[tokio::test]
    async fn test_sweep_moves_dlq_messages() {
        let (sweeper, factory) = sweeper(CancellationToken::new()).await;
        factory.queues.seed_body("events-dlq", "{}");
        factory.queues.seed_body("events-dlq", "{}");

        assert_eq!(sweeper.sweep_once().await, 2);
        assert_eq!(factory.queues.visible("events-queue").len(), 2);
        assert_eq!(sweeper.sweep_once().await, 0);
    }

    #[tokio::test]
    async fn test_start_stops_on_shutdown() {
        let shutdown = CancellationToken::new();
        let (sweeper, factory) = sweeper(shutdown.clone()).await;
        factory.queues.seed_body("events-dlq", "{}");

        shutdown.cancel();
        sweeper.start().await;

        // the first tick is one interval away, so nothing was swept
        assert_eq!(factory.queues.visible("events-dlq").len(), 1);
    }
}
