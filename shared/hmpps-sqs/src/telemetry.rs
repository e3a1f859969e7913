use std::collections::HashMap;

use metrics::counter;
use tracing::info;

/// Name of the event emitted after a DLQ retry
pub const RETRY_DLQ_EVENT: &str = "RetryDLQ";

/// Name of the event emitted after a purge
pub const PURGE_QUEUE_EVENT: &str = "PurgeQueue";

/// Sink for named operational events
pub trait TelemetryClient: Send + Sync {
    fn track_event(&self, name: &str, properties: &HashMap<String, String>);
}

/// Emits telemetry as a structured log line plus a counter
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsTelemetryClient;

impl TelemetryClient for MetricsTelemetryClient {
    fn track_event(&self, name: &str, properties: &HashMap<String, String>) {
        info!(target: "telemetry", event = name, ?properties, "Telemetry event");
        counter!("hmpps_sqs.telemetry_events", "event" => name.to_string()).increment(1);
    }
}
