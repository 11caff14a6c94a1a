//! A consumer that logs a summary of every batch.

use std::collections::BTreeSet;

use opentelemetry_proto::tonic::common::v1::any_value::Value;
use opentelemetry_proto::tonic::resource::v1::Resource;
use tokio_util::sync::CancellationToken;

use super::Consumer;
use crate::core::types::{data_point_count, log_record_count, span_count};
use crate::core::{Logs, Metrics, Result, Traces};

/// Logs item counts and service names at info level.
#[derive(Debug, Clone, Default)]
pub struct LoggingConsumer {
    verbose: bool,
}

impl LoggingConsumer {
    /// Create a logging consumer. Verbose mode also logs every span name.
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }
}

fn service_names<'a>(resources: impl Iterator<Item = Option<&'a Resource>>) -> String {
    let names: BTreeSet<&str> = resources
        .flatten()
        .flat_map(|r| &r.attributes)
        .filter(|kv| kv.key == "service.name")
        .filter_map(|kv| match kv.value.as_ref().and_then(|v| v.value.as_ref()) {
            Some(Value::StringValue(s)) => Some(s.as_str()),
            _ => None,
        })
        .collect();

    if names.is_empty() {
        "unknown".to_string()
    } else {
        names.into_iter().collect::<Vec<_>>().join(",")
    }
}

#[async_trait::async_trait]
impl Consumer for LoggingConsumer {
    async fn consume_traces(&self, _ctx: &CancellationToken, batch: &Traces) -> Result<()> {
        let services = service_names(batch.resource_spans.iter().map(|rs| rs.resource.as_ref()));
        tracing::info!(
            spans = span_count(batch),
            services = %services,
            "Received traces"
        );

        if self.verbose {
            for span in batch
                .resource_spans
                .iter()
                .flat_map(|rs| &rs.scope_spans)
                .flat_map(|ss| &ss.spans)
            {
                tracing::info!("  span {} kind={}", span.name, span.kind);
            }
        }
        Ok(())
    }

    async fn consume_metrics(&self, _ctx: &CancellationToken, batch: &Metrics) -> Result<()> {
        let services =
            service_names(batch.resource_metrics.iter().map(|rm| rm.resource.as_ref()));
        tracing::info!(
            data_points = data_point_count(batch),
            services = %services,
            "Received metrics"
        );
        Ok(())
    }

    async fn consume_logs(&self, _ctx: &CancellationToken, batch: &Logs) -> Result<()> {
        let services = service_names(batch.resource_logs.iter().map(|rl| rl.resource.as_ref()));
        tracing::info!(
            log_records = log_record_count(batch),
            services = %services,
            "Received logs"
        );
        Ok(())
    }
}
