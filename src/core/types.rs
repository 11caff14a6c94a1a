//! Signal types and the decoded batches flowing through the receiver.

use std::fmt;

use opentelemetry_proto::tonic::collector::logs::v1::ExportLogsServiceRequest;
use opentelemetry_proto::tonic::collector::metrics::v1::ExportMetricsServiceRequest;
use opentelemetry_proto::tonic::collector::trace::v1::ExportTraceServiceRequest;
use opentelemetry_proto::tonic::metrics::v1::metric::Data;
use serde::{Deserialize, Serialize};

/// A decoded batch of traces.
pub type Traces = ExportTraceServiceRequest;
/// A decoded batch of metrics.
pub type Metrics = ExportMetricsServiceRequest;
/// A decoded batch of logs.
pub type Logs = ExportLogsServiceRequest;

/// Telemetry signal type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Signal {
    /// Spans grouped by resource and scope
    Traces,
    /// Metric data points
    Metrics,
    /// Log records
    Logs,
}

impl Signal {
    /// All signal types in a stable order.
    pub const ALL: [Signal; 3] = [Signal::Traces, Signal::Metrics, Signal::Logs];

    /// Returns the lowercase name of the signal
    pub fn as_str(&self) -> &'static str {
        match self {
            Signal::Traces => "traces",
            Signal::Metrics => "metrics",
            Signal::Logs => "logs",
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transport a batch arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    /// OTLP over gRPC
    Grpc,
    /// OTLP over HTTP
    Http,
}

impl Protocol {
    /// Returns the lowercase name of the protocol
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Grpc => "grpc",
            Protocol::Http => "http",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A decoded batch tagged with its signal type.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Trace export request
    Traces(Traces),
    /// Metrics export request
    Metrics(Metrics),
    /// Logs export request
    Logs(Logs),
}

impl Payload {
    /// Returns the signal type of this batch
    pub fn signal(&self) -> Signal {
        match self {
            Payload::Traces(_) => Signal::Traces,
            Payload::Metrics(_) => Signal::Metrics,
            Payload::Logs(_) => Signal::Logs,
        }
    }

    /// Counts the items in the batch: spans, data points or log records.
    pub fn item_count(&self) -> usize {
        match self {
            Payload::Traces(req) => span_count(req),
            Payload::Metrics(req) => data_point_count(req),
            Payload::Logs(req) => log_record_count(req),
        }
    }
}

/// Number of spans in a trace batch.
pub fn span_count(req: &Traces) -> usize {
    req.resource_spans
        .iter()
        .flat_map(|rs| &rs.scope_spans)
        .map(|ss| ss.spans.len())
        .sum()
}

/// Number of data points in a metrics batch, across all metric kinds.
pub fn data_point_count(req: &Metrics) -> usize {
    req.resource_metrics
        .iter()
        .flat_map(|rm| &rm.scope_metrics)
        .flat_map(|sm| &sm.metrics)
        .map(|metric| match &metric.data {
            Some(Data::Gauge(g)) => g.data_points.len(),
            Some(Data::Sum(s)) => s.data_points.len(),
            Some(Data::Histogram(h)) => h.data_points.len(),
            Some(Data::ExponentialHistogram(h)) => h.data_points.len(),
            Some(Data::Summary(s)) => s.data_points.len(),
            None => 0,
        })
        .sum()
}

/// Number of log records in a logs batch.
pub fn log_record_count(req: &Logs) -> usize {
    req.resource_logs
        .iter()
        .flat_map(|rl| &rl.scope_logs)
        .map(|sl| sl.log_records.len())
        .sum()
}
