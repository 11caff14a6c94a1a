//! Common test utilities and fixtures.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use opentelemetry_proto::tonic::common::v1::{any_value::Value, AnyValue, KeyValue};
use opentelemetry_proto::tonic::resource::v1::Resource;
use opentelemetry_proto::tonic::trace::v1::{ResourceSpans, ScopeSpans, Span};
use otlp_receiver::consumer::Consumer;
use otlp_receiver::core::{Logs, Metrics, Payload, Result, Traces};
use otlp_receiver::{Arguments, Receiver};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Consumer forwarding every batch to a channel.
pub struct ChannelConsumer {
    tx: mpsc::UnboundedSender<Payload>,
}

impl ChannelConsumer {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<Payload>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { tx }), rx)
    }
}

#[async_trait::async_trait]
impl Consumer for ChannelConsumer {
    async fn consume_traces(&self, _ctx: &CancellationToken, batch: &Traces) -> Result<()> {
        let _ = self.tx.send(Payload::Traces(batch.clone()));
        Ok(())
    }

    async fn consume_metrics(&self, _ctx: &CancellationToken, batch: &Metrics) -> Result<()> {
        let _ = self.tx.send(Payload::Metrics(batch.clone()));
        Ok(())
    }

    async fn consume_logs(&self, _ctx: &CancellationToken, batch: &Logs) -> Result<()> {
        let _ = self.tx.send(Payload::Logs(batch.clone()));
        Ok(())
    }
}

/// An address nothing is listening on right now.
pub fn free_addr() -> SocketAddr {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap()
}

/// A trace export holding a single span from `service`.
pub fn single_span(service: &str, name: &str) -> Traces {
    Traces {
        resource_spans: vec![ResourceSpans {
            resource: Some(Resource {
                attributes: vec![KeyValue {
                    key: "service.name".to_string(),
                    value: Some(AnyValue {
                        value: Some(Value::StringValue(service.to_string())),
                    }),
                }],
                ..Default::default()
            }),
            scope_spans: vec![ScopeSpans {
                spans: vec![Span {
                    trace_id: vec![1; 16],
                    span_id: vec![2; 8],
                    name: name.to_string(),
                    start_time_unix_nano: 1_000_000_000,
                    end_time_unix_nano: 2_000_000_000,
                    ..Default::default()
                }],
                ..Default::default()
            }],
            ..Default::default()
        }],
    }
}

/// Running receiver plus the handles needed to stop it.
pub struct Harness {
    pub receiver: Arc<Receiver>,
    pub ctx: CancellationToken,
    pub task: JoinHandle<Result<()>>,
}

impl Harness {
    /// Start `args` and wait until the receiver is running.
    pub async fn start(args: Arguments) -> Self {
        let receiver = Arc::new(Receiver::new());
        let ctx = CancellationToken::new();
        let task = {
            let receiver = Arc::clone(&receiver);
            let ctx = ctx.clone();
            tokio::spawn(async move { receiver.run(ctx, args).await })
        };
        receiver
            .wait_running(Duration::from_secs(1))
            .await
            .expect("receiver starts");
        Self {
            receiver,
            ctx,
            task,
        }
    }

    /// Cancel the run and check it ended cleanly.
    pub async fn stop(self) {
        self.ctx.cancel();
        tokio::time::timeout(Duration::from_secs(5), self.task)
            .await
            .expect("receiver stops")
            .unwrap()
            .unwrap();
    }
}

/// Wait for the next payload, failing after one second.
pub async fn next_payload(rx: &mut mpsc::UnboundedReceiver<Payload>) -> Payload {
    tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("payload delivered in time")
        .expect("consumer channel open")
}
