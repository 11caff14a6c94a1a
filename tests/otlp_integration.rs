//! OTLP protocol integration tests.
//!
//! Exercise the receiver end to end over real sockets:
//! - HTTP protobuf and JSON exports
//! - gRPC exports with and without compression
//! - Reconfiguration while running

use std::sync::Arc;
use std::time::Duration;

use opentelemetry_proto::tonic::collector::logs::v1::logs_service_client::LogsServiceClient;
use opentelemetry_proto::tonic::collector::trace::v1::trace_service_client::TraceServiceClient;
use opentelemetry_proto::tonic::logs::v1::{LogRecord, ResourceLogs, ScopeLogs};
use otlp_receiver::consumer::Consumer;
use otlp_receiver::core::retry::{retry_with_config, BackoffConfig};
use otlp_receiver::core::types::{log_record_count, span_count};
use otlp_receiver::core::{ArgumentsBuilder, HttpArguments, Logs, Payload, ReceiverError, Traces};
use otlp_receiver::Receiver;
use prost::Message;
use tokio_util::sync::CancellationToken;
use tonic::codec::CompressionEncoding;

mod common;
use common::*;

fn logs_batch(records: usize) -> Logs {
    Logs {
        resource_logs: vec![ResourceLogs {
            scope_logs: vec![ScopeLogs {
                log_records: vec![
                    LogRecord {
                        severity_text: "INFO".to_string(),
                        ..Default::default()
                    };
                    records
                ],
                ..Default::default()
            }],
            ..Default::default()
        }],
    }
}

/// Receiver started before its listener exists: the sender retries with
/// backoff until the POST goes through.
#[tokio::test]
async fn test_http_single_span_end_to_end() {
    let addr = free_addr();
    let (consumer, mut rx) = ChannelConsumer::new();
    let args = ArgumentsBuilder::new()
        .http_endpoint(addr.to_string())
        .traces_consumer(consumer)
        .build()
        .unwrap();

    let receiver = Arc::new(Receiver::new());
    let ctx = CancellationToken::new();
    let task = {
        let receiver = Arc::clone(&receiver);
        let ctx = ctx.clone();
        tokio::spawn(async move { receiver.run(ctx, args).await })
    };

    let client = reqwest::Client::new();
    let url = format!("http://{}/v1/traces", addr);
    let body = single_span("checkout", "GET /cart").encode_to_vec();
    let backoff = BackoffConfig {
        min_backoff: Duration::from_millis(10),
        max_backoff: Duration::from_millis(100),
        max_retries: 20,
    };

    let status = retry_with_config(ctx.clone(), backoff, || {
        let request = client
            .post(&url)
            .header("content-type", "application/x-protobuf")
            .body(body.clone());
        async move {
            request
                .send()
                .await
                .map(|response| response.status())
                .map_err(|e| ReceiverError::network(e.to_string()))
        }
    })
    .await
    .unwrap();
    assert_eq!(status, reqwest::StatusCode::OK);

    match next_payload(&mut rx).await {
        Payload::Traces(batch) => assert_eq!(span_count(&batch), 1),
        other => panic!("unexpected payload for {}", other.signal()),
    }
    assert!(rx.try_recv().is_err(), "exactly one batch delivered");
    assert_eq!(receiver.telemetry().snapshot().traces.accepted, 1);

    ctx.cancel();
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_http_json_logs() {
    let (consumer, mut rx) = ChannelConsumer::new();
    let args = ArgumentsBuilder::new()
        .http_endpoint("127.0.0.1:0")
        .logs_consumer(consumer)
        .build()
        .unwrap();
    let harness = Harness::start(args).await;
    let addr = harness.receiver.http_addr().unwrap();

    let response = reqwest::Client::new()
        .post(format!("http://{}/v1/logs", addr))
        .header("content-type", "application/json")
        .body(serde_json::to_vec(&logs_batch(3)).unwrap())
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    assert_eq!(
        response.headers()["content-type"].to_str().unwrap(),
        "application/json"
    );

    match next_payload(&mut rx).await {
        Payload::Logs(batch) => assert_eq!(log_record_count(&batch), 3),
        other => panic!("unexpected payload for {}", other.signal()),
    }

    harness.stop().await;
}

#[tokio::test]
async fn test_http_rejects_unknown_path_and_media_type() {
    let args = ArgumentsBuilder::new()
        .http_endpoint("127.0.0.1:0")
        .build()
        .unwrap();
    let harness = Harness::start(args).await;
    let addr = harness.receiver.http_addr().unwrap();
    let client = reqwest::Client::new();

    let response = client
        .post(format!("http://{}/v1/spans", addr))
        .body(Vec::new())
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::NOT_FOUND);

    let response = client
        .post(format!("http://{}/v1/traces", addr))
        .header("content-type", "text/plain")
        .body("hello")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::UNSUPPORTED_MEDIA_TYPE);

    harness.stop().await;
}

#[tokio::test]
async fn test_grpc_export_end_to_end() {
    let (consumer, mut rx) = ChannelConsumer::new();
    let args = ArgumentsBuilder::new()
        .grpc_endpoint("127.0.0.1:0")
        .consumer(consumer)
        .build()
        .unwrap();
    let harness = Harness::start(args).await;
    let addr = harness.receiver.grpc_addr().unwrap();

    let mut traces = TraceServiceClient::connect(format!("http://{}", addr))
        .await
        .unwrap();
    let response = traces
        .export(single_span("payments", "charge"))
        .await
        .unwrap();
    assert_eq!(response.into_inner().partial_success, None);

    match next_payload(&mut rx).await {
        Payload::Traces(batch) => {
            assert_eq!(span_count(&batch), 1);
            assert_eq!(batch.resource_spans[0].scope_spans[0].spans[0].name, "charge");
        },
        other => panic!("unexpected payload for {}", other.signal()),
    }

    let mut logs = LogsServiceClient::connect(format!("http://{}", addr))
        .await
        .unwrap()
        .send_compressed(CompressionEncoding::Gzip);
    logs.export(logs_batch(5)).await.unwrap();

    match next_payload(&mut rx).await {
        Payload::Logs(batch) => assert_eq!(log_record_count(&batch), 5),
        other => panic!("unexpected payload for {}", other.signal()),
    }

    let snapshot = harness.receiver.telemetry().snapshot();
    assert_eq!(snapshot.traces.accepted, 1);
    assert_eq!(snapshot.logs.accepted, 5);

    harness.stop().await;
}

#[tokio::test]
async fn test_grpc_consumer_failure_is_internal() {
    struct Failing;

    #[async_trait::async_trait]
    impl Consumer for Failing {
        async fn consume_traces(
            &self,
            _ctx: &CancellationToken,
            _batch: &Traces,
        ) -> otlp_receiver::Result<()> {
            Err(ReceiverError::consumer("disk full on /var/spool"))
        }

        async fn consume_metrics(
            &self,
            _ctx: &CancellationToken,
            _batch: &otlp_receiver::core::Metrics,
        ) -> otlp_receiver::Result<()> {
            Ok(())
        }

        async fn consume_logs(
            &self,
            _ctx: &CancellationToken,
            _batch: &Logs,
        ) -> otlp_receiver::Result<()> {
            Ok(())
        }
    }

    let args = ArgumentsBuilder::new()
        .grpc_endpoint("127.0.0.1:0")
        .traces_consumer(Arc::new(Failing))
        .build()
        .unwrap();
    let harness = Harness::start(args).await;
    let addr = harness.receiver.grpc_addr().unwrap();

    let mut client = TraceServiceClient::connect(format!("http://{}", addr))
        .await
        .unwrap();
    let status = client
        .export(single_span("payments", "charge"))
        .await
        .unwrap_err();
    assert_eq!(status.code(), tonic::Code::Internal);
    assert!(!status.message().contains("/var/spool"));
    assert_eq!(harness.receiver.telemetry().snapshot().traces.refused, 1);

    harness.stop().await;
}

#[tokio::test]
async fn test_update_moves_http_route() {
    let (consumer, mut rx) = ChannelConsumer::new();
    let consumer: Arc<dyn Consumer> = consumer;
    let args = ArgumentsBuilder::new()
        .grpc_endpoint("127.0.0.1:0")
        .http_endpoint("127.0.0.1:0")
        .traces_consumer(Arc::clone(&consumer))
        .build()
        .unwrap();
    let harness = Harness::start(args).await;
    let grpc_addr = harness.receiver.grpc_addr();

    let args = ArgumentsBuilder::new()
        .grpc_endpoint("127.0.0.1:0")
        .http(HttpArguments {
            endpoint: "127.0.0.1:0".to_string(),
            traces_url_path: "/otlp/traces".to_string(),
            ..Default::default()
        })
        .traces_consumer(consumer)
        .build()
        .unwrap();
    harness.receiver.update(args).await.unwrap();

    // gRPC settings did not change, so its listener was kept.
    assert_eq!(harness.receiver.grpc_addr(), grpc_addr);
    let http_addr = harness.receiver.http_addr().unwrap();
    let client = reqwest::Client::new();
    let body = single_span("cart", "add").encode_to_vec();

    let response = client
        .post(format!("http://{}/v1/traces", http_addr))
        .body(body.clone())
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::NOT_FOUND);

    let response = client
        .post(format!("http://{}/otlp/traces", http_addr))
        .body(body)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    assert!(matches!(next_payload(&mut rx).await, Payload::Traces(_)));

    harness.stop().await;
}
