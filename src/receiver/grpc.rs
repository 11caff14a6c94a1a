//! OTLP/gRPC adapter exposing the trace, metrics and logs export services.

use std::sync::Arc;

use opentelemetry_proto::tonic::collector::logs::v1::logs_service_server::{
    LogsService, LogsServiceServer,
};
use opentelemetry_proto::tonic::collector::logs::v1::ExportLogsServiceResponse;
use opentelemetry_proto::tonic::collector::metrics::v1::metrics_service_server::{
    MetricsService, MetricsServiceServer,
};
use opentelemetry_proto::tonic::collector::metrics::v1::ExportMetricsServiceResponse;
use opentelemetry_proto::tonic::collector::trace::v1::trace_service_server::{
    TraceService, TraceServiceServer,
};
use opentelemetry_proto::tonic::collector::trace::v1::ExportTraceServiceResponse;
use tokio_util::sync::CancellationToken;
use tonic::codec::CompressionEncoding;
use tonic::transport::Server;
use tonic::{Request, Response, Status};

use super::listener::Listener;
use super::Dispatcher;
use crate::core::config::GrpcServerConfig;
use crate::core::{Logs, Metrics, Payload, Protocol, ReceiverError, Result, Traces};

/// Serve the three export services on `listener` until `ctx` is cancelled.
pub async fn serve(
    settings: GrpcServerConfig,
    listener: Listener,
    dispatcher: Arc<Dispatcher>,
    ctx: CancellationToken,
) -> Result<()> {
    let svc = CollectorService {
        dispatcher,
        ctx: ctx.clone(),
    };
    let max_recv = settings.max_recv_msg_size;
    let server_params = &settings.keepalive.server_parameters;

    let mut builder = Server::builder()
        .http2_keepalive_interval(server_params.time)
        .http2_keepalive_timeout(server_params.timeout);
    if settings.max_concurrent_streams > 0 {
        builder = builder.max_concurrent_streams(settings.max_concurrent_streams);
    }
    // The read buffer bounds how much a stream may send before we read it.
    if settings.read_buffer_size > 0 {
        builder = builder.initial_stream_window_size(u32::try_from(settings.read_buffer_size).ok());
    }

    let router = builder
        .add_service(
            TraceServiceServer::new(svc.clone())
                .accept_compressed(CompressionEncoding::Gzip)
                .max_decoding_message_size(max_recv),
        )
        .add_service(
            MetricsServiceServer::new(svc.clone())
                .accept_compressed(CompressionEncoding::Gzip)
                .max_decoding_message_size(max_recv),
        )
        .add_service(
            LogsServiceServer::new(svc)
                .accept_compressed(CompressionEncoding::Gzip)
                .max_decoding_message_size(max_recv),
        );

    router
        .serve_with_incoming_shutdown(listener.into_stream(), ctx.cancelled_owned())
        .await
        .map_err(|e| ReceiverError::protocol(format!("gRPC server failed: {}", e)))
}

#[derive(Clone)]
struct CollectorService {
    dispatcher: Arc<Dispatcher>,
    ctx: CancellationToken,
}

impl CollectorService {
    async fn deliver(
        &self,
        payload: Payload,
        peer: Option<std::net::SocketAddr>,
    ) -> std::result::Result<(), Status> {
        let signal = payload.signal();

        // Tonic drops the handler future when the client goes away.
        let ctx = self.ctx.child_token();
        let _guard = ctx.clone().drop_guard();

        self.dispatcher
            .dispatch(&ctx, Protocol::Grpc, payload, peer)
            .await
            .map_err(|e| {
                tracing::debug!("gRPC {} export failed: {}", signal, e);
                status_for(&e)
            })
    }
}

/// Map a delivery error to a gRPC status. Consumer details are not exposed.
fn status_for(err: &ReceiverError) -> Status {
    match err {
        ReceiverError::Cancelled => Status::cancelled("request cancelled"),
        ReceiverError::DeadlineExceeded => Status::deadline_exceeded("deadline exceeded"),
        _ => Status::internal("failed to process request"),
    }
}

#[tonic::async_trait]
impl TraceService for CollectorService {
    async fn export(
        &self,
        request: Request<Traces>,
    ) -> std::result::Result<Response<ExportTraceServiceResponse>, Status> {
        let peer = request.remote_addr();
        self.deliver(Payload::Traces(request.into_inner()), peer).await?;
        Ok(Response::new(ExportTraceServiceResponse {
            partial_success: None,
        }))
    }
}

#[tonic::async_trait]
impl MetricsService for CollectorService {
    async fn export(
        &self,
        request: Request<Metrics>,
    ) -> std::result::Result<Response<ExportMetricsServiceResponse>, Status> {
        let peer = request.remote_addr();
        self.deliver(Payload::Metrics(request.into_inner()), peer).await?;
        Ok(Response::new(ExportMetricsServiceResponse {
            partial_success: None,
        }))
    }
}

#[tonic::async_trait]
impl LogsService for CollectorService {
    async fn export(
        &self,
        request: Request<Logs>,
    ) -> std::result::Result<Response<ExportLogsServiceResponse>, Status> {
        let peer = request.remote_addr();
        self.deliver(Payload::Logs(request.into_inner()), peer).await?;
        Ok(Response::new(ExportLogsServiceResponse {
            partial_success: None,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consumer::{Consumer, ConsumerArguments, FanOut};
    use crate::receiver::telemetry::SelfTelemetry;
    use opentelemetry_proto::tonic::logs::v1::{LogRecord, ResourceLogs, ScopeLogs};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct CountingConsumer {
        logs: AtomicUsize,
        fail: bool,
        block: bool,
    }

    #[async_trait::async_trait]
    impl Consumer for CountingConsumer {
        async fn consume_traces(&self, _ctx: &CancellationToken, _batch: &Traces) -> Result<()> {
            Ok(())
        }

        async fn consume_metrics(&self, _ctx: &CancellationToken, _batch: &Metrics) -> Result<()> {
            Ok(())
        }

        async fn consume_logs(&self, _ctx: &CancellationToken, batch: &Logs) -> Result<()> {
            if self.block {
                futures::future::pending::<()>().await;
            }
            if self.fail {
                return Err(ReceiverError::consumer("queue full"));
            }
            self.logs
                .fetch_add(crate::core::types::log_record_count(batch), Ordering::SeqCst);
            Ok(())
        }
    }

    fn service(consumer: Arc<CountingConsumer>, ctx: CancellationToken) -> CollectorService {
        let dispatcher = Arc::new(Dispatcher::new(
            FanOut::new(ConsumerArguments {
                logs: vec![consumer as Arc<dyn Consumer>],
                ..Default::default()
            }),
            SelfTelemetry::default(),
        ));
        CollectorService { dispatcher, ctx }
    }

    fn logs_request() -> Request<Logs> {
        Request::new(Logs {
            resource_logs: vec![ResourceLogs {
                scope_logs: vec![ScopeLogs {
                    log_records: vec![LogRecord::default(); 2],
                    ..Default::default()
                }],
                ..Default::default()
            }],
        })
    }

    #[tokio::test]
    async fn test_export_delivers_to_consumers() {
        let consumer = Arc::new(CountingConsumer::default());
        let svc = service(Arc::clone(&consumer), CancellationToken::new());

        let response = LogsService::export(&svc, logs_request()).await.unwrap();
        assert_eq!(response.into_inner().partial_success, None);
        assert_eq!(consumer.logs.load(Ordering::SeqCst), 2);

        // No metrics consumers registered: silently accepted.
        MetricsService::export(&svc, Request::new(Metrics::default()))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_consumer_error_is_internal() {
        let consumer = Arc::new(CountingConsumer {
            fail: true,
            ..Default::default()
        });
        let svc = service(consumer, CancellationToken::new());

        let status = LogsService::export(&svc, logs_request()).await.unwrap_err();
        assert_eq!(status.code(), tonic::Code::Internal);
        assert!(!status.message().contains("queue full"));
    }

    #[tokio::test]
    async fn test_shutdown_cancels_in_flight_export() {
        let consumer = Arc::new(CountingConsumer {
            block: true,
            ..Default::default()
        });
        let ctx = CancellationToken::new();
        let svc = service(consumer, ctx.clone());

        let call = tokio::spawn(async move { LogsService::export(&svc, logs_request()).await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        ctx.cancel();

        let status = tokio::time::timeout(Duration::from_secs(1), call)
            .await
            .expect("export observes cancellation")
            .unwrap()
            .unwrap_err();
        assert_eq!(status.code(), tonic::Code::Cancelled);
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(status_for(&ReceiverError::Cancelled).code(), tonic::Code::Cancelled);
        assert_eq!(
            status_for(&ReceiverError::DeadlineExceeded).code(),
            tonic::Code::DeadlineExceeded
        );
        assert_eq!(
            status_for(&ReceiverError::consumer("boom")).code(),
            tonic::Code::Internal
        );
    }
}
