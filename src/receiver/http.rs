//! OTLP/HTTP adapter.
//!
//! Serves POST requests on the configured traces, metrics and logs paths.
//! Bodies may be protobuf (`application/x-protobuf`, the default) or JSON
//! (`application/json`) and may be compressed with any of the configured
//! `Content-Encoding` values.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{ConnectInfo, DefaultBodyLimit, State},
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Router,
};
use bytes::Bytes;
use prost::Message;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};

use super::compression::{decompress, DecompressError};
use super::Dispatcher;
use crate::core::config::{CompressionAlgorithm, CorsArguments, HttpServerConfig};
use crate::core::{Logs, Metrics, Payload, Protocol, ReceiverError, Signal, Traces};

const PROTOBUF: &str = "application/x-protobuf";
const JSON: &str = "application/json";

/// Request and response body format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ContentType {
    Protobuf,
    Json,
}

impl ContentType {
    /// Absent `Content-Type` means protobuf.
    fn from_headers(headers: &HeaderMap) -> Result<Self, HttpError> {
        let Some(value) = headers.get(header::CONTENT_TYPE) else {
            return Ok(ContentType::Protobuf);
        };
        let value = value
            .to_str()
            .map_err(|_| HttpError::UnsupportedMediaType("<non-ascii>".to_string()))?;
        let mime = value.split(';').next().unwrap_or_default().trim();

        match mime.to_ascii_lowercase().as_str() {
            "application/x-protobuf" | "application/protobuf" => Ok(ContentType::Protobuf),
            "application/json" => Ok(ContentType::Json),
            _ => Err(HttpError::UnsupportedMediaType(mime.to_string())),
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            ContentType::Protobuf => PROTOBUF,
            ContentType::Json => JSON,
        }
    }
}

/// Shared state of the HTTP adapter.
#[derive(Clone)]
struct HttpState {
    settings: Arc<HttpServerConfig>,
    dispatcher: Arc<Dispatcher>,
    ctx: CancellationToken,
}

/// Build the router for `settings`. Per-request tokens are children of `ctx`.
pub fn router(
    settings: HttpServerConfig,
    dispatcher: Arc<Dispatcher>,
    ctx: CancellationToken,
) -> Router {
    let cors = cors_layer(&settings.cors);
    let body_limit = settings.max_request_body_size;
    let traces_path = settings.traces_url_path.clone();
    let metrics_path = settings.metrics_url_path.clone();
    let logs_path = settings.logs_url_path.clone();

    let state = HttpState {
        settings: Arc::new(settings),
        dispatcher,
        ctx,
    };

    let router = Router::new()
        .route(&traces_path, post(handle_traces))
        .route(&metrics_path, post(handle_metrics))
        .route(&logs_path, post(handle_logs))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    match cors {
        Some(cors) => router.layer(cors),
        None => router,
    }
}

fn cors_layer(cors: &CorsArguments) -> Option<CorsLayer> {
    if cors.is_empty() {
        return None;
    }

    let origin = if cors.allowed_origins.iter().any(|o| o == "*") {
        AllowOrigin::any()
    } else {
        let origins: Vec<HeaderValue> = cors
            .allowed_origins
            .iter()
            .filter_map(|o| match HeaderValue::from_str(o) {
                Ok(v) => Some(v),
                Err(_) => {
                    tracing::warn!("Ignoring invalid CORS origin {:?}", o);
                    None
                },
            })
            .collect();
        AllowOrigin::list(origins)
    };

    let mut layer = CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::POST, Method::OPTIONS]);

    if cors.allowed_headers.iter().any(|h| h == "*") {
        layer = layer.allow_headers(Any);
    } else {
        let mut headers = vec![
            header::CONTENT_TYPE,
            header::CONTENT_ENCODING,
            header::ACCEPT,
        ];
        headers.extend(
            cors.allowed_headers
                .iter()
                .filter_map(|h| h.parse::<header::HeaderName>().ok()),
        );
        layer = layer.allow_headers(headers);
    }

    if let Some(max_age) = cors.max_age {
        layer = layer.max_age(max_age);
    }
    Some(layer)
}

async fn handle_traces(
    State(state): State<HttpState>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, HttpError> {
    handle::<Traces>(state, peer, &headers, &body, Payload::Traces).await
}

async fn handle_metrics(
    State(state): State<HttpState>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, HttpError> {
    handle::<Metrics>(state, peer, &headers, &body, Payload::Metrics).await
}

async fn handle_logs(
    State(state): State<HttpState>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, HttpError> {
    handle::<Logs>(state, peer, &headers, &body, Payload::Logs).await
}

async fn handle<T>(
    state: HttpState,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: &HeaderMap,
    body: &[u8],
    wrap: fn(T) -> Payload,
) -> Result<Response, HttpError>
where
    T: Message + DeserializeOwned + Default,
{
    let content_type = ContentType::from_headers(headers)?;
    let encoding = content_encoding(headers, &state.settings)?;
    let body = decompress(encoding, body, state.settings.max_request_body_size)?;
    let payload = wrap(decode::<T>(content_type, &body)?);
    let signal = payload.signal();

    tracing::debug!(
        "Received HTTP {} export request, {} bytes ({})",
        signal,
        body.len(),
        content_type.as_str()
    );

    // Dropping the handler future (client disconnect) cancels the request.
    let ctx = state.ctx.child_token();
    let _guard = ctx.clone().drop_guard();

    state
        .dispatcher
        .dispatch(&ctx, Protocol::Http, payload, peer.map(|ConnectInfo(addr)| addr))
        .await
        .map_err(|e| HttpError::from_dispatch(signal, e))?;

    Ok(success(content_type))
}

fn content_encoding(
    headers: &HeaderMap,
    settings: &HttpServerConfig,
) -> Result<CompressionAlgorithm, HttpError> {
    let value = match headers.get(header::CONTENT_ENCODING) {
        Some(v) => v
            .to_str()
            .map_err(|_| HttpError::UnsupportedEncoding("<non-ascii>".to_string()))?
            .trim()
            .to_ascii_lowercase(),
        None => String::new(),
    };
    let value = if value == "identity" { String::new() } else { value };

    match value.parse::<CompressionAlgorithm>() {
        Ok(alg) if settings.accepts(alg) => Ok(alg),
        _ => Err(HttpError::UnsupportedEncoding(value)),
    }
}

fn decode<T>(content_type: ContentType, body: &[u8]) -> Result<T, HttpError>
where
    T: Message + DeserializeOwned + Default,
{
    match content_type {
        ContentType::Protobuf => T::decode(body)
            .map_err(|e| HttpError::BadRequest(format!("Failed to parse protobuf: {}", e))),
        ContentType::Json => {
            let parse_err = |e: serde_json::Error| {
                HttpError::BadRequest(format!("Failed to parse JSON: {}", e))
            };
            let mut value: serde_json::Value = serde_json::from_slice(body).map_err(parse_err)?;
            strip_nulls(&mut value);
            serde_json::from_value(value).map_err(parse_err)
        },
    }
}

/// Drop `null` object members. OTLP/JSON senders use `null` for unset
/// fields, which the generated types only accept as absent.
fn strip_nulls(value: &mut serde_json::Value) {
    match value {
        serde_json::Value::Object(members) => {
            members.retain(|_, v| !v.is_null());
            members.values_mut().for_each(strip_nulls);
        },
        serde_json::Value::Array(items) => items.iter_mut().for_each(strip_nulls),
        _ => {},
    }
}

/// An empty export response in the request's format.
fn success(content_type: ContentType) -> Response {
    let body = match content_type {
        // An export response with no partial success encodes to zero bytes.
        ContentType::Protobuf => Bytes::new(),
        ContentType::Json => Bytes::from_static(b"{}"),
    };
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, content_type.as_str())],
        body,
    )
        .into_response()
}

/// HTTP-specific error type.
#[derive(Debug)]
pub enum HttpError {
    /// Unknown `Content-Type`
    UnsupportedMediaType(String),
    /// `Content-Encoding` not in the configured list
    UnsupportedEncoding(String),
    /// Body could not be decompressed or decoded
    BadRequest(String),
    /// Decompressed body exceeds the configured limit
    PayloadTooLarge(usize),
    /// The request was cancelled before delivery finished
    Cancelled,
    /// A consumer failed
    Internal,
}

impl HttpError {
    fn from_dispatch(signal: Signal, err: ReceiverError) -> Self {
        if err.is_cancellation() {
            tracing::debug!("HTTP {} export cancelled: {}", signal, err);
            HttpError::Cancelled
        } else {
            tracing::error!("Failed to deliver HTTP {} export: {}", signal, err);
            HttpError::Internal
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            HttpError::UnsupportedMediaType(_) | HttpError::UnsupportedEncoding(_) => {
                StatusCode::UNSUPPORTED_MEDIA_TYPE
            },
            HttpError::BadRequest(_) => StatusCode::BAD_REQUEST,
            HttpError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            HttpError::Cancelled => StatusCode::REQUEST_TIMEOUT,
            HttpError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<DecompressError> for HttpError {
    fn from(err: DecompressError) -> Self {
        match err {
            DecompressError::TooLarge { limit } => HttpError::PayloadTooLarge(limit),
            corrupt @ DecompressError::Corrupt { .. } => HttpError::BadRequest(corrupt.to_string()),
        }
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_client_error() && status != StatusCode::REQUEST_TIMEOUT {
            tracing::debug!("Rejecting HTTP export request: {}", self);
        }
        (status, self.to_string()).into_response()
    }
}

impl std::fmt::Display for HttpError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HttpError::UnsupportedMediaType(t) => write!(f, "unsupported content type {:?}", t),
            HttpError::UnsupportedEncoding(e) => write!(f, "unsupported content encoding {:?}", e),
            HttpError::BadRequest(msg) => write!(f, "{}", msg),
            HttpError::PayloadTooLarge(limit) => {
                write!(f, "request body exceeds {} bytes", limit)
            },
            HttpError::Cancelled => write!(f, "request cancelled"),
            HttpError::Internal => write!(f, "failed to process request"),
        }
    }
}

impl std::error::Error for HttpError {}
