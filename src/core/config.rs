//! Receiver configuration.
//!
//! User-facing [`Arguments`] are loaded from YAML (or built with
//! [`ArgumentsBuilder`]) and converted into a validated [`ReceiverConfig`]
//! by [`Arguments::convert`]. Protocol blocks that are not configured stay
//! `None` after conversion; configured blocks get the defaults listed in
//! [`defaults`].

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::consumer::{Consumer, ConsumerArguments};
use crate::core::{ReceiverError, Result};

/// Default values applied during conversion.
pub mod defaults {
    /// Default gRPC listen address
    pub const GRPC_ENDPOINT: &str = "0.0.0.0:4317";
    /// Default gRPC transport
    pub const GRPC_TRANSPORT: &str = "tcp";
    /// Default gRPC read buffer size in bytes
    pub const GRPC_READ_BUFFER_SIZE: i64 = 512 * 1024;
    /// Default gRPC write buffer size in bytes (0 keeps the transport default)
    pub const GRPC_WRITE_BUFFER_SIZE: i64 = 0;
    /// Default maximum decoded gRPC message size in bytes
    pub const GRPC_MAX_RECV_MSG_SIZE: i64 = 4 * 1024 * 1024;
    /// Default HTTP listen address
    pub const HTTP_ENDPOINT: &str = "0.0.0.0:4318";
    /// Default maximum decompressed HTTP body size in bytes
    pub const HTTP_MAX_REQUEST_BODY_SIZE: i64 = 20 * 1024 * 1024;
    /// Default traces path
    pub const TRACES_URL_PATH: &str = "/v1/traces";
    /// Default metrics path
    pub const METRICS_URL_PATH: &str = "/v1/metrics";
    /// Default logs path
    pub const LOGS_URL_PATH: &str = "/v1/logs";
    /// Accepted `Content-Encoding` values. The empty string means uncompressed.
    pub const COMPRESSION_ALGORITHMS: [&str; 7] =
        ["", "gzip", "zstd", "zlib", "snappy", "deflate", "lz4"];
    /// Largest accepted buffer or message size
    pub const MAX_SIZE: i64 = i32::MAX as i64;
}

/// User-facing receiver arguments.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Arguments {
    /// gRPC protocol settings; `None` disables the gRPC server
    pub grpc: Option<GrpcArguments>,
    /// HTTP protocol settings; `None` disables the HTTP server
    pub http: Option<HttpArguments>,
    /// Self-telemetry settings
    pub debug_metrics: DebugMetricsArguments,
    /// Consumers receiving decoded batches
    pub output: ConsumerArguments,
}

/// gRPC server arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GrpcArguments {
    /// Listen address as `host:port`
    pub endpoint: String,
    /// Network transport: `tcp`, `tcp4` or `tcp6`
    pub transport: String,
    /// Read buffer size in bytes
    pub read_buffer_size: i64,
    /// Write buffer size in bytes
    pub write_buffer_size: i64,
    /// Maximum decoded message size in bytes
    pub max_recv_msg_size: i64,
    /// Maximum concurrent streams per connection (0 is unlimited)
    pub max_concurrent_streams: u32,
    /// Keepalive settings
    pub keepalive: KeepaliveArguments,
}

impl Default for GrpcArguments {
    fn default() -> Self {
        Self {
            endpoint: defaults::GRPC_ENDPOINT.to_string(),
            transport: defaults::GRPC_TRANSPORT.to_string(),
            read_buffer_size: defaults::GRPC_READ_BUFFER_SIZE,
            write_buffer_size: defaults::GRPC_WRITE_BUFFER_SIZE,
            max_recv_msg_size: defaults::GRPC_MAX_RECV_MSG_SIZE,
            max_concurrent_streams: 0,
            keepalive: KeepaliveArguments::default(),
        }
    }
}

/// gRPC keepalive settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct KeepaliveArguments {
    /// Server-side keepalive parameters
    pub server_parameters: KeepaliveServerParameters,
    /// Policy applied to client pings
    pub enforcement_policy: KeepaliveEnforcementPolicy,
}

/// Server-side keepalive parameters. Unset values keep the transport defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct KeepaliveServerParameters {
    /// Close connections idle for longer than this
    #[serde(with = "humantime_serde")]
    pub max_connection_idle: Option<Duration>,
    /// Close connections older than this
    #[serde(with = "humantime_serde")]
    pub max_connection_age: Option<Duration>,
    /// Grace period after `max_connection_age`
    #[serde(with = "humantime_serde")]
    pub max_connection_age_grace: Option<Duration>,
    /// Interval between server pings
    #[serde(with = "humantime_serde")]
    pub time: Option<Duration>,
    /// Time to wait for a ping acknowledgement
    #[serde(with = "humantime_serde")]
    pub timeout: Option<Duration>,
}

/// Keepalive enforcement against misbehaving clients.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct KeepaliveEnforcementPolicy {
    /// Minimum interval between client pings
    #[serde(with = "humantime_serde")]
    pub min_time: Option<Duration>,
    /// Allow pings when there are no active streams
    pub permit_without_stream: bool,
}

/// HTTP server arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HttpArguments {
    /// Listen address as `host:port`
    pub endpoint: String,
    /// Accepted `Content-Encoding` values
    pub compression_algorithms: Vec<String>,
    /// CORS policy
    pub cors: CorsArguments,
    /// Maximum decompressed request body size in bytes
    pub max_request_body_size: i64,
    /// Path accepting trace exports
    pub traces_url_path: String,
    /// Path accepting metric exports
    pub metrics_url_path: String,
    /// Path accepting log exports
    pub logs_url_path: String,
}

impl Default for HttpArguments {
    fn default() -> Self {
        Self {
            endpoint: defaults::HTTP_ENDPOINT.to_string(),
            compression_algorithms: defaults::COMPRESSION_ALGORITHMS
                .iter()
                .map(|s| (*s).to_string())
                .collect(),
            cors: CorsArguments::default(),
            max_request_body_size: defaults::HTTP_MAX_REQUEST_BODY_SIZE,
            traces_url_path: defaults::TRACES_URL_PATH.to_string(),
            metrics_url_path: defaults::METRICS_URL_PATH.to_string(),
            logs_url_path: defaults::LOGS_URL_PATH.to_string(),
        }
    }
}

/// CORS policy. An empty origin list disables CORS handling.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CorsArguments {
    /// Origins allowed to send requests; `*` allows any origin
    pub allowed_origins: Vec<String>,
    /// Extra request headers allowed on cross-origin requests
    pub allowed_headers: Vec<String>,
    /// How long preflight responses may be cached
    #[serde(with = "humantime_serde")]
    pub max_age: Option<Duration>,
}

impl CorsArguments {
    /// Returns true when no origin is allowed
    pub fn is_empty(&self) -> bool {
        self.allowed_origins.is_empty()
    }
}

/// Self-telemetry verbosity.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    /// No self-telemetry
    None,
    /// Counters only
    Basic,
    /// Counters and per-batch debug logs
    Normal,
    /// Everything, including per-peer attributes
    #[default]
    Detailed,
}

impl Level {
    /// Returns the level name
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::None => "none",
            Level::Basic => "basic",
            Level::Normal => "normal",
            Level::Detailed => "detailed",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Self-telemetry settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DebugMetricsArguments {
    /// Drop high-cardinality attributes such as peer addresses
    pub disable_high_cardinality_metrics: bool,
    /// Verbosity level
    pub level: Level,
}

impl Default for DebugMetricsArguments {
    fn default() -> Self {
        Self {
            disable_high_cardinality_metrics: true,
            level: Level::Detailed,
        }
    }
}

/// Network transport for the gRPC listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transport {
    /// IPv4 or IPv6
    Tcp,
    /// IPv4 only
    Tcp4,
    /// IPv6 only
    Tcp6,
}

impl Transport {
    /// Returns the transport name
    pub fn as_str(&self) -> &'static str {
        match self {
            Transport::Tcp => "tcp",
            Transport::Tcp4 => "tcp4",
            Transport::Tcp6 => "tcp6",
        }
    }
}

impl FromStr for Transport {
    type Err = ReceiverError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "tcp" => Ok(Transport::Tcp),
            "tcp4" => Ok(Transport::Tcp4),
            "tcp6" => Ok(Transport::Tcp6),
            other => Err(ReceiverError::UnsupportedTransport(other.to_string())),
        }
    }
}

/// `Content-Encoding` accepted by the HTTP server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompressionAlgorithm {
    /// Uncompressed body, spelled as the empty string
    Identity,
    /// gzip
    Gzip,
    /// zstd frame
    Zstd,
    /// zlib stream
    Zlib,
    /// snappy block
    Snappy,
    /// deflate, read as a zlib stream
    Deflate,
    /// lz4 frame
    Lz4,
}

impl CompressionAlgorithm {
    /// Returns the `Content-Encoding` value for this algorithm
    pub fn as_str(&self) -> &'static str {
        match self {
            CompressionAlgorithm::Identity => "",
            CompressionAlgorithm::Gzip => "gzip",
            CompressionAlgorithm::Zstd => "zstd",
            CompressionAlgorithm::Zlib => "zlib",
            CompressionAlgorithm::Snappy => "snappy",
            CompressionAlgorithm::Deflate => "deflate",
            CompressionAlgorithm::Lz4 => "lz4",
        }
    }
}

impl FromStr for CompressionAlgorithm {
    type Err = ReceiverError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "" => Ok(CompressionAlgorithm::Identity),
            "gzip" => Ok(CompressionAlgorithm::Gzip),
            "zstd" => Ok(CompressionAlgorithm::Zstd),
            "zlib" => Ok(CompressionAlgorithm::Zlib),
            "snappy" => Ok(CompressionAlgorithm::Snappy),
            "deflate" => Ok(CompressionAlgorithm::Deflate),
            "lz4" => Ok(CompressionAlgorithm::Lz4),
            other => Err(ReceiverError::UnknownCompression(other.to_string())),
        }
    }
}

/// Converted receiver configuration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReceiverConfig {
    /// Protocol servers to start
    pub protocols: Protocols,
}

/// Configured protocol servers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Protocols {
    /// gRPC server settings, `None` when not configured
    pub grpc: Option<GrpcServerConfig>,
    /// HTTP server settings, `None` when not configured
    pub http: Option<HttpServerConfig>,
}

/// Listen address and transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetAddr {
    /// Address as `host:port`
    pub endpoint: String,
    /// Network transport
    pub transport: Transport,
}

/// Validated gRPC server settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrpcServerConfig {
    /// Listen address
    pub net_addr: NetAddr,
    /// Read buffer size in bytes
    pub read_buffer_size: usize,
    /// Write buffer size in bytes
    pub write_buffer_size: usize,
    /// Maximum decoded message size in bytes
    pub max_recv_msg_size: usize,
    /// Maximum concurrent streams per connection (0 is unlimited)
    pub max_concurrent_streams: u32,
    /// Keepalive settings
    pub keepalive: KeepaliveArguments,
}

/// Validated HTTP server settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpServerConfig {
    /// Listen address as `host:port`
    pub endpoint: String,
    /// Accepted `Content-Encoding` values, in configured order
    pub compression_algorithms: Vec<CompressionAlgorithm>,
    /// CORS policy
    pub cors: CorsArguments,
    /// Maximum decompressed request body size in bytes
    pub max_request_body_size: usize,
    /// Path accepting trace exports, always starting with `/`
    pub traces_url_path: String,
    /// Path accepting metric exports, always starting with `/`
    pub metrics_url_path: String,
    /// Path accepting log exports, always starting with `/`
    pub logs_url_path: String,
}

impl HttpServerConfig {
    /// Returns true if `alg` is an accepted `Content-Encoding`
    pub fn accepts(&self, alg: CompressionAlgorithm) -> bool {
        self.compression_algorithms.contains(&alg)
    }
}

impl Arguments {
    /// Arguments with both protocols enabled on their default endpoints
    pub fn with_default_protocols() -> Self {
        Self {
            grpc: Some(GrpcArguments::default()),
            http: Some(HttpArguments::default()),
            ..Self::default()
        }
    }

    /// Parse arguments from YAML
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| ReceiverError::config(format!("Failed to parse YAML config: {}", e)))
    }

    /// Read and parse arguments from a YAML file
    pub async fn load(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            ReceiverError::config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_yaml(&content)
    }

    /// Validate the arguments and convert them into server settings
    pub fn convert(&self) -> Result<ReceiverConfig> {
        let grpc = self.grpc.as_ref().map(GrpcArguments::convert).transpose()?;
        let http = self.http.as_ref().map(HttpArguments::convert).transpose()?;
        Ok(ReceiverConfig {
            protocols: Protocols { grpc, http },
        })
    }

    /// Self-telemetry settings derived from these arguments
    pub fn debug_metrics_config(&self) -> DebugMetricsArguments {
        self.debug_metrics.clone()
    }
}

impl GrpcArguments {
    fn convert(&self) -> Result<GrpcServerConfig> {
        validate_endpoint(&self.endpoint)?;
        let transport = self.transport.parse()?;
        Ok(GrpcServerConfig {
            net_addr: NetAddr {
                endpoint: self.endpoint.clone(),
                transport,
            },
            read_buffer_size: validate_size("read_buffer_size", self.read_buffer_size)?,
            write_buffer_size: validate_size("write_buffer_size", self.write_buffer_size)?,
            max_recv_msg_size: validate_size("max_recv_msg_size", self.max_recv_msg_size)?,
            max_concurrent_streams: self.max_concurrent_streams,
            keepalive: self.keepalive.clone(),
        })
    }
}

impl HttpArguments {
    fn convert(&self) -> Result<HttpServerConfig> {
        validate_endpoint(&self.endpoint)?;

        let mut compression_algorithms = Vec::with_capacity(self.compression_algorithms.len());
        for name in &self.compression_algorithms {
            let alg: CompressionAlgorithm = name.parse()?;
            if !compression_algorithms.contains(&alg) {
                compression_algorithms.push(alg);
            }
        }

        let traces_url_path = sanitize_url_path("traces_url_path", &self.traces_url_path)?;
        let metrics_url_path = sanitize_url_path("metrics_url_path", &self.metrics_url_path)?;
        let logs_url_path = sanitize_url_path("logs_url_path", &self.logs_url_path)?;

        let mut seen = HashSet::new();
        for (field, path) in [
            ("traces_url_path", &traces_url_path),
            ("metrics_url_path", &metrics_url_path),
            ("logs_url_path", &logs_url_path),
        ] {
            if !seen.insert(path.as_str()) {
                return Err(ReceiverError::InvalidUrlPath {
                    field,
                    path: path.clone(),
                    reason: "path is used by more than one signal".to_string(),
                });
            }
        }

        let max_request_body_size =
            validate_size("max_request_body_size", self.max_request_body_size)?;
        if max_request_body_size == 0 {
            return Err(ReceiverError::InvalidBufferSize {
                field: "max_request_body_size",
                value: self.max_request_body_size,
            });
        }

        Ok(HttpServerConfig {
            endpoint: self.endpoint.clone(),
            compression_algorithms,
            cors: self.cors.clone(),
            max_request_body_size,
            traces_url_path,
            metrics_url_path,
            logs_url_path,
        })
    }
}

/// Check that `endpoint` is a `host:port` string. The host may be empty or a
/// bracketed IPv6 literal.
fn validate_endpoint(endpoint: &str) -> Result<()> {
    let invalid = |reason: &str| ReceiverError::InvalidEndpoint {
        endpoint: endpoint.to_string(),
        reason: reason.to_string(),
    };

    let (host, port) = endpoint
        .rsplit_once(':')
        .ok_or_else(|| invalid("missing port"))?;
    if port.is_empty() {
        return Err(invalid("missing port"));
    }
    port.parse::<u16>().map_err(|_| invalid("invalid port"))?;

    if let Some(inner) = host.strip_prefix('[') {
        if !inner.ends_with(']') {
            return Err(invalid("unterminated IPv6 literal"));
        }
    } else if host.contains(':') {
        return Err(invalid("IPv6 hosts must be bracketed"));
    }
    if host.chars().any(char::is_whitespace) {
        return Err(invalid("host contains whitespace"));
    }
    Ok(())
}

fn validate_size(field: &'static str, value: i64) -> Result<usize> {
    if !(0..=defaults::MAX_SIZE).contains(&value) {
        return Err(ReceiverError::InvalidBufferSize { field, value });
    }
    usize::try_from(value).map_err(|_| ReceiverError::InvalidBufferSize { field, value })
}

/// Validate a route path and make sure it starts with `/`.
fn sanitize_url_path(field: &'static str, path: &str) -> Result<String> {
    let invalid = |reason: &str| ReceiverError::InvalidUrlPath {
        field,
        path: path.to_string(),
        reason: reason.to_string(),
    };

    let trimmed = path.trim();
    if trimmed.is_empty() || trimmed == "/" {
        return Err(invalid("must not be empty"));
    }
    if trimmed.contains(['*', ':', '{', '}']) {
        return Err(invalid("must not contain route parameters or wildcards"));
    }
    if trimmed.contains(['?', '#']) || trimmed.chars().any(char::is_whitespace) {
        return Err(invalid("must be a plain path"));
    }

    if trimmed.starts_with('/') {
        Ok(trimmed.to_string())
    } else {
        Ok(format!("/{}", trimmed))
    }
}

/// Default configuration file location: `<config dir>/otlp-receiver/config.yaml`.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("otlp-receiver").join("config.yaml"))
}

/// Builder for programmatic construction of [`Arguments`].
#[derive(Default)]
pub struct ArgumentsBuilder {
    args: Arguments,
}

impl ArgumentsBuilder {
    /// Create a builder with no protocols configured
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the arguments with ones parsed from YAML, keeping consumers
    pub fn from_yaml(mut self, yaml: &str) -> Result<Self> {
        let output = std::mem::take(&mut self.args.output);
        self.args = Arguments::from_yaml(yaml)?;
        self.args.output = output;
        Ok(self)
    }

    /// Enable gRPC with the given settings
    pub fn grpc(mut self, grpc: GrpcArguments) -> Self {
        self.args.grpc = Some(grpc);
        self
    }

    /// Enable gRPC on `endpoint`
    pub fn grpc_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.args.grpc.get_or_insert_with(GrpcArguments::default).endpoint = endpoint.into();
        self
    }

    /// Enable HTTP with the given settings
    pub fn http(mut self, http: HttpArguments) -> Self {
        self.args.http = Some(http);
        self
    }

    /// Enable HTTP on `endpoint`
    pub fn http_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.args.http.get_or_insert_with(HttpArguments::default).endpoint = endpoint.into();
        self
    }

    /// Set self-telemetry settings
    pub fn debug_metrics(mut self, debug_metrics: DebugMetricsArguments) -> Self {
        self.args.debug_metrics = debug_metrics;
        self
    }

    /// Register a trace consumer
    pub fn traces_consumer(mut self, consumer: Arc<dyn Consumer>) -> Self {
        self.args.output.traces.push(consumer);
        self
    }

    /// Register a metrics consumer
    pub fn metrics_consumer(mut self, consumer: Arc<dyn Consumer>) -> Self {
        self.args.output.metrics.push(consumer);
        self
    }

    /// Register a logs consumer
    pub fn logs_consumer(mut self, consumer: Arc<dyn Consumer>) -> Self {
        self.args.output.logs.push(consumer);
        self
    }

    /// Register `consumer` for every signal
    pub fn consumer(self, consumer: Arc<dyn Consumer>) -> Self {
        self.traces_consumer(Arc::clone(&consumer))
            .metrics_consumer(Arc::clone(&consumer))
            .logs_consumer(consumer)
    }

    /// Validate and return the arguments
    pub fn build(self) -> Result<Arguments> {
        self.args.convert()?;
        Ok(self.args)
    }
}

/// Watch a configuration file and publish validated arguments on change.
pub struct ConfigWatcher {
    path: PathBuf,
    tx: tokio::sync::watch::Sender<Arguments>,
    rx: tokio::sync::watch::Receiver<Arguments>,
}

impl ConfigWatcher {
    /// Create a new configuration watcher
    pub fn new(path: PathBuf, initial: Arguments) -> Self {
        let (tx, rx) = tokio::sync::watch::channel(initial);
        ConfigWatcher { path, tx, rx }
    }

    /// Get a receiver for configuration updates
    pub fn subscribe(&self) -> tokio::sync::watch::Receiver<Arguments> {
        self.rx.clone()
    }

    /// Watch the file until `ctx` is cancelled.
    ///
    /// Invalid files are logged and skipped. Consumers are not part of the
    /// file, so the ones registered on the initial arguments are carried
    /// over to every reload.
    pub async fn watch(self, ctx: CancellationToken) -> Result<()> {
        use notify::{RecursiveMode, Watcher};

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

        let mut watcher = notify::recommended_watcher(move |res| {
            if let Ok(event) = res {
                let _ = tx.send(event);
            }
        })
        .map_err(|e| ReceiverError::config(format!("Failed to create file watcher: {}", e)))?;

        watcher
            .watch(&self.path, RecursiveMode::NonRecursive)
            .map_err(|e| ReceiverError::config(format!("Failed to watch config file: {}", e)))?;

        tracing::info!("Watching configuration file: {:?}", self.path);

        loop {
            let event: notify::Event = tokio::select! {
                _ = ctx.cancelled() => break,
                event = rx.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
            };

            if !matches!(event.kind, notify::EventKind::Modify(_)) {
                continue;
            }
            tracing::info!("Configuration file changed, reloading...");

            let mut new_args = match Arguments::load(&self.path).await {
                Ok(args) => args,
                Err(e) => {
                    tracing::error!("Failed to reload configuration: {}", e);
                    continue;
                },
            };
            if let Err(e) = new_args.convert() {
                tracing::error!("Invalid configuration: {}", e);
                continue;
            }

            new_args.output = self.tx.borrow().output.clone();

            if self.tx.send(new_args).is_err() {
                tracing::debug!("No configuration subscribers left, stopping watcher");
                break;
            }
            tracing::info!("Configuration reloaded successfully");
        }

        Ok(())
    }
}
