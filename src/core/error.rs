use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReceiverError {
    #[error("Invalid endpoint {endpoint:?}: {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    #[error("Unsupported transport {0:?}: expected one of tcp, tcp4, tcp6")]
    UnsupportedTransport(String),

    #[error("Invalid {field}: {value} is out of range")]
    InvalidBufferSize { field: &'static str, value: i64 },

    #[error("Unknown compression algorithm {0:?}")]
    UnknownCompression(String),

    #[error("Invalid {field} {path:?}: {reason}")]
    InvalidUrlPath {
        field: &'static str,
        path: String,
        reason: String,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to bind {endpoint}: {reason}")]
    Bind { endpoint: String, reason: String },

    #[error("OTLP protocol error: {0}")]
    Protocol(String),

    #[error("Consumer error: {0}")]
    Consumer(String),

    #[error("Context cancelled")]
    Cancelled,

    #[error("Context deadline exceeded")]
    DeadlineExceeded,

    #[error("Timeout error: operation took longer than {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Receiver is not running")]
    NotRunning,

    #[error("Receiver is already running")]
    AlreadyRunning,

    #[error("Network error: {0}")]
    Network(String),

    #[error("Async task join error: {0}")]
    Join(String),
}

/// Result type alias for receiver operations
pub type Result<T> = std::result::Result<T, ReceiverError>;

impl From<tokio::task::JoinError> for ReceiverError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Join(err.to_string())
    }
}

impl ReceiverError {
    /// Creates a new protocol error
    pub fn protocol<S: Into<String>>(msg: S) -> Self {
        Self::Protocol(msg.into())
    }

    /// Creates a new configuration error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// Creates a new network error
    pub fn network<S: Into<String>>(msg: S) -> Self {
        Self::Network(msg.into())
    }

    /// Creates a new consumer error
    pub fn consumer<S: Into<String>>(msg: S) -> Self {
        Self::Consumer(msg.into())
    }

    /// Creates a new bind error for `endpoint`
    pub fn bind<E: Into<String>, R: std::fmt::Display>(endpoint: E, reason: R) -> Self {
        Self::Bind {
            endpoint: endpoint.into(),
            reason: reason.to_string(),
        }
    }

    /// Returns true for cancellation and deadline errors
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled | Self::DeadlineExceeded)
    }

    /// Returns true if this error must terminate a running receiver
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Bind { .. } | Self::Protocol(_) | Self::Join(_))
    }

    /// Returns true if this error is recoverable
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Network(_) | Self::Timeout { .. } | Self::NotRunning | Self::DeadlineExceeded
        )
    }

    /// Returns the error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            Self::InvalidEndpoint { .. }
            | Self::UnsupportedTransport(_)
            | Self::InvalidBufferSize { .. }
            | Self::UnknownCompression(_)
            | Self::InvalidUrlPath { .. } => "validation",
            Self::Config(_) => "config",
            Self::Bind { .. } | Self::Network(_) => "network",
            Self::Protocol(_) => "protocol",
            Self::Consumer(_) => "consumer",
            Self::Cancelled | Self::DeadlineExceeded => "cancellation",
            Self::Timeout { .. } => "timeout",
            Self::NotRunning | Self::AlreadyRunning => "lifecycle",
            Self::Join(_) => "async",
        }
    }
}
