//! Configuration, error and signal types shared by the receiver.

#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod retry;
pub mod types;

// Re-export commonly used types
pub use config::{
    Arguments, ArgumentsBuilder, ConfigWatcher, DebugMetricsArguments, GrpcArguments,
    HttpArguments, Level, ReceiverConfig,
};
pub use error::{ReceiverError, Result};
pub use types::{Logs, Metrics, Payload, Protocol, Signal, Traces};
