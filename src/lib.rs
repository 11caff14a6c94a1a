//! OTLP receiver - OpenTelemetry protocol ingestion for traces, metrics and logs.
//!
//! The receiver accepts OTLP exports over gRPC and HTTP (protobuf or JSON),
//! decodes them and hands every batch to the consumers registered for its
//! signal. It is configured with YAML [`Arguments`](core::Arguments) and can
//! be reconfigured while running.
//!
//! # Architecture
//!
//! - `core`: configuration, errors, signal types and retry backoff
//! - `consumer`: the downstream `Consumer` trait and the fan-out
//! - `receiver`: lifecycle, gRPC and HTTP adapters, self-telemetry
//! - `cli`: command-line interface
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use otlp_receiver::consumer::LoggingConsumer;
//! use otlp_receiver::core::Arguments;
//! use otlp_receiver::Receiver;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut args = Arguments::with_default_protocols();
//!     args.output.traces.push(Arc::new(LoggingConsumer::default()));
//!
//!     let receiver = Receiver::new();
//!     receiver.run(CancellationToken::new(), args).await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

pub mod cli;
pub mod consumer;
pub mod core;
pub mod receiver;

// Re-export core types for convenience
pub use crate::core::{Arguments, ReceiverError, Result};
pub use crate::receiver::{Receiver, RunningState};
