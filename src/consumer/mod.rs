//! Downstream consumers and the fan-out delivering decoded batches to them.

pub mod logging;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use arc_swap::ArcSwap;
use serde::de::{Deserializer, IgnoredAny};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::core::{Logs, Metrics, Payload, ReceiverError, Result, Signal, Traces};

pub use logging::LoggingConsumer;

/// A downstream collaborator accepting decoded batches.
///
/// Consumers receive a shared reference to the batch and must not assume
/// they are its only reader. Long-running consumers should watch `ctx` and
/// return once it is cancelled.
#[async_trait::async_trait]
pub trait Consumer: Send + Sync {
    /// Consume a batch of traces.
    async fn consume_traces(&self, ctx: &CancellationToken, batch: &Traces) -> Result<()>;

    /// Consume a batch of metrics.
    async fn consume_metrics(&self, ctx: &CancellationToken, batch: &Metrics) -> Result<()>;

    /// Consume a batch of logs.
    async fn consume_logs(&self, ctx: &CancellationToken, batch: &Logs) -> Result<()>;
}

/// Consumers registered per signal, in delivery order.
#[derive(Clone, Default)]
pub struct ConsumerArguments {
    /// Trace consumers
    pub traces: Vec<Arc<dyn Consumer>>,
    /// Metrics consumers
    pub metrics: Vec<Arc<dyn Consumer>>,
    /// Logs consumers
    pub logs: Vec<Arc<dyn Consumer>>,
}

impl ConsumerArguments {
    /// Consumers registered for `signal`
    pub fn consumers_for(&self, signal: Signal) -> &[Arc<dyn Consumer>] {
        match signal {
            Signal::Traces => &self.traces,
            Signal::Metrics => &self.metrics,
            Signal::Logs => &self.logs,
        }
    }

    /// Returns true when no consumer is registered for any signal
    pub fn is_empty(&self) -> bool {
        self.traces.is_empty() && self.metrics.is_empty() && self.logs.is_empty()
    }
}

impl fmt::Debug for ConsumerArguments {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConsumerArguments")
            .field("traces", &self.traces.len())
            .field("metrics", &self.metrics.len())
            .field("logs", &self.logs.len())
            .finish()
    }
}

// Consumers are attached in code; a config file may only carry an empty block.
impl<'de> Deserialize<'de> for ConsumerArguments {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let fields = Option::<HashMap<String, IgnoredAny>>::deserialize(deserializer)?;
        match fields {
            Some(fields) if !fields.is_empty() => Err(serde::de::Error::custom(
                "output consumers cannot be declared in configuration files",
            )),
            _ => Ok(Self::default()),
        }
    }
}

/// Delivers decoded batches to the registered consumers.
pub struct FanOut {
    consumers: ArcSwap<ConsumerArguments>,
}

impl FanOut {
    /// Create a fan-out over `consumers`
    pub fn new(consumers: ConsumerArguments) -> Self {
        Self {
            consumers: ArcSwap::from_pointee(consumers),
        }
    }

    /// Atomically replace the registered consumers.
    ///
    /// Deliveries already in progress finish against the previous set.
    pub fn update(&self, consumers: ConsumerArguments) {
        self.consumers.store(Arc::new(consumers));
    }

    /// Current consumer set
    pub fn snapshot(&self) -> Arc<ConsumerArguments> {
        self.consumers.load_full()
    }

    /// Deliver `payload` to every consumer registered for its signal.
    ///
    /// Consumers are called one after another in registration order. The
    /// first error stops delivery and is returned. If `ctx` is cancelled
    /// while a consumer is running, `Cancelled` is returned without waiting
    /// for it.
    pub async fn deliver(&self, ctx: &CancellationToken, payload: &Payload) -> Result<()> {
        let snapshot = self.snapshot();
        let signal = payload.signal();
        let consumers = snapshot.consumers_for(signal);

        if consumers.is_empty() {
            tracing::debug!("No {} consumers registered, dropping batch", signal);
            return Ok(());
        }

        for (index, consumer) in consumers.iter().enumerate() {
            let result = tokio::select! {
                biased;
                _ = ctx.cancelled() => Err(ReceiverError::Cancelled),
                res = consume(consumer.as_ref(), ctx, payload) => res,
            };

            if let Err(e) = result {
                tracing::debug!("{} consumer {} failed: {}", signal, index, e);
                return Err(e);
            }
        }

        Ok(())
    }
}

async fn consume(consumer: &dyn Consumer, ctx: &CancellationToken, payload: &Payload) -> Result<()> {
    match payload {
        Payload::Traces(batch) => consumer.consume_traces(ctx, batch).await,
        Payload::Metrics(batch) => consumer.consume_metrics(ctx, batch).await,
        Payload::Logs(batch) => consumer.consume_logs(ctx, batch).await,
    }
}
