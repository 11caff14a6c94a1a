//! Bounded exponential backoff for clients probing a receiver.
//!
//! The receiver itself never retries; this is for senders and tests that
//! must wait for a listener to come up.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio_util::sync::CancellationToken;

use crate::core::{ReceiverError, Result};

/// Backoff configuration
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    /// Delay before the first retry
    pub min_backoff: Duration,
    /// Upper bound for a single delay
    pub max_backoff: Duration,
    /// Maximum number of retries, 0 for unlimited
    pub max_retries: u32,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            min_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(10),
            max_retries: 10,
        }
    }
}

/// Exponential backoff state for one retry loop.
///
/// ```no_run
/// # use otlp_receiver::core::retry::{Backoff, BackoffConfig};
/// # use tokio_util::sync::CancellationToken;
/// # async fn probe() -> bool { true }
/// # async fn run() {
/// let mut backoff = Backoff::new(CancellationToken::new(), BackoffConfig::default());
/// while backoff.ongoing() {
///     if probe().await {
///         break;
///     }
///     backoff.wait().await;
/// }
/// # }
/// ```
pub struct Backoff {
    ctx: CancellationToken,
    config: BackoffConfig,
    num_retries: u32,
    next_delay: Duration,
}

impl Backoff {
    /// Create a backoff bound to `ctx`
    pub fn new(ctx: CancellationToken, config: BackoffConfig) -> Self {
        let next_delay = config.min_backoff;
        Self {
            ctx,
            config,
            num_retries: 0,
            next_delay,
        }
    }

    /// Returns true while another attempt may be made
    pub fn ongoing(&self) -> bool {
        !self.ctx.is_cancelled()
            && (self.config.max_retries == 0 || self.num_retries < self.config.max_retries)
    }

    /// Number of retries performed so far
    pub fn num_retries(&self) -> u32 {
        self.num_retries
    }

    /// Why the loop stopped, if it did
    pub fn err(&self) -> Option<ReceiverError> {
        if self.ctx.is_cancelled() {
            Some(ReceiverError::Cancelled)
        } else if self.config.max_retries != 0 && self.num_retries >= self.config.max_retries {
            Some(ReceiverError::network(format!(
                "terminated after {} retries",
                self.num_retries
            )))
        } else {
            None
        }
    }

    /// Reset to the initial delay
    pub fn reset(&mut self) {
        self.num_retries = 0;
        self.next_delay = self.config.min_backoff;
    }

    /// Sleep for the next delay, returning early if the context is cancelled
    pub async fn wait(&mut self) {
        let delay = self.jittered(self.next_delay);
        self.num_retries += 1;
        self.next_delay = (self.next_delay * 2).min(self.config.max_backoff);

        tokio::select! {
            _ = self.ctx.cancelled() => {},
            _ = tokio::time::sleep(delay) => {},
        }
    }

    /// A delay between half and the full `delay`.
    fn jittered(&self, delay: Duration) -> Duration {
        let half = delay / 2;
        let millis = u64::try_from(half.as_millis()).unwrap_or(u64::MAX);
        if millis == 0 {
            return delay;
        }
        half + Duration::from_millis(rand::thread_rng().gen_range(0..=millis))
    }
}

/// Retry `operation` on recoverable errors with exponential backoff
pub async fn retry_with_config<F, Fut, T>(
    ctx: CancellationToken,
    config: BackoffConfig,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut backoff = Backoff::new(ctx, config);
    loop {
        let error = match operation().await {
            Ok(result) => return Ok(result),
            Err(error) => error,
        };

        if !error.is_recoverable() || !backoff.ongoing() {
            tracing::error!(
                "Operation failed after {} retries: {}",
                backoff.num_retries(),
                error
            );
            return Err(error);
        }

        tracing::debug!("Attempt {} failed: {}. Retrying...", backoff.num_retries() + 1, error);
        backoff.wait().await;

        if let Some(ReceiverError::Cancelled) = backoff.err() {
            return Err(ReceiverError::Cancelled);
        }
    }
}
