//! Self-telemetry: accepted and refused item counters plus receiver logs.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::core::config::{DebugMetricsArguments, Level};
use crate::core::{Protocol, Signal};

/// Accepted and refused item counts for one signal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SignalCounts {
    /// Items delivered to every consumer
    pub accepted: u64,
    /// Items in batches that failed delivery
    pub refused: u64,
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TelemetrySnapshot {
    /// Trace counters, in spans
    pub traces: SignalCounts,
    /// Metrics counters, in data points
    pub metrics: SignalCounts,
    /// Logs counters, in log records
    pub logs: SignalCounts,
}

impl TelemetrySnapshot {
    /// Counters for `signal`
    pub fn get(&self, signal: Signal) -> SignalCounts {
        match signal {
            Signal::Traces => self.traces,
            Signal::Metrics => self.metrics,
            Signal::Logs => self.logs,
        }
    }
}

#[derive(Default)]
struct Counters {
    accepted: AtomicU64,
    refused: AtomicU64,
}

/// Receiver self-telemetry, configured by [`DebugMetricsArguments`].
pub struct SelfTelemetry {
    settings: ArcSwap<DebugMetricsArguments>,
    counters: [Counters; 3],
}

impl SelfTelemetry {
    /// Create self-telemetry with the given settings
    pub fn new(settings: DebugMetricsArguments) -> Self {
        Self {
            settings: ArcSwap::from_pointee(settings),
            counters: Default::default(),
        }
    }

    /// Replace the settings; counters are kept
    pub fn update(&self, settings: DebugMetricsArguments) {
        self.settings.store(Arc::new(settings));
    }

    /// Current settings
    pub fn settings(&self) -> Arc<DebugMetricsArguments> {
        self.settings.load_full()
    }

    fn counters(&self, signal: Signal) -> &Counters {
        match signal {
            Signal::Traces => &self.counters[0],
            Signal::Metrics => &self.counters[1],
            Signal::Logs => &self.counters[2],
        }
    }

    /// Peer address, unless high-cardinality attributes are disabled
    fn peer(settings: &DebugMetricsArguments, peer: Option<SocketAddr>) -> Option<SocketAddr> {
        if settings.level >= Level::Detailed && !settings.disable_high_cardinality_metrics {
            peer
        } else {
            None
        }
    }

    /// Record a batch that every consumer accepted
    pub fn record_accepted(
        &self,
        signal: Signal,
        protocol: Protocol,
        items: usize,
        peer: Option<SocketAddr>,
    ) {
        let settings = self.settings.load();
        if settings.level == Level::None {
            return;
        }
        self.counters(signal)
            .accepted
            .fetch_add(items as u64, Ordering::Relaxed);

        if settings.level >= Level::Normal {
            match Self::peer(&settings, peer) {
                Some(peer) => tracing::debug!(
                    "Accepted {} {} items over {} from {}",
                    items,
                    signal,
                    protocol,
                    peer
                ),
                None => tracing::debug!("Accepted {} {} items over {}", items, signal, protocol),
            }
        }
    }

    /// Record a batch that failed delivery
    pub fn record_refused(
        &self,
        signal: Signal,
        protocol: Protocol,
        items: usize,
        peer: Option<SocketAddr>,
        reason: &dyn std::fmt::Display,
    ) {
        let settings = self.settings.load();
        if settings.level == Level::None {
            return;
        }
        self.counters(signal)
            .refused
            .fetch_add(items as u64, Ordering::Relaxed);

        match Self::peer(&settings, peer) {
            Some(peer) => tracing::warn!(
                "Refused {} {} items over {} from {}: {}",
                items,
                signal,
                protocol,
                peer,
                reason
            ),
            None => tracing::warn!("Refused {} {} items over {}: {}", items, signal, protocol, reason),
        }
    }

    /// Current counter values
    pub fn snapshot(&self) -> TelemetrySnapshot {
        let read = |signal| {
            let c = self.counters(signal);
            SignalCounts {
                accepted: c.accepted.load(Ordering::Relaxed),
                refused: c.refused.load(Ordering::Relaxed),
            }
        };
        TelemetrySnapshot {
            traces: read(Signal::Traces),
            metrics: read(Signal::Metrics),
            logs: read(Signal::Logs),
        }
    }
}

impl Default for SelfTelemetry {
    fn default() -> Self {
        Self::new(DebugMetricsArguments::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_per_signal() {
        let telemetry = SelfTelemetry::default();
        telemetry.record_accepted(Signal::Traces, Protocol::Http, 3, None);
        telemetry.record_accepted(Signal::Traces, Protocol::Grpc, 2, None);
        telemetry.record_refused(Signal::Logs, Protocol::Grpc, 4, None, &"consumer failed");

        let snapshot = telemetry.snapshot();
        assert_eq!(snapshot.get(Signal::Traces), SignalCounts { accepted: 5, refused: 0 });
        assert_eq!(snapshot.get(Signal::Logs), SignalCounts { accepted: 0, refused: 4 });
        assert_eq!(snapshot.metrics, SignalCounts::default());
    }

    #[test]
    fn test_level_none_disables_counting() {
        let telemetry = SelfTelemetry::new(DebugMetricsArguments {
            disable_high_cardinality_metrics: true,
            level: Level::None,
        });
        telemetry.record_accepted(Signal::Metrics, Protocol::Http, 10, None);
        assert_eq!(telemetry.snapshot(), TelemetrySnapshot::default());

        telemetry.update(DebugMetricsArguments {
            disable_high_cardinality_metrics: true,
            level: Level::Basic,
        });
        telemetry.record_accepted(Signal::Metrics, Protocol::Http, 10, None);
        assert_eq!(telemetry.snapshot().metrics.accepted, 10);
    }

    #[test]
    fn test_peer_attached_only_when_high_cardinality_enabled() {
        let peer: SocketAddr = "127.0.0.1:5000".parse().unwrap();
        let detailed = DebugMetricsArguments {
            disable_high_cardinality_metrics: false,
            level: Level::Detailed,
        };
        assert_eq!(SelfTelemetry::peer(&detailed, Some(peer)), Some(peer));

        let default = DebugMetricsArguments::default();
        assert_eq!(SelfTelemetry::peer(&default, Some(peer)), None);

        let normal = DebugMetricsArguments {
            disable_high_cardinality_metrics: false,
            level: Level::Normal,
        };
        assert_eq!(SelfTelemetry::peer(&normal, Some(peer)), None);
    }
}
