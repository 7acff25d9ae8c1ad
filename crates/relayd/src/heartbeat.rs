//! Heartbeat monitor
//!
//! Periodically writes a one-byte probe to every registered connection.
//! A probe that fails or misses its deadline evicts the connection at once.

use crate::registry::Registry;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Result of one sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub probed: usize,
    pub evicted: usize,
}

/// Liveness sweeper over the connection registry
pub struct HeartbeatMonitor {
    registry: Arc<Registry>,
    interval: Duration,
    probe_timeout: Duration,
}

impl HeartbeatMonitor {
    pub fn new(registry: Arc<Registry>, interval: Duration, probe_timeout: Duration) -> Self {
        Self {
            registry,
            interval,
            probe_timeout,
        }
    }

    /// Probe every registered connection once.
    ///
    /// Probes run concurrently, so a stalled peer costs at most one
    /// `probe_timeout` for the whole sweep.
    pub async fn sweep(&self) -> SweepReport {
        let connections = self.registry.snapshot();
        let probes = connections.iter().map(|conn| async move {
            let result = conn.probe(self.probe_timeout).await;
            (conn, result)
        });
        let results = join_all(probes).await;

        let mut report = SweepReport {
            probed: connections.len(),
            evicted: 0,
        };
        for (conn, result) in results {
            if let Err(e) = result {
                if self.registry.evict(conn.addr(), conn.id()) {
                    info!(peer = %conn.addr(), error = %e, "heartbeat failed, evicted connection");
                    report.evicted += 1;
                }
            }
        }

        debug!(
            probed = report.probed,
            evicted = report.evicted,
            "heartbeat sweep complete"
        );
        report
    }

    /// Sweep on a fixed interval until `shutdown` fires
    pub async fn run(self, shutdown: CancellationToken) {
        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.sweep().await;
                }
                _ = shutdown.cancelled() => {
                    debug!("heartbeat monitor stopping");
                    break;
                }
            }
        }
    }
}
