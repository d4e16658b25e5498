use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::types::VotingPhase;

/// In-process consensus counters, always collected regardless of whether the
/// `metrics` feature's Prometheus exporter is compiled in.
#[derive(Default)]
pub struct ConsensusMetrics {
    pub rounds_started: AtomicU64,
    pub rounds_committed: AtomicU64,
    pub rounds_aborted: AtomicU64,
    pub ballots_received: AtomicU64,
    pub transactions_finalized: AtomicU64,
    pub phase_timeouts: AtomicU64,
}

impl ConsensusMetrics {
    pub fn record_round_started(&self) {
        self.rounds_started.fetch_add(1, Ordering::Relaxed);
    }
    pub fn record_round_committed(&self) {
        self.rounds_committed.fetch_add(1, Ordering::Relaxed);
    }
    pub fn record_round_aborted(&self) {
        self.rounds_aborted.fetch_add(1, Ordering::Relaxed);
    }
    pub fn record_ballot_received(&self) {
        self.ballots_received.fetch_add(1, Ordering::Relaxed);
    }
    pub fn record_transactions_finalized(&self, count: u64) {
        self.transactions_finalized.fetch_add(count, Ordering::Relaxed);
    }
    pub fn record_phase_timeout(&self, _phase: VotingPhase) {
        self.phase_timeouts.fetch_add(1, Ordering::Relaxed);
    }
}

/// Owns the node's metric counters and, with the `metrics` feature enabled, a
/// Prometheus registry to export them through.
#[derive(Clone)]
pub struct MetricsCollector {
    pub consensus: Arc<ConsensusMetrics>,
    #[cfg(feature = "metrics")]
    registry: prometheus::Registry,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            consensus: Arc::new(ConsensusMetrics::default()),
            #[cfg(feature = "metrics")]
            registry: prometheus::Registry::new(),
        }
    }

    #[cfg(feature = "metrics")]
    pub fn render(&self) -> String {
        use prometheus::Encoder;
        let families = self.registry.gather();
        let encoder = prometheus::TextEncoder::new();
        let mut buf = Vec::new();
        let _ = encoder.encode(&families, &mut buf);
        format!(
            "{}\nisaac_rounds_started {}\nisaac_rounds_committed {}\nisaac_rounds_aborted {}\nisaac_ballots_received {}\nisaac_transactions_finalized {}\nisaac_phase_timeouts {}\n",
            String::from_utf8_lossy(&buf),
            self.consensus.rounds_started.load(Ordering::Relaxed),
            self.consensus.rounds_committed.load(Ordering::Relaxed),
            self.consensus.rounds_aborted.load(Ordering::Relaxed),
            self.consensus.ballots_received.load(Ordering::Relaxed),
            self.consensus.transactions_finalized.load(Ordering::Relaxed),
            self.consensus.phase_timeouts.load(Ordering::Relaxed),
        )
    }

    #[cfg(not(feature = "metrics"))]
    pub fn render(&self) -> String {
        format!(
            "isaac_rounds_started {}\nisaac_rounds_committed {}\nisaac_rounds_aborted {}\nisaac_ballots_received {}\nisaac_transactions_finalized {}\nisaac_phase_timeouts {}\n",
            self.consensus.rounds_started.load(Ordering::Relaxed),
            self.consensus.rounds_committed.load(Ordering::Relaxed),
            self.consensus.rounds_aborted.load(Ordering::Relaxed),
            self.consensus.ballots_received.load(Ordering::Relaxed),
            self.consensus.transactions_finalized.load(Ordering::Relaxed),
            self.consensus.phase_timeouts.load(Ordering::Relaxed),
        )
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}
