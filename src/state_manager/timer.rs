use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::types::{Round, VotingPhase};

/// Fired when a round's phase timeout elapses without that phase reaching its vote
/// threshold.
#[derive(Clone, Copy, Debug)]
pub struct PhaseTimeout {
    pub round: Round,
    pub phase: VotingPhase,
}

/// Owns the currently armed timeout for one round, if any. Re-arming drops the
/// previous handle, which aborts it: only the newest timer for a round can fire.
#[derive(Default)]
pub struct RoundTimer {
    handle: Option<JoinHandle<()>>,
}

impl RoundTimer {
    pub fn new() -> Self {
        Self { handle: None }
    }

    /// Arm a timer that, after `duration`, sends `PhaseTimeout{round, phase}` on `tx`.
    /// Any previously armed timer on this `RoundTimer` is cancelled first.
    pub fn arm(&mut self, duration: Duration, round: Round, phase: VotingPhase, tx: mpsc::Sender<PhaseTimeout>) {
        self.cancel();
        let handle = tokio::spawn(async move {
                tokio::time::sleep(duration).await;
                let _ = tx.send(PhaseTimeout { round, phase }).await;
        });
        self.handle = Some(handle);
    }

    pub fn cancel(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

impl Drop for RoundTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Per-phase timeout durations read off `ConsensusConfig`.
#[derive(Clone, Copy, Debug)]
pub struct PhaseTimeouts {
    pub init: Duration,
    pub sign: Duration,
    pub accept: Duration,
    pub allconfirm: Duration,
}

impl PhaseTimeouts {
    pub fn from_config(config: &crate::config::ConsensusConfig) -> Self {
        Self {
            init: config.timeout_init(),
            sign: config.timeout_sign(),
            accept: config.timeout_accept(),
            allconfirm: config.timeout_allconfirm(),
        }
    }

    pub fn for_phase(&self, phase: VotingPhase) -> Duration {
        match phase {
            VotingPhase::Init => self.init,
            VotingPhase::Sign => self.sign,
            VotingPhase::Accept => self.accept,
            VotingPhase::AllConfirm => self.allconfirm,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Hash;

    #[tokio::test]
    async fn armed_timer_fires_after_duration() {
        let (tx, mut rx) = mpsc::channel(1);
        let mut timer = RoundTimer::new();
        let round = Round::new(1, 0, Hash::zero());
        timer.arm(Duration::from_millis(10), round, VotingPhase::Init, tx);
        let fired = rx.recv().await.unwrap();
        assert_eq!(fired.round, round);
        assert_eq!(fired.phase, VotingPhase::Init);
    }

    #[tokio::test]
    async fn re_arming_cancels_previous_timer() {
        let (tx, mut rx) = mpsc::channel(4);
        let mut timer = RoundTimer::new();
        let round = Round::new(1, 0, Hash::zero());
        timer.arm(Duration::from_secs(5), round, VotingPhase::Init, tx.clone());
        timer.arm(Duration::from_millis(10), round, VotingPhase::Sign, tx);
        let fired = rx.recv().await.unwrap();
        assert_eq!(fired.phase, VotingPhase::Sign);
    }
}
