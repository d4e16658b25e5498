use crate::config::ConsensusConfig;
use crate::types::{VotingHole, VotingPhase};

/// Counts of votes seen so far for a single (round, phase) pair.
#[derive(Clone, Copy, Default, Debug)]
pub struct VoteTally {
    pub yes: usize,
    pub no: usize,
    pub expired: usize,
    pub not_yet: usize,
}

impl VoteTally {
    pub fn record(&mut self, vote: VotingHole) {
        match vote {
            VotingHole::Yes => self.yes += 1,
            VotingHole::No => self.no += 1,
            VotingHole::Expired => self.expired += 1,
            VotingHole::NotYet => self.not_yet += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.yes + self.no + self.expired + self.not_yet
    }
}

/// Per-phase vote thresholds, expressed as a percentage of the total validator set.
/// The default policy requires 66% for INIT/SIGN/ACCEPT and 100% for ALL-CONFIRM.
#[derive(Clone, Copy, Debug)]
pub struct VotingThresholdPolicy {
    init_percent: u8,
    sign_percent: u8,
    accept_percent: u8,
    allconfirm_percent: u8,
}

impl VotingThresholdPolicy {
    pub fn from_config(config: &ConsensusConfig) -> Self {
        Self {
            init_percent: config.threshold_init_percent,
            sign_percent: config.threshold_sign_percent,
            accept_percent: config.threshold_accept_percent,
            allconfirm_percent: config.threshold_allconfirm_percent,
        }
    }

    pub fn percent(&self, phase: VotingPhase) -> u8 {
        match phase {
            VotingPhase::Init => self.init_percent,
            VotingPhase::Sign => self.sign_percent,
            VotingPhase::Accept => self.accept_percent,
            VotingPhase::AllConfirm => self.allconfirm_percent,
        }
    }

    pub fn reset(&mut self, phase: VotingPhase, percent: u8) {
        match phase {
            VotingPhase::Init => self.init_percent = percent,
            VotingPhase::Sign => self.sign_percent = percent,
            VotingPhase::Accept => self.accept_percent = percent,
            VotingPhase::AllConfirm => self.allconfirm_percent = percent,
        }
    }

    /// Minimum vote count needed to cross this phase's threshold out of `total_validators`.
    pub fn required_votes(&self, phase: VotingPhase, total_validators: usize) -> usize {
        let percent = self.percent(phase) as usize;
        (total_validators * percent).div_ceil(100)
    }

    /// Classify a tally against this phase's threshold. Ties resolve with precedence
    /// `EXPIRED > NO > YES`: if more than one vote crosses the threshold at once, the
    /// most conservative outcome wins.
    pub fn classify(
        &self,
        phase: VotingPhase,
        tally: &VoteTally,
        total_validators: usize,
    ) -> Option<VotingHole> {
        let threshold = self.required_votes(phase, total_validators);
        if tally.expired >= threshold {
            Some(VotingHole::Expired)
        } else if tally.no >= threshold {
            Some(VotingHole::No)
        } else if tally.yes >= threshold {
            Some(VotingHole::Yes)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> VotingThresholdPolicy {
        VotingThresholdPolicy {
            init_percent: 66,
            sign_percent: 66,
            accept_percent: 66,
            allconfirm_percent: 100,
        }
    }

    #[test]
    fn required_votes_rounds_up() {
        let p = policy();
        assert_eq!(p.required_votes(VotingPhase::Init, 3), 2);
        assert_eq!(p.required_votes(VotingPhase::Init, 4), 3);
        assert_eq!(p.required_votes(VotingPhase::AllConfirm, 4), 4);
    }

    #[test]
    fn classify_prefers_expired_over_no_and_yes_on_tie() {
        let p = policy();
        let mut tally = VoteTally::default();
        tally.yes = 2;
        tally.no = 2;
        tally.expired = 2;
        assert_eq!(
            p.classify(VotingPhase::Init, &tally, 3),
            Some(VotingHole::Expired)
        );
    }

    #[test]
    fn classify_returns_none_below_threshold() {
        let p = policy();
        let mut tally = VoteTally::default();
        tally.yes = 1;
        assert_eq!(p.classify(VotingPhase::Init, &tally, 3), None);
    }

    #[test]
    fn zero_threshold_resolves_immediately() {
        let mut p = policy();
        p.reset(VotingPhase::Init, 0);
        let tally = VoteTally::default();
        assert_eq!(p.classify(VotingPhase::Init, &tally, 3), Some(VotingHole::Expired));
    }
}
