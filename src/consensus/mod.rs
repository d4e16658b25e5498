pub mod engine;
pub mod tally;
pub mod threshold;

pub use engine::{Consensus, ConsensusEvent};
pub use tally::{RunningRounds, VotingResult, VotingStateStaging};
pub use threshold::{VoteTally, VotingThresholdPolicy};
