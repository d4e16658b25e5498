use crate::config::{NodeConfig, PeerConfig};
use crate::crypto::{Address, KeyPair};

/// Builds the fixed validator set and per-node configs needed to exercise the
/// ballot state machine deterministically: short
/// timeouts are intentionally avoided here in favor of `NodeConfig::default_for_testing`'s
/// hour-long ones, so tests control phase advancement explicitly instead of racing
/// a background timer.
pub struct TestHarness {
    pub keypairs: Vec<KeyPair>,
    pub network_id: String,
}

impl TestHarness {
    pub fn new(node_count: usize) -> Self {
        let keypairs: Vec<KeyPair> = (0..node_count)
            .map(|i| {
                let mut seed = [0u8; 32];
                seed[0] = i as u8 + 1;
                KeyPair::from_seed(&seed)
        })
            .collect();
        Self {
            keypairs,
            network_id: "isaac-test-network".to_string(),
        }
    }

    pub fn addresses(&self) -> Vec<Address> {
        self.keypairs.iter().map(|kp| kp.address()).collect()
    }

    /// Config for node `index`, listing every other node as a validator peer.
    pub fn config_for(&self, index: usize) -> NodeConfig {
        let mut config = NodeConfig::default_for_testing();
        config.node_id = self.keypairs[index].address().to_string();
        config.network_id = self.network_id.clone();
        config.validators = self
            .keypairs
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != index)
            .map(|(i, kp)| PeerConfig {
                address: kp.address().to_string(),
                endpoint: format!("http://127.0.0.1:{}", 9000 + i),
        })
            .collect();
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn harness_builds_distinct_validator_sets_per_node() {
        let harness = TestHarness::new(3);
        let config0 = harness.config_for(0);
        assert_eq!(config0.validators.len(), 2);
        assert!(!config0.validators.iter().any(|p| p.address == config0.node_id));
    }
}
