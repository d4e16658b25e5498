use std::time::Duration;

use dashmap::DashMap;

use crate::config::NodeConfig;
use crate::crypto::Address;

use super::client::NetworkClient;

/// Tracks which configured validators have answered a `connect` handshake. A node
/// only starts proposing once enough peers are ready: it polls each
/// configured peer's endpoint at a short, fixed interval until the validator set is
/// up, rather than waiting for a push-based membership protocol.
pub struct ConnectionManager {
    self_node_id: String,
    self_endpoint: String,
    peers: Vec<(Address, String)>,
    client: NetworkClient,
    ready: DashMap<Address, bool>,
    poll_interval: Duration,
}

impl ConnectionManager {
    pub fn new(config: &NodeConfig, client: NetworkClient) -> Self {
        let peers = config
            .validators
            .iter()
            .filter_map(|p| Address::parse(&p.address).ok().map(|a| (a, p.endpoint.clone())))
            .collect();
        Self {
            self_node_id: config.node_id.clone(),
            self_endpoint: config.bind_addr.clone(),
            peers,
            client,
            ready: DashMap::new(),
            poll_interval: config.network.ready_poll_interval(),
        }
    }

    pub fn mark_ready(&self, address: Address) {
        self.ready.insert(address, true);
    }

    pub fn is_ready(&self, address: &Address) -> bool {
        self.ready.get(address).map(|v| *v).unwrap_or(false)
    }

    pub fn ready_count(&self) -> usize {
        self.ready.iter().filter(|entry| *entry.value()).count()
    }

    pub fn total_peers(&self) -> usize {
        self.peers.len()
    }

    /// All configured peers (excluding self) have confirmed the handshake.
    pub fn all_ready(&self) -> bool {
        self.ready_count() >= self.peers.len()
    }

    /// Poll every configured peer's connect endpoint once.
    pub async fn poll_once(&self) {
        for (address, endpoint) in &self.peers {
            if self.is_ready(address) {
                continue;
            }
            if self
                .client
                .connect(endpoint, &self.self_node_id, &self.self_endpoint)
                .await
                .is_ok()
            {
                self.mark_ready(*address);
            }
        }
    }

    /// Poll peers on `poll_interval` until every peer has answered. Intended to run
    /// as a background task during node startup.
    pub async fn run_until_ready(&self) {
        while !self.all_ready() {
            self.poll_once().await;
            if self.all_ready() {
                break;
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}
