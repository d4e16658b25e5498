use std::time::Duration;

use crate::error::{NodeError, NodeResult};
use crate::types::{Ballot, Transaction};

use super::message::Envelope;

/// Outbound transport to peer validators, built on `reqwest`.
#[derive(Clone)]
pub struct NetworkClient {
    http: reqwest::Client,
}

impl NetworkClient {
    pub fn new(request_timeout: Duration, connect_timeout: Duration) -> NodeResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| NodeError::Network(e.to_string()))?;
        Ok(Self { http })
    }

    async fn post(&self, endpoint: &str, envelope: &Envelope) -> NodeResult<()> {
        let url = format!("{}/node/message", endpoint.trim_end_matches('/'));
        let response = self
            .http
            .post(&url)
            .json(envelope)
            .send()
            .await
            .map_err(|e| NodeError::Network(e.to_string()))?;
        if !response.status().is_success() {
            return Err(NodeError::Network(format!(
                        "peer {} responded with {}",
                        endpoint,
                        response.status()
            )));
        }
        Ok(())
    }

    pub async fn send_transaction(&self, endpoint: &str, tx: &Transaction) -> NodeResult<()> {
        self.post(endpoint, &Envelope::transaction(tx)?).await
    }

    pub async fn send_ballot(&self, endpoint: &str, ballot: &Ballot) -> NodeResult<()> {
        self.post(endpoint, &Envelope::ballot(ballot)?).await
    }

    pub async fn connect(&self, endpoint: &str, self_node_id: &str, self_endpoint: &str) -> NodeResult<()> {
        self.post(endpoint, &Envelope::connect(self_node_id, self_endpoint)).await
    }
}
