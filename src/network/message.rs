use serde::{Deserialize, Serialize};

use crate::error::NodeResult;
use crate::types::{Ballot, Transaction};

/// The wire message kinds a validator exchanges with its peers.
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum MessageType {
    Connect,
    Transaction,
    Ballot,
}

/// JSON envelope every `/node/message` request carries: a type tag plus the typed
/// payload as a JSON value, so the transport layer doesn't need to know the payload
/// shape up front.
#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub message_type: MessageType,
    pub data: serde_json::Value,
}

impl Envelope {
    pub fn connect(node_id: &str, endpoint: &str) -> Self {
        Self {
            message_type: MessageType::Connect,
            data: serde_json::json!({ "node_id": node_id, "endpoint": endpoint }),
        }
    }

    pub fn transaction(tx: &Transaction) -> NodeResult<Self> {
        Ok(Self {
                message_type: MessageType::Transaction,
                data: serde_json::to_value(tx)?,
        })
    }

    pub fn ballot(ballot: &Ballot) -> NodeResult<Self> {
        Ok(Self {
                message_type: MessageType::Ballot,
                data: serde_json::to_value(ballot)?,
        })
    }

    pub fn decode_transaction(&self) -> NodeResult<Transaction> {
        Ok(serde_json::from_value(self.data.clone())?)
    }

    pub fn decode_ballot(&self) -> NodeResult<Ballot> {
        Ok(serde_json::from_value(self.data.clone())?)
    }
}
