pub mod client;
pub mod connection_manager;
pub mod message;
pub mod server;

pub use client::NetworkClient;
pub use connection_manager::ConnectionManager;
pub use message::{Envelope, MessageType};

use crate::types::{Ballot, Transaction};

/// A message decoded off the wire and handed to the node runner for checking.
#[derive(Clone, Debug)]
pub enum InboundMessage {
    Connect { node_id: String, endpoint: String },
    Transaction(Transaction),
    Ballot(Ballot),
}
