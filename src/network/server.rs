use std::convert::Infallible;
use std::net::SocketAddr;

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;
use warp::http::StatusCode;
use warp::{sse::Event, Filter, Rejection, Reply};

use crate::error::NodeError;
use crate::types::Ballot;

use super::message::{Envelope, MessageType};
use super::InboundMessage;

/// Static identity fields a `GET /node` caller needs, captured once at startup.
#[derive(Clone, Serialize)]
pub struct NodeInfo {
    pub node_id: String,
    pub network_id: String,
    pub bind_addr: String,
    pub total_validators: usize,
}

#[derive(Deserialize)]
struct ConnectBody {
    node_id: String,
    endpoint: String,
}

/// Inbound HTTP transport: `POST /node/message` hands validated envelopes to the node
/// runner over `inbound_tx`; standalone `POST /node/connect` and `POST /node/ballot`
/// accept the same payloads unwrapped; `GET /node/stream` fans out every event published
/// on `events` as an SSE stream; `GET /node` reports static node identity.
pub async fn serve(
    bind_addr: SocketAddr,
    inbound_tx: mpsc::Sender<InboundMessage>,
    events: broadcast::Sender<Envelope>,
    info: NodeInfo,
) {
    let routes = routes(inbound_tx, events, info);
    warp::serve(routes).run(bind_addr).await;
}

pub fn routes(
    inbound_tx: mpsc::Sender<InboundMessage>,
    events: broadcast::Sender<Envelope>,
    info: NodeInfo,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    let message_route = warp::path!("node" / "message")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_sender(inbound_tx.clone()))
        .and_then(handle_message);

    let connect_route = warp::path!("node" / "connect")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_sender(inbound_tx.clone()))
        .and_then(handle_connect);

    let ballot_route = warp::path!("node" / "ballot")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_sender(inbound_tx))
        .and_then(handle_ballot);

    let stream_route = warp::path!("node" / "stream")
        .and(warp::get())
        .and(with_events(events))
        .map(handle_stream);

    let info_route = warp::path!("node")
        .and(warp::get())
        .and(with_info(info))
        .map(handle_info);

    message_route
        .or(connect_route)
        .or(ballot_route)
        .or(stream_route)
        .or(info_route)
        .recover(handle_rejection)
}

fn with_sender(
    tx: mpsc::Sender<InboundMessage>,
) -> impl Filter<Extract = (mpsc::Sender<InboundMessage>,), Error = Infallible> + Clone {
    warp::any().map(move || tx.clone())
}

fn with_events(
    events: broadcast::Sender<Envelope>,
) -> impl Filter<Extract = (broadcast::Sender<Envelope>,), Error = Infallible> + Clone {
    warp::any().map(move || events.clone())
}

fn with_info(info: NodeInfo) -> impl Filter<Extract = (NodeInfo,), Error = Infallible> + Clone {
    warp::any().map(move || info.clone())
}

async fn send_inbound(message: InboundMessage, inbound_tx: mpsc::Sender<InboundMessage>) -> Result<(), Rejection> {
    inbound_tx
        .send(message)
        .await
        .map_err(|_| warp::reject::custom(RejectNodeError(NodeError::Network("inbound channel closed".into()))))
}

async fn handle_message(
    envelope: Envelope,
    inbound_tx: mpsc::Sender<InboundMessage>,
) -> Result<impl Reply, Rejection> {
    let message = match envelope.message_type {
        MessageType::Connect => {
            let node_id = envelope
                .data
                .get("node_id")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string();
            let endpoint = envelope
                .data
                .get("endpoint")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string();
            InboundMessage::Connect { node_id, endpoint }
        }
        MessageType::Transaction => {
            let tx = envelope
                .decode_transaction()
                .map_err(|e| warp::reject::custom(RejectNodeError(e)))?;
            InboundMessage::Transaction(tx)
        }
        MessageType::Ballot => {
            let ballot = envelope
                .decode_ballot()
                .map_err(|e| warp::reject::custom(RejectNodeError(e)))?;
            InboundMessage::Ballot(ballot)
        }
    };

    send_inbound(message, inbound_tx).await?;
    Ok(warp::reply::with_status("accepted", StatusCode::ACCEPTED))
}

async fn handle_connect(body: ConnectBody, inbound_tx: mpsc::Sender<InboundMessage>) -> Result<impl Reply, Rejection> {
    send_inbound(
        InboundMessage::Connect {
            node_id: body.node_id,
            endpoint: body.endpoint,
        },
        inbound_tx,
    )
    .await?;
    Ok(warp::reply::with_status("accepted", StatusCode::ACCEPTED))
}

async fn handle_ballot(ballot: Ballot, inbound_tx: mpsc::Sender<InboundMessage>) -> Result<impl Reply, Rejection> {
    send_inbound(InboundMessage::Ballot(ballot), inbound_tx).await?;
    Ok(warp::reply::with_status("accepted", StatusCode::ACCEPTED))
}

fn handle_info(info: NodeInfo) -> impl Reply {
    warp::reply::json(&info)
}

fn handle_stream(events: broadcast::Sender<Envelope>) -> impl Reply {
    let stream = BroadcastStream::new(events.subscribe()).filter_map(|item| match item {
        Ok(envelope) => serde_json::to_string(&envelope).ok().map(|json| Ok(Event::default().data(json))),
        Err(_) => None,
    });
    warp::sse::reply(warp::sse::keep_alive().stream(stream))
}

#[derive(Debug)]
struct RejectNodeError(NodeError);

impl warp::reject::Reject for RejectNodeError {}

async fn handle_rejection(err: Rejection) -> Result<impl Reply, Infallible> {
    let (status, message) = if let Some(RejectNodeError(node_err)) = err.find() {
        (
            StatusCode::from_u16(node_err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            node_err.to_string(),
        )
    } else if err.is_not_found() {
        (StatusCode::NOT_FOUND, "not found".to_string())
    } else {
        (StatusCode::BAD_REQUEST, "bad request".to_string())
    };

    let body = serde_json::json!({ "type": "problem", "title": message, "status": status.as_u16() });
    Ok(warp::reply::with_status(warp::reply::json(&body), status))
}
