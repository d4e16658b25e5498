use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;
use warp::http::StatusCode;
use warp::{Filter, Rejection, Reply};

use crate::crypto::Address;
use crate::network::message::{Envelope, MessageType};
use crate::storage::Store;
use crate::types::{BlockAccount, Hash, Transaction};

/// A HAL-style resource envelope: the payload plus a `_links` map, matching the
/// original node's read API shape.
#[derive(Serialize)]
struct Resource<T: Serialize> {
    #[serde(flatten)]
    body: T,
    _links: serde_json::Value,
}

#[derive(Serialize)]
struct AccountView {
    address: String,
    balance: u64,
    sequence_id: u64,
    frozen: bool,
}

impl From<&BlockAccount> for AccountView {
    fn from(account: &BlockAccount) -> Self {
        Self {
            address: account.address.to_string(),
            balance: account.balance.gon(),
            sequence_id: account.sequence_id,
            frozen: account.frozen,
        }
    }
}

#[derive(Serialize)]
struct TransactionView {
    hash: String,
    source: String,
    fee: u64,
    sequence_id: u64,
    operation_count: usize,
}

impl From<&Transaction> for TransactionView {
    fn from(tx: &Transaction) -> Self {
        Self {
            hash: tx.hash().to_string(),
            source: tx.source().to_string(),
            fee: tx.fee().gon(),
            sequence_id: tx.sequence_id(),
            operation_count: tx.body.operations.len(),
        }
    }
}

pub fn routes(
    storage: Arc<dyn Store>,
    events: broadcast::Sender<Envelope>,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    let account_route = warp::path!("api" / "account" / String)
        .and(warp::get())
        .and(with_storage(storage.clone()))
        .and_then(get_account);

    let account_transactions_route = warp::path!("api" / "account" / String / "transactions")
        .and(warp::get())
        .and(with_storage(storage.clone()))
        .and_then(get_account_transactions);

    let account_operations_route = warp::path!("api" / "account" / String / "operations")
        .and(warp::get())
        .and(with_storage(storage.clone()))
        .and_then(get_account_operations);

    let transactions_list_route = warp::path!("api" / "transactions")
        .and(warp::get())
        .and(warp::query::<ListQuery>())
        .and(with_storage(storage.clone()))
        .and_then(list_transactions);

    let transactions_route = warp::path!("api" / "transactions" / String)
        .and(warp::get())
        .and(with_storage(storage.clone()))
        .and_then(get_transaction);

    let block_route = warp::path!("api" / "blocks" / u64)
        .and(warp::get())
        .and(with_storage(storage.clone()))
        .and_then(get_block);

    let subscribe_route = warp::path!("api" / "subscribe")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_events(events))
        .and_then(post_subscribe);

    account_route
        .or(account_transactions_route)
        .or(account_operations_route)
        .or(transactions_list_route)
        .or(transactions_route)
        .or(block_route)
        .or(subscribe_route)
        .recover(handle_rejection)
}

fn with_storage(
    storage: Arc<dyn Store>,
) -> impl Filter<Extract = (Arc<dyn Store>,), Error = std::convert::Infallible> + Clone {
    warp::any().map(move || storage.clone())
}

fn with_events(
    events: broadcast::Sender<Envelope>,
) -> impl Filter<Extract = (broadcast::Sender<Envelope>,), Error = std::convert::Infallible> + Clone {
    warp::any().map(move || events.clone())
}

fn parse_address(raw: &str) -> Result<Address, Rejection> {
    Address::parse(raw).map_err(|e| warp::reject::custom(ApiError(e)))
}

fn parse_hash(raw: &str) -> Result<Hash, Rejection> {
    Hash::parse(raw).map_err(|e| warp::reject::custom(ApiError(e)))
}

async fn get_account(address: String, storage: Arc<dyn Store>) -> Result<impl Reply, Rejection> {
    let address = parse_address(&address)?;
    let account = storage
        .get_account(&address)
        .map_err(|e| warp::reject::custom(ApiError(e)))?
        .ok_or_else(warp::reject::not_found)?;

    let resource = Resource {
        body: AccountView::from(&account),
        _links: json!({ "self": { "href": format!("/api/account/{}", address) } }),
    };
    Ok(warp::reply::json(&resource))
}

async fn get_account_transactions(address: String, storage: Arc<dyn Store>) -> Result<impl Reply, Rejection> {
    let address = parse_address(&address)?;
    let hashes = storage
        .get_account_transaction_hashes(&address)
        .map_err(|e| warp::reject::custom(ApiError(e)))?;
    let txs: Vec<TransactionView> = hashes
        .iter()
        .filter_map(|hash| storage.get_block_transaction(hash).ok().flatten())
        .map(|tx| TransactionView::from(&tx))
        .collect();
    Ok(warp::reply::json(&json!({ "transactions": txs })))
}

async fn get_account_operations(address: String, storage: Arc<dyn Store>) -> Result<impl Reply, Rejection> {
    let address = parse_address(&address)?;
    let hashes = storage
        .get_account_operation_hashes(&address)
        .map_err(|e| warp::reject::custom(ApiError(e)))?;
    Ok(warp::reply::json(
        &json!({ "operations": hashes.iter().map(|h| h.to_string()).collect::<Vec<_>>() }),
    ))
}

#[derive(Deserialize)]
struct ListQuery {
    limit: Option<usize>,
}

const DEFAULT_TRANSACTIONS_LIMIT: usize = 20;
const MAX_TRANSACTIONS_LIMIT: usize = 200;

/// Newest-first walk over committed blocks, since there is no flat transaction index
/// to page over directly: same fetch-hashes-then-resolve shape as `get_account_transactions`.
async fn list_transactions(query: ListQuery, storage: Arc<dyn Store>) -> Result<impl Reply, Rejection> {
    let limit = query.limit.unwrap_or(DEFAULT_TRANSACTIONS_LIMIT).min(MAX_TRANSACTIONS_LIMIT);
    let mut height = storage.latest_height().map_err(|e| warp::reject::custom(ApiError(e)))?;
    let mut txs = Vec::new();

    while height >= 1 && txs.len() < limit {
        if let Some(block) = storage.block_at_height(height).map_err(|e| warp::reject::custom(ApiError(e)))? {
            for hash in block.transactions.iter().rev() {
                if txs.len() >= limit {
                    break;
                }
                if let Some(tx) = storage.get_block_transaction(hash).map_err(|e| warp::reject::custom(ApiError(e)))? {
                    txs.push(TransactionView::from(&tx));
                }
            }
        }
        height -= 1;
    }

    Ok(warp::reply::json(&json!({ "transactions": txs })))
}

async fn get_transaction(hash: String, storage: Arc<dyn Store>) -> Result<impl Reply, Rejection> {
    let hash = parse_hash(&hash)?;
    let tx = storage
        .get_block_transaction(&hash)
        .map_err(|e| warp::reject::custom(ApiError(e)))?
        .ok_or_else(warp::reject::not_found)?;

    let resource = Resource {
        body: TransactionView::from(&tx),
        _links: json!({ "self": { "href": format!("/api/transactions/{}", hash) } }),
    };
    Ok(warp::reply::json(&resource))
}

async fn get_block(height: u64, storage: Arc<dyn Store>) -> Result<impl Reply, Rejection> {
    let block = storage
        .block_at_height(height)
        .map_err(|e| warp::reject::custom(ApiError(e)))?
        .ok_or_else(warp::reject::not_found)?;

    let resource = json!({
            "height": block.height,
            "hash": block.hash.to_string(),
            "total_txs": block.total_txs,
            "total_ops": block.total_ops,
            "_links": { "self": { "href": format!("/api/blocks/{}", block.height) } },
    });
    Ok(warp::reply::json(&resource))
}

/// One subscription condition: `type` narrows to a message kind, `address` narrows to
/// envelopes whose payload mentions that address anywhere (sender, proposer, source,
/// or target). Both are optional; an empty condition list matches every event.
#[derive(Deserialize, Clone)]
#[serde(rename_all = "kebab-case")]
struct SubscribeCondition {
    #[serde(rename = "type")]
    message_type: Option<MessageType>,
    address: Option<String>,
}

impl SubscribeCondition {
    fn matches(&self, envelope: &Envelope) -> bool {
        if let Some(wanted) = self.message_type {
            if wanted != envelope.message_type {
                return false;
            }
        }
        if let Some(address) = &self.address {
            if !envelope.data.to_string().contains(address.as_str()) {
                return false;
            }
        }
        true
    }
}

/// Opens an event stream filtered to the posted conditions, same transport shape as
/// `node/stream` but scoped to what the caller asked for.
async fn post_subscribe(
    conditions: Vec<SubscribeCondition>,
    events: broadcast::Sender<Envelope>,
) -> Result<impl Reply, Rejection> {
    let stream = BroadcastStream::new(events.subscribe()).filter_map(move |item| match item {
        Ok(envelope) if conditions.is_empty() || conditions.iter().any(|c| c.matches(&envelope)) => {
            serde_json::to_string(&envelope).ok().map(|json| Ok(warp::sse::Event::default().data(json)))
        }
        _ => None,
    });
    Ok(warp::sse::reply(warp::sse::keep_alive().stream(stream)))
}

#[derive(Debug)]
struct ApiError(crate::error::NodeError);

impl warp::reject::Reject for ApiError {}

async fn handle_rejection(err: Rejection) -> Result<impl Reply, std::convert::Infallible> {
    let (status, title) = if let Some(ApiError(node_err)) = err.find() {
        (
            StatusCode::from_u16(node_err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            node_err.to_string(),
        )
    } else if err.is_not_found() {
        (StatusCode::NOT_FOUND, "resource not found".to_string())
    } else {
        (StatusCode::BAD_REQUEST, "bad request".to_string())
    };

    let body = json!({ "type": "problem", "title": title, "status": status.as_u16() });
    Ok(warp::reply::with_status(warp::reply::json(&body), status))
}
