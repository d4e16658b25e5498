use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tokio::sync::mpsc;
use tracing::{error, info};

use isaac_node::config::{NodeConfig, PeerConfig, StorageBackend};
use isaac_node::crypto::KeyPair;
use isaac_node::network::{server, InboundMessage};
use isaac_node::node::NodeRunner;
use isaac_node::state_manager::RoundRobin;
use isaac_node::storage::{MemoryStore, RocksStore, Store};

/// ISAAC validator node.
#[derive(Parser, Debug)]
#[command(name = "isaac-node", version, about)]
struct Args {
    /// Path to a TOML or JSON config file. CLI flags below override its contents.
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    bind: Option<String>,

    #[arg(long)]
    network_id: Option<String>,

    #[arg(long)]
    threshold: Option<u8>,

    #[arg(long)]
    timeout_init: Option<u64>,
    #[arg(long)]
    timeout_sign: Option<u64>,
    #[arg(long)]
    timeout_accept: Option<u64>,
    #[arg(long)]
    timeout_allconfirm: Option<u64>,

    #[arg(long)]
    storage_path: Option<PathBuf>,

    /// Comma-separated `address@endpoint` pairs for the other validators.
    #[arg(long, value_delimiter = ',')]
    validators: Vec<String>,

    /// Hex-encoded 32-byte seed for a deterministic keypair. Random if omitted.
    #[arg(long)]
    seed: Option<String>,
}

impl Args {
    fn apply(self, mut config: NodeConfig) -> Result<NodeConfig, String> {
        if let Some(bind) = self.bind {
            config.bind_addr = bind;
        }
        if let Some(network_id) = self.network_id {
            config.network_id = network_id;
        }
        if let Some(threshold) = self.threshold {
            config.consensus.threshold_init_percent = threshold;
            config.consensus.threshold_sign_percent = threshold;
            config.consensus.threshold_accept_percent = threshold;
        }
        if let Some(ms) = self.timeout_init {
            config.consensus.timeout_init_ms = ms;
        }
        if let Some(ms) = self.timeout_sign {
            config.consensus.timeout_sign_ms = ms;
        }
        if let Some(ms) = self.timeout_accept {
            config.consensus.timeout_accept_ms = ms;
        }
        if let Some(ms) = self.timeout_allconfirm {
            config.consensus.timeout_allconfirm_ms = ms;
        }
        if let Some(path) = self.storage_path {
            config.storage.data_dir = path;
        }
        if !self.validators.is_empty() {
            config.validators = self
                .validators
                .iter()
                .map(|entry| {
                    let (address, endpoint) = entry
                        .split_once('@')
                        .ok_or_else(|| format!("invalid --validators entry: {}", entry))?;
                    Ok(PeerConfig {
                        address: address.to_string(),
                        endpoint: endpoint.to_string(),
                    })
                })
                .collect::<Result<Vec<_>, String>>()?;
        }
        Ok(config)
    }
}

fn init_tracing(config: &isaac_node::config::LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_new(&config.level)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);
    match config.format {
        isaac_node::config::LogFormat::Json => subscriber.json().init(),
        isaac_node::config::LogFormat::Plain => subscriber.init(),
    }
}

fn load_keypair(seed_hex: Option<String>) -> Result<KeyPair, String> {
    match seed_hex {
        Some(hex_str) => {
            let bytes = hex::decode(hex_str).map_err(|e| format!("invalid --seed hex: {}", e))?;
            let seed: [u8; 32] = bytes
                .try_into()
                .map_err(|_| "seed must be exactly 32 bytes".to_string())?;
            Ok(KeyPair::from_seed(&seed))
        }
        None => Ok(KeyPair::generate(&mut rand_core::OsRng)),
    }
}

fn open_storage(config: &NodeConfig) -> Result<Arc<dyn Store>, String> {
    match config.storage.backend {
        StorageBackend::Memory => Ok(Arc::new(MemoryStore::new())),
        StorageBackend::RocksDb => {
            std::fs::create_dir_all(&config.storage.data_dir)
                .map_err(|e| format!("failed to create storage dir: {}", e))?;
            RocksStore::open(&config.storage.data_dir)
                .map(|store| Arc::new(store) as Arc<dyn Store>)
                .map_err(|e| format!("failed to open rocksdb: {}", e))
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let base_config = match &args.config {
        Some(path) => match NodeConfig::load_from_file(path) {
            Ok(cfg) => cfg,
            Err(e) => {
                eprintln!("failed to load config: {}", e);
                return ExitCode::from(1);
            }
        },
        None => NodeConfig::default(),
    };

    let seed = args.seed.clone();
    let config = match args.apply(base_config) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::from(1);
        }
    };

    if let Err(e) = config.validate() {
        eprintln!("invalid configuration: {}", e);
        return ExitCode::from(1);
    }

    init_tracing(&config.logging);

    let keypair = match load_keypair(seed) {
        Ok(kp) => kp,
        Err(e) => {
            error!("{}", e);
            return ExitCode::from(1);
        }
    };
    info!(address = %keypair.address(), "node identity");

    let storage = match open_storage(&config) {
        Ok(store) => store,
        Err(e) => {
            error!("{}", e);
            return ExitCode::from(1);
        }
    };

    let bind_addr: std::net::SocketAddr = match config.bind_addr.parse() {
        Ok(addr) => addr,
        Err(e) => {
            error!("invalid bind address: {}", e);
            return ExitCode::from(1);
        }
    };

    let (inbound_tx, mut inbound_rx) = mpsc::channel::<InboundMessage>(1024);
    let (timeout_tx, mut timeout_rx) = mpsc::channel(256);

    let mut runner = match NodeRunner::new(
        config.clone(),
        keypair,
        storage.clone(),
        Box::new(RoundRobin),
        timeout_tx,
    ) {
        Ok(r) => r,
        Err(e) => {
            error!("failed to start node: {}", e);
            return ExitCode::from(2);
        }
    };

    let events = runner.events();
    let api_events = runner.events();

    let node_info = server::NodeInfo {
        node_id: config.node_id.clone(),
        network_id: config.network_id.clone(),
        bind_addr: config.bind_addr.clone(),
        total_validators: config.total_validators(),
    };
    tokio::spawn(server::serve(bind_addr, inbound_tx, events, node_info));

    let api_storage = storage.clone();
    if config.metrics.enabled {
        if let Ok(api_bind) = config.metrics.bind_addr.parse::<std::net::SocketAddr>() {
            tokio::spawn(async move {
                warp::serve(isaac_node::api::routes(api_storage, api_events)).run(api_bind).await;
            });
        }
    }

    let genesis = isaac_node::types::Round::genesis();
    if let Err(e) = runner.start_round(genesis).await {
        error!("failed to start genesis round: {}", e);
        return ExitCode::from(2);
    }

    loop {
        tokio::select! {
            Some(message) = inbound_rx.recv() => {
                if let Err(e) = runner.handle_inbound(message).await {
                    if !e.is_checker_stop() {
                        error!("error handling inbound message: {}", e);
                    }
                }
            }
            Some(timeout) = timeout_rx.recv() => {
                if let Err(e) = runner.handle_timeout(timeout).await {
                    error!("error handling phase timeout: {}", e);
                }
            }
            else => break,
        }
    }

    ExitCode::from(0)
}
