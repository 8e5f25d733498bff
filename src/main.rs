//! nanochain CLI
//!
//! Starts a ledger node (p2p + REST + optional mining) or manages the
//! local wallet. Bootstrap order: persisted chain is loaded and
//! replayed into the ledger before any network or mining activity.

use clap::{Parser, Subcommand};
use nanochain::api::{create_router, ApiState};
use nanochain::core::{ChainParams, Ledger};
use nanochain::mining::TransactionPool;
use nanochain::network::{Node, NodeConfig};
use nanochain::storage::ChainStore;
use nanochain::wallet::Wallet;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Parser)]
#[command(name = "nanochain")]
#[command(version = "0.1.0")]
#[command(about = "A minimal peer-replicated UTXO ledger", long_about = None)]
struct Cli {
    /// Data directory for chain and wallet storage
    #[arg(short, long, default_value = ".nanochain")]
    data_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a node
    Start {
        /// P2P listening port
        #[arg(long, default_value = "6001")]
        p2p_port: u16,

        /// REST API port
        #[arg(long, default_value = "3001")]
        http_port: u16,

        /// Peers to connect to at startup (host:port)
        #[arg(long)]
        peer: Vec<String>,

        /// Mine continuously to the local wallet's address
        #[arg(long)]
        mine: bool,

        /// Override the mining reward address
        #[arg(long)]
        reward_address: Option<String>,

        /// Override the fee address (defaults to the reward address)
        #[arg(long)]
        fee_address: Option<String>,
    },

    /// Wallet operations
    Wallet {
        #[command(subcommand)]
        action: WalletCommands,
    },

    /// Show the locally persisted chain
    Info,
}

#[derive(Subcommand)]
enum WalletCommands {
    /// Create the local wallet if it does not exist and print its address
    New,

    /// Print the local wallet's address
    Show,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Start {
            p2p_port,
            http_port,
            peer,
            mine,
            reward_address,
            fee_address,
        } => {
            start_node(
                cli.data_dir,
                p2p_port,
                http_port,
                peer,
                mine,
                reward_address,
                fee_address,
            )
            .await
        }
        Commands::Wallet { action } => wallet_command(cli.data_dir, action),
        Commands::Info => chain_info(cli.data_dir),
    }
}

async fn start_node(
    data_dir: PathBuf,
    p2p_port: u16,
    http_port: u16,
    bootstrap_peers: Vec<String>,
    mine: bool,
    reward_address: Option<String>,
    fee_address: Option<String>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let store = Arc::new(ChainStore::new(data_dir.join("chain"))?);

    // storage -> ledger -> network/mining, in that order
    let ledger = match store.load()? {
        Some(blocks) => {
            log::info!("Loaded {} persisted blocks, replaying", blocks.len());
            Ledger::from_blocks(ChainParams::default(), blocks)?
        }
        None => {
            log::info!("No persisted chain, starting from genesis");
            Ledger::new(ChainParams::default())
        }
    };

    let ledger = Arc::new(RwLock::new(ledger));
    let pool = Arc::new(RwLock::new(TransactionPool::new()));

    let reward_address = match (mine, reward_address) {
        (_, Some(addr)) => Some(addr),
        (true, None) => {
            let wallet = Wallet::load_or_create(&data_dir.join("wallet.json"))?;
            Some(wallet.address())
        }
        (false, None) => None,
    };

    let config = NodeConfig {
        p2p_port,
        bootstrap_peers,
        reward_address,
        fee_address,
    };

    let mut node = Node::new(config, ledger.clone(), pool.clone());

    // persist the chain whenever the tip moves
    let mut tip_rx = node.sync.tip_watch();
    let save_ledger = ledger.clone();
    let save_store = store.clone();
    tokio::spawn(async move {
        while tip_rx.changed().await.is_ok() {
            let blocks = {
                let ledger = save_ledger.read().await;
                ledger.blocks().to_vec()
            };
            if let Err(e) = save_store.save(&blocks) {
                log::error!("Failed to persist chain: {}", e);
            }
        }
    });

    let api_state = ApiState {
        ledger,
        pool,
        sync: node.sync.clone(),
        node: node.handle(),
    };
    let router = create_router(api_state);
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", http_port)).await?;
    log::info!("REST API listening on 0.0.0.0:{}", http_port);
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router).await {
            log::error!("API server error: {}", e);
        }
    });

    node.start().await
}

fn wallet_command(
    data_dir: PathBuf,
    action: WalletCommands,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let path = data_dir.join("wallet.json");

    match action {
        WalletCommands::New => {
            let wallet = Wallet::load_or_create(&path)?;
            println!("Address: {}", wallet.address());
        }
        WalletCommands::Show => {
            let wallet = Wallet::load(&path)?;
            println!("Address: {}", wallet.address());
        }
    }
    Ok(())
}

fn chain_info(data_dir: PathBuf) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let store = ChainStore::new(data_dir.join("chain"))?;

    match store.load()? {
        Some(blocks) => {
            let ledger = Ledger::from_blocks(ChainParams::default(), blocks)?;
            println!("Height:     {}", ledger.height());
            println!("Tip hash:   {}", ledger.latest_block().hash);
            println!("Total work: {}", ledger.accumulated_work());
            println!("UTXO count: {}", ledger.utxo_set().len());
        }
        None => println!("No persisted chain in {}", data_dir.display()),
    }
    Ok(())
}
