//! CreatorClaim publisher CLI
//!
//! The publish pipeline itself is a library surface driven by the embedding
//! application, which injects the storage and chain SDK adapters. The CLI
//! covers the pieces that run standalone:
//!
//! ```bash
//! # Follow royalty events for a wallet
//! creatorclaim-publisher watch --wallet 9xQeWvG8...
//!
//! # Follow a specific royalty service
//! creatorclaim-publisher watch --wallet 9xQeWvG8... --endpoint ws://royalty.example:3001
//!
//! # Print the local mint ledger
//! creatorclaim-publisher records
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use creatorclaim_publisher::{Config, MintRecordStore, RoyaltyStreamClient, SledKvStore};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "creatorclaim-publisher")]
#[command(about = "Asset publishing and royalty streaming for CreatorClaim")]
struct Args {
    /// Path to config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Follow royalty events for a wallet
    Watch {
        /// Wallet address to register on the stream
        #[arg(long, env = "CREATORCLAIM_WALLET")]
        wallet: String,

        /// Royalty service WebSocket endpoint
        #[arg(long, env = "CREATORCLAIM_ROYALTY_WS")]
        endpoint: Option<String>,
    },
    /// Print the local mint ledger, oldest first
    Records {
        /// Data directory override
        #[arg(long)]
        data_dir: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("creatorclaim_publisher=info".parse()?),
        )
        .init();

    let args = Args::parse();

    let config = if let Some(config_path) = &args.config {
        Config::load(config_path)?
    } else {
        Config::default()
    };

    match args.command {
        Command::Watch { wallet, endpoint } => {
            let mut stream_config = config.stream_config();
            if let Some(endpoint) = endpoint {
                stream_config.endpoint = endpoint;
            }

            info!(wallet = %wallet, endpoint = %stream_config.endpoint, "Watching royalty stream");
            let mut client = RoyaltyStreamClient::connect(wallet, stream_config);

            tokio::signal::ctrl_c().await?;
            info!("Shutting down");
            client.shutdown().await;
        }
        Command::Records { data_dir } => {
            let mut config = config;
            if let Some(dir) = data_dir {
                config.data_dir = dir;
            }

            let kv = Arc::new(SledKvStore::open(config.records_db_path())?);
            let store = MintRecordStore::new(kv);
            let records = store.list_all()?;

            if records.is_empty() {
                println!("No mint records.");
            } else {
                for record in records {
                    println!(
                        "{}  {}  {}  {}",
                        record.timestamp,
                        record.certificate_address,
                        record.title,
                        record.metadata_uri
                    );
                }
            }
        }
    }

    Ok(())
}
