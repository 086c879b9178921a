//! RallyCast - real-time presence and relay hub
//!
//! Binds the WebSocket listener, wires the registry, router and relay
//! together, and serves until the listener fails.

use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};

use rallycast::config::Config;
use rallycast::registry::Registry;
use rallycast::relay::Relay;
use rallycast::router::EventRouter;
use rallycast::server::{AppState, run};
use rallycast::store::BlockStore;

#[cfg(feature = "postgres")]
use rallycast::store::PostgresBlockStore;

#[cfg(feature = "memory")]
use rallycast::store::MemoryBlockStore;

#[derive(Parser, Debug)]
#[command(name = "rallycast")]
#[command(about = "Real-time presence and relay hub for the game platform")]
#[command(version)]
struct Args {
    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

async fn init_block_store(config: &Config) -> anyhow::Result<Arc<dyn BlockStore>> {
    #[cfg(feature = "memory")]
    {
        let _ = config;
        info!("Memory block store initialized (no persistence)");
        return Ok(Arc::new(MemoryBlockStore::new()));
    }

    #[cfg(all(not(feature = "memory"), feature = "postgres"))]
    {
        let Some(ref database_url) = config.database_url else {
            anyhow::bail!("RALLYCAST_DATABASE_URL is required with the postgres block store");
        };
        let store = PostgresBlockStore::new(database_url).await?;
        info!("PostgreSQL block store connected");
        Ok(Arc::new(store))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .json()
        .with_env_filter(&args.log_level)
        .init();

    info!("RallyCast v{}", env!("CARGO_PKG_VERSION"));

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load config: {}", e);
            std::process::exit(1);
        }
    };

    let blocks = init_block_store(&config).await?;

    let registry = Arc::new(Registry::new());
    let relay = Relay::new(registry.clone(), blocks);
    let router = Arc::new(EventRouter::new(registry.clone(), relay));

    let state = AppState {
        registry,
        router,
        config: Arc::new(config),
    };

    run(state).await
}
