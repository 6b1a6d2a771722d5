//! Game server binary.
//!
//! # Usage
//!
//! ```bash
//! # Standalone with in-memory services and no mobs
//! tmserv --bind 0.0.0.0:8281
//!
//! # With world data
//! tmserv --bind 0.0.0.0:8281 \
//!     --mob-templates data/mobs.json \
//!     --spawn-config data/spawns.json
//! ```

use std::sync::Arc;

use clap::Parser;
use tmserv_server::{
    DriverConfig, MemoryAuth, MemoryCharacters, RuntimeConfig, Server,
};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// WYD-lineage game server
#[derive(Parser, Debug)]
#[command(name = "tmserv")]
#[command(about = "Legacy-protocol MMORPG game server")]
#[command(version)]
struct Args {
    /// Address to bind to
    #[arg(short, long, default_value = "0.0.0.0:8281")]
    bind: String,

    /// Maximum concurrent connections
    #[arg(long, default_value = "10000")]
    max_connections: usize,

    /// Simulation tick in milliseconds
    #[arg(long, default_value = "100")]
    tick_ms: u64,

    /// Path to the mob template catalog (JSON)
    #[arg(long)]
    mob_templates: Option<String>,

    /// Path to the spawn group configuration (JSON)
    #[arg(long)]
    spawn_config: Option<String>,

    /// Account names granted GM permission
    #[arg(long)]
    gm_account: Vec<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    tracing::info!("tmserv starting, binding to {}", args.bind);

    let auth = MemoryAuth::new();
    for account in &args.gm_account {
        auth.grant_gm(account);
    }

    let config = RuntimeConfig {
        bind_address: args.bind,
        mob_templates_path: args.mob_templates,
        spawn_config_path: args.spawn_config,
        driver: DriverConfig {
            max_connections: args.max_connections,
            tick_ms: args.tick_ms,
            ..DriverConfig::default()
        },
    };

    let server = Server::bind(config, Arc::new(auth), Arc::new(MemoryCharacters::new())).await?;

    tracing::info!("server listening on {}", server.local_addr()?);

    server.run().await?;

    Ok(())
}
