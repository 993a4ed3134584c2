//! Arena game server binary

use std::path::PathBuf;

use clap::Parser;
use log::{error, info};

use arena_server::network::Server;
use arena_server::{BlockedCells, ServerConfig, World};

#[derive(Debug, Parser)]
#[command(name = "arena-server", about = "Authoritative arena game server")]
struct Args {
    /// Server configuration file
    #[arg(short, long, default_value = "server_config.json")]
    config: PathBuf,

    /// Blocked terrain side file
    #[arg(short, long, default_value = "blocked_cells.json")]
    blocked: PathBuf,

    /// Override the configured UDP port
    #[arg(short, long)]
    port: Option<u16>,

    /// Seed the random source for reproducible runs
    #[arg(long)]
    seed: Option<u64>,
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    info!("Starting arena server...");

    let mut config = ServerConfig::load_or_default(&args.config);
    if let Some(port) = args.port {
        config.port = port;
    }
    let blocked = BlockedCells::load_or_empty(&args.blocked);
    let port = config.port;

    let world = match args.seed {
        Some(seed) => {
            info!("Using RNG seed {}", seed);
            World::with_seed(config, blocked, seed)
        }
        None => World::new(config, blocked),
    };

    let server = match Server::bind(("0.0.0.0", port)).await {
        Ok(s) => s,
        Err(e) => {
            error!("Failed to start server on port {}: {}", port, e);
            return;
        }
    };

    if let Err(e) = server.run(world).await {
        error!("Server stopped: {}", e);
    }
}
