use arena_server::directory::MemoryDirectory;
use arena_server::store::{MemoryStore, PersistenceGateway};
use arena_server::{ArenaConfig, ArenaServer, Hub};
use clap::Parser;
use log::{error, info};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser, Debug)]
#[clap(author, version, about = "Authoritative Pong arena server")]
struct Args {
    /// Server IP address to bind to
    #[clap(short = 'H', long, default_value = "127.0.0.1")]
    host: String,
    /// Server port to listen on
    #[clap(short, long, default_value = "8080")]
    port: u16,
    /// Simulation ticks per second in every room
    #[clap(short, long, default_value = "60")]
    tick_rate: u32,
    /// Countdown before a casual match, in seconds
    #[clap(long, default_value = "5")]
    casual_countdown: u32,
    /// Countdown before a tournament match, in seconds
    #[clap(long, default_value = "3")]
    tournament_countdown: u32,
    /// Points needed to win a match
    #[clap(long, default_value = "5")]
    score_limit: u32,
    /// Maximum number of simultaneous connections
    #[clap(long, default_value = "1024")]
    max_connections: usize,
    /// Close connections silent for this many seconds
    #[clap(long, default_value = "60")]
    idle_timeout_secs: u64,
    /// Append-only journal for match results; kept in memory only when omitted
    #[clap(long)]
    journal: Option<PathBuf>,
}

impl From<Args> for ArenaConfig {
    fn from(args: Args) -> Self {
        ArenaConfig {
            bind_addr: format!("{}:{}", args.host, args.port),
            tick_rate: args.tick_rate,
            casual_countdown: args.casual_countdown,
            tournament_countdown: args.tournament_countdown,
            score_limit: args.score_limit,
            max_connections: args.max_connections,
            idle_timeout: Duration::from_secs(args.idle_timeout_secs),
            journal: args.journal,
            ..ArenaConfig::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let config = ArenaConfig::from(Args::parse());
    info!(
        "Starting arena: {} Hz, first to {}, countdowns {}s/{}s",
        config.tick_rate, config.score_limit, config.casual_countdown, config.tournament_countdown
    );

    let store: Arc<dyn PersistenceGateway> = match &config.journal {
        Some(path) => Arc::new(MemoryStore::open(path).await?),
        None => Arc::new(MemoryStore::new()),
    };

    let (hub, hub_task) = Hub::new(config.clone(), store, Box::new(MemoryDirectory::new())).spawn();
    let server = ArenaServer::bind(config, hub.clone()).await?;

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!("Listener failed: {}", e);
            }
        }
        result = hub_task => {
            if let Err(e) = result {
                error!("Hub task panicked: {}", e);
            }
            return Ok(());
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    hub.shutdown().await;
    Ok(())
}
