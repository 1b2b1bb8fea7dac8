use clap::Parser;
use log::info;
use server::config::ServerConfig;
use server::network::Server;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server IP address to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Server port to listen on
    #[arg(short, long, default_value = "8080")]
    port: u16,

    /// Maximum number of concurrent connections (unlimited if omitted)
    #[arg(short, long)]
    max_clients: Option<usize>,

    /// Evict players that have not synced for this many seconds
    #[arg(long)]
    player_ttl_secs: Option<u64>,

    /// How often to look for idle players, in milliseconds
    #[arg(long, default_value = "1000")]
    sweep_interval_ms: u64,

    /// Only let a connection act for the player it connected as
    #[arg(long)]
    strict_sessions: bool,

    /// Remove a player as soon as its connection closes
    #[arg(long)]
    evict_on_disconnect: bool,
}

impl From<Args> for ServerConfig {
    fn from(args: Args) -> Self {
        ServerConfig {
            addr: format!("{}:{}", args.host, args.port),
            max_clients: args.max_clients,
            player_ttl: args.player_ttl_secs.map(Duration::from_secs),
            sweep_interval: Duration::from_millis(args.sweep_interval_ms.max(1)),
            strict_sessions: args.strict_sessions,
            evict_on_disconnect: args.evict_on_disconnect,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let config = ServerConfig::from(Args::parse());
    info!("Starting server with {:?}", config);

    let server = Server::bind(config).await?;

    server
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                eprintln!("Failed to listen for Ctrl+C: {}", e);
                std::future::pending::<()>().await;
            }
            info!("Received Ctrl+C, shutting down gracefully...");
        })
        .await;

    Ok(())
}
