use clap::Parser;
use client::input::Walker;
use client::session::{run_sync_loop, ClientSession};
use client::transport::TcpTransport;
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::time::Duration;
use tokio::sync::watch;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:8080")]
    server: String,

    /// Number of input frames to play before disconnecting
    #[arg(short, long, default_value = "200")]
    moves: u32,

    /// Time between input frames in milliseconds
    #[arg(long, default_value = "50")]
    step_ms: u64,

    /// Give up on a call after this many milliseconds (wait forever if omitted)
    #[arg(short, long)]
    timeout_ms: Option<u64>,

    /// Seed for the walker, for a repeatable walk
    #[arg(long)]
    seed: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    info!("Starting client...");
    info!("Connecting to: {}", args.server);

    let mut transport = TcpTransport::new(&args.server);
    if let Some(ms) = args.timeout_ms {
        transport = transport.with_timeout(Duration::from_millis(ms));
    }

    let mut session = ClientSession::new(transport);
    let roster = session.connect().await?;
    let start = session
        .local_player()
        .map(|player| player.pos)
        .unwrap_or_default();
    info!(
        "Connected as {:?}, {} players online",
        session.local_id(),
        roster.len()
    );

    let (move_tx, move_rx) = watch::channel(start);
    let (roster_tx, mut roster_rx) = watch::channel(roster);
    let sync_task = tokio::spawn(run_sync_loop(session, move_rx, roster_tx));

    // Logs what a renderer would draw each time the roster changes.
    let view_task = tokio::spawn(async move {
        while roster_rx.changed().await.is_ok() {
            let roster = roster_rx.borrow_and_update().clone();
            info!("Roster: {} players", roster.len());
            for player in roster.players() {
                debug!("  {} at ({}, {})", player.id, player.pos.x, player.pos.y);
            }
        }
    });

    let rng = match args.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let mut walker = Walker::new(start, rng);
    let mut frames = tokio::time::interval(Duration::from_millis(args.step_ms.max(1)));

    let walk = async {
        for _ in 0..args.moves {
            frames.tick().await;
            if let Some(pos) = walker.step() {
                if move_tx.send(pos).is_err() {
                    break;
                }
            }
        }
    };

    tokio::select! {
        _ = walk => info!("Finished {} input frames", args.moves),
        _ = tokio::signal::ctrl_c() => info!("Received Ctrl+C, disconnecting..."),
    }

    drop(move_tx);
    let mut session = sync_task.await?;
    view_task.await?;

    match session.disconnect().await {
        Ok(()) => info!("Disconnected"),
        Err(e) => warn!("Disconnect failed: {}", e),
    }

    Ok(())
}
