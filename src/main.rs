//! Maze Client - replicated game state for multiplayer maze combat
//!
//! Headless entry point. It handles:
//! - connecting to the game server and sending the join line
//! - reading movement, fire and chat commands from stdin
//! - printing a JSON scene snapshot to stdout on every redraw

mod app;
mod config;
mod console;
mod game;
mod net;

use std::io::Write;

use anyhow::Context;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::app::{spawn_stdin_reader, Command, SceneSnapshot, Session};
use crate::config::Config;
use crate::game::{Maze, World};
use crate::net::Link;

const COMMAND_QUEUE: usize = 64;
const REDRAW_QUEUE: usize = 64;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = Config::from_env()?;

    // Initialize tracing
    init_tracing(&config.log_level, config.log_json);

    info!("Starting Maze Client");
    info!(
        server = %config.server_host,
        port = config.server_port,
        "Server address"
    );

    let maze = load_maze(&config)?;
    let rng = match config.seed {
        Some(seed) => ChaCha8Rng::seed_from_u64(seed),
        None => ChaCha8Rng::from_entropy(),
    };
    let mut session = Session::new(World::new(maze, rng));

    let (command_tx, command_rx) = mpsc::channel(COMMAND_QUEUE);
    let (redraw_tx, redraw_rx) = broadcast::channel(REDRAW_QUEUE);

    let printer = tokio::spawn(print_snapshots(redraw_rx));
    spawn_stdin_reader(command_tx.clone());
    tokio::spawn(quit_on_signal(command_tx));

    let link = Link::connect(&config.server_host, config.server_port, &config.join_line).await?;
    let outcome = link.run(&mut session, command_rx, redraw_tx).await?;

    // The printer ends once the last sender is gone
    printer.await?;

    info!(?outcome, "Client shutdown complete");
    Ok(())
}

/// Initialize tracing/logging; stdout is reserved for snapshots
fn init_tracing(log_level: &str, json: bool) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    let json_layer = json.then(|| {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
    });
    let text_layer = (!json).then(|| {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_writer(std::io::stderr)
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .with(text_layer)
        .init();
}

fn load_maze(config: &Config) -> anyhow::Result<Maze> {
    let Some(path) = &config.layout_path else {
        return Ok(Maze::default());
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading maze layout {}", path.display()))?;
    let maze = Maze::parse(&text)
        .with_context(|| format!("parsing maze layout {}", path.display()))?;
    info!(
        path = %path.display(),
        width = maze.width(),
        height = maze.height(),
        "Loaded maze layout"
    );
    Ok(maze)
}

/// One JSON snapshot per line on stdout
async fn print_snapshots(mut redraw: broadcast::Receiver<SceneSnapshot>) {
    loop {
        match redraw.recv().await {
            Ok(snapshot) => {
                let line = match serde_json::to_string(&snapshot) {
                    Ok(line) => line,
                    Err(e) => {
                        warn!(error = %e, "Failed to encode snapshot");
                        continue;
                    }
                };
                if write_line(&line).is_err() {
                    debug!("Stdout closed");
                    break;
                }
            }
            Err(broadcast::error::RecvError::Lagged(n)) => {
                warn!(lagged_count = n, "Renderer lagged, skipping {} snapshots", n);
                // Continue - the next snapshot is complete anyway
            }
            Err(broadcast::error::RecvError::Closed) => {
                debug!("Redraw channel closed");
                break;
            }
        }
    }
}

fn write_line(line: &str) -> std::io::Result<()> {
    let mut out = std::io::stdout().lock();
    writeln!(out, "{line}")?;
    out.flush()
}

/// Ctrl+C leaves the game gracefully
async fn quit_on_signal(commands: mpsc::Sender<Command>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to install Ctrl+C handler");
        return;
    }
    info!("Received Ctrl+C, leaving the game");
    let _ = commands.send(Command::Quit).await;
}
