//! roomchat - multi-room chat client for the terminal
//!
//! Keeps a local copy of joined rooms in sync with a channel server and
//! restores it on the next start.

mod channel;
mod client;
mod config;
mod error;
mod models;
mod navigation;
mod storage;
mod store;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use client::ChatClient;
use config::Config;
use storage::{FileStore, Persistence};

#[derive(Parser)]
#[command(name = "roomchat")]
#[command(about = "Multi-room chat client for the terminal", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Server base URL (overrides the config file)
    #[arg(long, global = true)]
    server: Option<String>,

    /// Directory for saved rooms (overrides the config file)
    #[arg(long, global = true)]
    state_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start an interactive chat session
    Chat {
        /// Room to select on start (joined if needed)
        #[arg(short, long)]
        room: Option<String>,
    },

    /// List saved rooms
    Rooms,

    /// Print saved messages of a room
    History {
        /// Room name
        room: String,

        /// Maximum number of messages to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Forget a saved room, or every room when none is given
    Forget {
        /// Room name (all saved rooms when omitted)
        room: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let mut config = Config::load()?;
    if let Some(server) = cli.server {
        config.server_url = server;
    }
    if let Some(dir) = cli.state_dir {
        config.state_dir = Some(dir);
    }
    let mut persistence = Persistence::new(FileStore::new(config.state_dir()?));

    match cli.command {
        Commands::Chat { room } => {
            let url = config.socket_url()?;
            let (outbound, events) = channel::socket::spawn(url, config.heartbeat());
            let mut client = ChatClient::new(persistence, outbound);
            if let Some(room) = room {
                client.select_room(&room);
            }
            client.run(events).await?;
        }
        Commands::Rooms => {
            let store = persistence.load_store();
            let lines = client::view::room_list(&store);
            if lines.is_empty() {
                println!("(no saved rooms)");
            }
            for line in lines {
                println!("{}", line);
            }
        }
        Commands::History { room, limit } => {
            let store = persistence.load_store();
            let Some(saved) = store.room(&room) else {
                bail!("No saved room '{}'", room);
            };
            let lines = client::view::history(saved, Some(limit));
            if lines.is_empty() {
                println!("(no messages)");
            }
            for line in lines {
                println!("{}", line);
            }
        }
        Commands::Forget { room } => {
            let mut store = persistence.load_store();
            let names: Vec<String> = match room {
                Some(name) => vec![name],
                None => store.rooms().keys().cloned().collect(),
            };
            for name in names {
                if store.leave_room(&name).is_some() {
                    println!("Forgot '{}'", name);
                } else {
                    println!("No saved room '{}'", name);
                }
            }
            persistence.save_store(&store);
        }
    }

    Ok(())
}
