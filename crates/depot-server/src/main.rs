use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tokio::signal;

use depot_config::logging::{init_logging, LogLevel};
use depot_config::Config;
use depot_server::Server;

#[derive(Parser)]
#[command(name = "depotd")]
#[command(version, about = "Depot file-storage daemon", long_about = None)]
struct Cli {
    /// Config file (defaults to ~/.depot/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Listen address override
    #[arg(long)]
    listen: Option<String>,

    /// Storage root override
    #[arg(long)]
    storage_root: Option<PathBuf>,

    /// Concurrent upload/download limit override
    #[arg(long)]
    transfer_limit: Option<usize>,

    /// Concurrent list limit override
    #[arg(long)]
    list_limit: Option<usize>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the daemon (default)
    Start,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging(LogLevel::Info);

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    if let Some(listen) = cli.listen {
        config.server.listen = listen;
    }
    if let Some(root) = cli.storage_root {
        config.storage.root = root;
    }
    if let Some(n) = cli.transfer_limit {
        config.limits.transfer = n;
    }
    if let Some(n) = cli.list_limit {
        config.limits.list = n;
    }

    match cli.command.unwrap_or(Commands::Start) {
        Commands::Start => {
            let server = Server::bind(&config).await?;
            server
                .run(async {
                    let _ = signal::ctrl_c().await;
                })
                .await?;
        }
    }

    Ok(())
}
