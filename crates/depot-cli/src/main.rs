//! # depot CLI
//!
//! Command-line client for the Depot file-storage service.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use depot_config::logging::{init_logging, LogLevel};
use depot_config::Config;
use depot_proto::client::DepotClient;

#[derive(Parser)]
#[command(name = "depot")]
#[command(version, about = "Depot file-storage client", long_about = None)]
struct Cli {
    /// Server address (defaults to the configured listen address)
    #[arg(long, global = true)]
    addr: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload a local file
    Upload {
        /// File to upload
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Name to store it under (defaults to the file's name)
        #[arg(short, long)]
        name: Option<String>,
    },

    /// Download a stored file
    Download {
        /// Stored filename
        filename: String,

        /// Destination path (defaults to the filename in the current dir)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List stored files
    List,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging(LogLevel::Warn);

    let cli = Cli::parse();
    let addr = match cli.addr {
        Some(addr) => addr,
        None => Config::load()?.server.listen,
    };

    match cli.command {
        Commands::Upload { file, name } => {
            let name = match name {
                Some(name) => name,
                None => file
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .context("cannot derive an upload name from the given path")?,
            };

            let mut source = tokio::fs::File::open(&file)
                .await
                .with_context(|| format!("cannot open {}", file.display()))?;
            let client = DepotClient::connect(&addr).await?;
            let receipt = client.upload(&name, &mut source).await?;
            println!(
                "uploaded {} ({} bytes) at {}",
                receipt.filename, receipt.size, receipt.created_at
            );
        }

        Commands::Download { filename, output } => {
            let output = output.unwrap_or_else(|| PathBuf::from(&filename));
            let mut dest = tokio::fs::File::create(&output)
                .await
                .with_context(|| format!("cannot create {}", output.display()))?;

            let client = DepotClient::connect(&addr).await?;
            let received = client.download(&filename, &mut dest).await?;
            println!("downloaded {} ({} bytes) to {}", filename, received, output.display());
        }

        Commands::List => {
            let client = DepotClient::connect(&addr).await?;
            let mut files = client.list().await?;
            files.sort_by(|a, b| a.filename.cmp(&b.filename));

            if files.is_empty() {
                println!("no files stored");
            } else {
                for meta in files {
                    println!("{}\t{}\t{}", meta.filename, meta.created_at, meta.updated_at);
                }
            }
        }
    }

    Ok(())
}
