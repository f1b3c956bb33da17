use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::io::BufReader;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use poa_node::{load_config, Node};

/// PoA validator key lifecycle node
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Set logging level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Answer JSON-lines requests from stdin on stdout
    Serve,
    /// Apply a file of JSON-lines requests and print the responses
    Apply {
        file: PathBuf,
    },
    /// Print the deployment status
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // RUST_LOG wins over --log-level; stdout carries responses, logs go to stderr.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|err| anyhow::anyhow!(err))?;

    let config = load_config(args.config.as_deref()).context("loading configuration")?;
    info!("Loaded configuration: {:?}", config);
    let node = Node::open(&config).context("opening deployment")?;

    match args.command {
        Command::Serve => {
            let stdin = BufReader::new(tokio::io::stdin());
            tokio::select! {
                summary = node.serve(stdin, tokio::io::stdout()) => {
                    summary?;
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("Shutdown signal received");
                    node.flush().await?;
                }
            }
        }
        Command::Apply { file } => {
            let input = tokio::fs::File::open(&file)
                .await
                .with_context(|| format!("opening {}", file.display()))?;
            let summary = node.serve(BufReader::new(input), tokio::io::stdout()).await?;
            if summary.rejected > 0 {
                error!("{} of {} requests were rejected", summary.rejected, summary.handled);
            }
        }
        Command::Status => {
            let status = node.status().await?;
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
    }
    Ok(())
}
