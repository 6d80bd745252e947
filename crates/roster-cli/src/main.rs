use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::time::Duration;

mod commands;

#[derive(Parser)]
#[command(name = "roster", about = "Roster cluster membership coordinator")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to configuration file
    #[arg(long, global = true)]
    config: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run an in-process cluster and log what each node's handler observes
    Simulate {
        /// Number of nodes to start
        #[arg(long, default_value = "3")]
        nodes: u16,
        /// Milliseconds to let events settle between steps
        #[arg(long, default_value = "500")]
        settle_ms: u64,
        /// Print Prometheus metrics collected during the run
        #[arg(long)]
        metrics: bool,
    },
    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "roster=info".into());
    if cli.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    let config = roster_core::NodeConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Simulate {
            nodes,
            settle_ms,
            metrics,
        } => {
            let metrics_handle = if metrics {
                Some(
                    metrics_exporter_prometheus::PrometheusBuilder::new()
                        .install_recorder()
                        .context("Failed to install Prometheus recorder")?,
                )
            } else {
                None
            };

            commands::simulate::run(config, nodes, Duration::from_millis(settle_ms)).await?;

            if let Some(handle) = metrics_handle {
                println!("{}", handle.render());
            }
        }
        Commands::Config => {
            commands::config::print(&config)?;
        }
    }

    Ok(())
}
