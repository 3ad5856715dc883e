//! Router binary

use clap::{Parser, Subcommand};
use minisearch::common::{duration_ms, parse_duration, Config, NodeRole};
use minisearch::RouterServer;
use std::net::SocketAddr;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "minisearch-router")]
#[command(about = "minisearch router with coordinator failover")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start router server
    Serve {
        /// Node ID (defaults to node_id from the config file)
        #[arg(long)]
        id: Option<String>,

        /// Bind address for HTTP
        #[arg(long)]
        bind: Option<SocketAddr>,

        /// Coordinator URLs (comma-separated)
        #[arg(long, value_delimiter = ',')]
        coordinators: Vec<String>,

        /// Retries against other coordinators after a transport failure
        #[arg(long)]
        max_retries: Option<usize>,

        /// Timeout of one forwarded search, e.g. "3s"
        #[arg(long, value_parser = parse_duration)]
        forward_timeout: Option<Duration>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::load()?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
    config.check_role(NodeRole::Router);

    match cli.command {
        Commands::Serve {
            id,
            bind,
            coordinators,
            max_retries,
            forward_timeout,
        } => {
            let mut router_config = config.router.unwrap_or_default();
            if let Some(bind) = bind {
                router_config.bind_addr = bind;
            }
            if !coordinators.is_empty() {
                router_config.coordinators = coordinators;
            }
            if let Some(retries) = max_retries {
                router_config.max_retries = retries;
            }
            if let Some(timeout) = forward_timeout {
                router_config.forward_timeout_ms = duration_ms(timeout);
            }

            let node_id = id.unwrap_or(config.node_id);
            RouterServer::new(router_config, node_id).serve().await?;
        }
    }

    Ok(())
}
