//! Shard replica binary

use clap::{Parser, Subcommand};
use minisearch::common::{Config, NodeRole};
use minisearch::ShardServer;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "minisearch-shard")]
#[command(about = "minisearch shard replica")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start shard replica server
    Serve {
        /// Replica ID, stable across restarts
        #[arg(long)]
        id: Option<String>,

        /// Shard group this replica belongs to
        #[arg(long)]
        group: Option<String>,

        /// Bind address for HTTP
        #[arg(long)]
        bind: Option<SocketAddr>,

        /// JSON array of documents
        #[arg(long)]
        data: Option<PathBuf>,

        #[arg(long)]
        shard_index: Option<u64>,

        #[arg(long)]
        num_shards: Option<u64>,
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
    config.check_role(NodeRole::Shard);

    match cli.command {
        Commands::Serve {
            id,
            group,
            bind,
            data,
            shard_index,
            num_shards,
        } => {
            let mut shard_config = config.shard.unwrap_or_default();
            if let Some(id) = id {
                shard_config.replica_id = id;
            }
            if let Some(group) = group {
                shard_config.shard_group_id = group;
            }
            if let Some(bind) = bind {
                shard_config.bind_addr = bind;
            }
            if data.is_some() {
                shard_config.data_path = data;
            }
            if let Some(index) = shard_index {
                shard_config.shard_index = index;
            }
            if let Some(n) = num_shards {
                shard_config.num_shards = n;
            }

            ShardServer::new(shard_config).serve().await?;
        }
    }

    Ok(())
}
