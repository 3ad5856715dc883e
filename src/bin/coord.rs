//! Coordinator binary

use clap::{Parser, Subcommand};
use minisearch::common::{
    duration_ms, parse_duration, parse_groups, Config, NodeRole, SuspectPolicy,
};
use minisearch::Coordinator;
use std::net::SocketAddr;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "minisearch-coord")]
#[command(about = "minisearch coordinator with quorum reads")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start coordinator server
    Serve {
        /// Node ID (defaults to node_id from the config file)
        #[arg(long)]
        id: Option<String>,

        /// Bind address for HTTP
        #[arg(long)]
        bind: Option<SocketAddr>,

        /// Shard groups, e.g. "0=http://a:8001,http://b:8002;1=http://c:8003"
        #[arg(long)]
        groups: Option<String>,

        /// exclude, include or fallback
        #[arg(long)]
        suspect_policy: Option<SuspectPolicy>,

        /// Fail with 503 instead of serving partial results
        #[arg(long)]
        fail_closed: bool,

        /// Per-replica search timeout, e.g. "2s" or "800ms"
        #[arg(long, value_parser = parse_duration)]
        query_timeout: Option<Duration>,

        /// Deadline of one group fan-out
        #[arg(long, value_parser = parse_duration)]
        total_timeout: Option<Duration>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    // Load config from file and environment, then apply CLI overrides
    let config = Config::load()?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
    config.check_role(NodeRole::Coordinator);

    match cli.command {
        Commands::Serve {
            id,
            bind,
            groups,
            suspect_policy,
            fail_closed,
            query_timeout,
            total_timeout,
        } => {
            let mut coord_config = config.coordinator.unwrap_or_default();
            if let Some(bind) = bind {
                coord_config.bind_addr = bind;
            }
            if let Some(groups) = groups {
                coord_config.groups = parse_groups(&groups)?;
            }
            if let Some(policy) = suspect_policy {
                coord_config.suspect_policy = policy;
            }
            if fail_closed {
                coord_config.fail_open = false;
            }
            if let Some(timeout) = query_timeout {
                coord_config.query_timeout_ms = duration_ms(timeout);
            }
            if let Some(timeout) = total_timeout {
                coord_config.total_timeout_ms = duration_ms(timeout);
            }

            let node_id = id.unwrap_or(config.node_id);
            Coordinator::new(coord_config, node_id).serve().await?;
        }
    }

    Ok(())
}
