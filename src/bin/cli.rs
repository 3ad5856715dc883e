//! CLI for querying a cluster

use anyhow::Context;
use clap::{Parser, Subcommand};
use minisearch::common::SearchResponse;

#[derive(Parser)]
#[command(name = "minisearch")]
#[command(about = "minisearch distributed search CLI")]
#[command(version)]
struct Cli {
    /// Router or coordinator URL
    #[arg(long, default_value = "http://localhost:8080")]
    endpoint: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a search
    Search {
        /// Query text
        query: String,

        #[arg(long, default_value = "1")]
        page: usize,

        #[arg(long, default_value = "10")]
        page_size: usize,

        /// Include score explanations
        #[arg(long)]
        debug: bool,

        /// Field filters, e.g. --filter genres=Action
        #[arg(long = "filter", value_parser = parse_filter)]
        filters: Vec<(String, String)>,
    },

    /// Show cluster health as seen by the endpoint
    Status,
}

fn parse_filter(s: &str) -> Result<(String, String), String> {
    s.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected field=value, got {}", s))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let endpoint = cli.endpoint.trim_end_matches('/');

    match cli.command {
        Commands::Search {
            query,
            page,
            page_size,
            debug,
            filters,
        } => {
            let mut params = vec![
                ("q".to_string(), query),
                ("page".to_string(), page.to_string()),
                ("page_size".to_string(), page_size.to_string()),
                ("debug".to_string(), debug.to_string()),
            ];
            params.extend(filters.into_iter().map(|(k, v)| (format!("filter.{}", k), v)));

            let resp = client
                .get(format!("{}/search", endpoint))
                .query(&params)
                .send()
                .await
                .with_context(|| format!("cannot reach {}", endpoint))?;

            if !resp.status().is_success() {
                let status = resp.status();
                let body: serde_json::Value = resp.json().await.unwrap_or_default();
                anyhow::bail!(
                    "search failed ({}): {} {}",
                    status,
                    body["error"]["code"].as_str().unwrap_or("UNKNOWN"),
                    body["error"]["message"].as_str().unwrap_or("")
                );
            }

            let result: SearchResponse = resp.json().await?;
            println!(
                "{} hits (page {}, {} ms){}",
                result.total_hits,
                result.page,
                result.took_ms,
                if result.degraded { " [degraded]" } else { "" }
            );
            if !result.failed_groups.is_empty() {
                println!("  Unavailable groups: {}", result.failed_groups.join(", "));
            }
            for hit in &result.hits {
                println!(
                    "  {:>8}  {:>7.2}  {}",
                    hit.doc_id,
                    hit.score,
                    hit.matched_fields.join(",")
                );
                if let Some(explanation) = &hit.explanation {
                    println!("            {}", explanation);
                }
            }
        }

        Commands::Status => {
            let health: serde_json::Value = client
                .get(format!("{}/health", endpoint))
                .send()
                .await
                .with_context(|| format!("cannot reach {}", endpoint))?
                .json()
                .await?;
            println!("{}", serde_json::to_string_pretty(&health)?);

            // Coordinators expose replicas, routers expose coordinators
            for path in ["/health/replicas", "/health/coordinators"] {
                let resp = client.get(format!("{}{}", endpoint, path)).send().await?;
                if resp.status().is_success() {
                    let table: serde_json::Value = resp.json().await?;
                    println!("{}", serde_json::to_string_pretty(&table)?);
                }
            }
        }
    }

    Ok(())
}
