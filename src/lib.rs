//! # minisearch
//!
//! A distributed full-text search cluster with:
//! - Heartbeat failure detection of shard replicas (ALIVE / SUSPECT / DOWN)
//! - Quorum reads with per-call timeouts and a global deadline
//! - Deterministic merge, ranking and pagination across shard groups
//! - A stateless router failing over between coordinators
//!
//! ## Architecture

#![allow(clippy::result_large_err)]
//!
//! ```text
//!            ┌──────────────┐
//!  client ──▶│    Router    │  round-robin, retry on transport failure
//!            └──────┬───────┘
//!         ┌─────────┴──────────┐
//!   ┌─────▼───────┐     ┌──────▼──────┐
//!   │ Coordinator │     │ Coordinator │  health table + quorum fan-out
//!   └─────┬───────┘     └──────┬──────┘
//!         └─────────┬──────────┘
//!     ┌─────────────┼──────────────┐
//! ┌───▼────────┐ ┌──▼─────────┐ ┌──▼─────────┐
//! │ Group 0    │ │ Group 1    │ │ Group 2    │
//! │ r0 r1 r2   │ │ r0 r1 r2   │ │ r0 r1 r2   │
//! └────────────┘ └────────────┘ └────────────┘
//! ```
//!
//! ## Usage
//!
//! ### Start a shard replica
//! ```bash
//! minisearch-shard serve --id 0-0 --group 0 --bind 0.0.0.0:8001 \
//!   --data ./movies.json --shard-index 0 --num-shards 2
//! ```
//!
//! ### Start a coordinator
//! ```bash
//! minisearch-coord serve --id coord-1 --bind 0.0.0.0:9000 \
//!   --groups "0=http://localhost:8001,http://localhost:8002;1=http://localhost:8003"
//! ```
//!
//! ### Start a router
//! ```bash
//! minisearch-router serve --bind 0.0.0.0:8080 \
//!   --coordinators http://localhost:9000,http://localhost:9001
//! ```
//!
//! ### Use the CLI
//! ```bash
//! minisearch search "the matrix" --page 1 --page-size 10
//! minisearch status
//! ```

pub mod common;
pub mod coordinator;
pub mod router;
pub mod shard;

// Re-export commonly used types
pub use common::{Config, Error, Result};
pub use coordinator::Coordinator;
pub use router::RouterServer;
pub use shard::ShardServer;

/// Current version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build info
pub const BUILD_INFO: &str = concat!(env!("CARGO_PKG_VERSION"), " (", env!("CARGO_PKG_NAME"), ")");
