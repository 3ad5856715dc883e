//! Shard replica: holds one partition of the corpus and answers
//! coordinator fan-out calls over the internal HTTP API.

pub mod http;
pub mod index;
pub mod server;

pub use index::{Document, InMemoryIndex, SearchBackend};
pub use server::ShardServer;
