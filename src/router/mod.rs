//! Router: stateless client entry point
//!
//! Spreads searches over coordinators round-robin and fails over when a
//! coordinator stops answering.

pub mod http;
pub mod registry;
pub mod server;

pub use registry::{CoordinatorRegistry, RouterPolicy};
pub use server::RouterServer;
