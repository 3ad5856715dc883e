//! Router server

use crate::common::{Result, RouterConfig};
use crate::coordinator::server::shutdown_signal;
use crate::router::http::{create_router, RouterState};
use crate::router::registry::CoordinatorRegistry;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;

pub struct RouterServer {
    config: RouterConfig,
    node_id: String,
}

impl RouterServer {
    pub fn new(config: RouterConfig, node_id: String) -> Self {
        Self { config, node_id }
    }

    pub async fn serve(self) -> Result<()> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        self.serve_on(listener, shutdown_signal()).await
    }

    pub async fn serve_on<F>(self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.config.validate()?;

        tracing::info!("Starting router: {}", self.node_id);
        tracing::info!("  HTTP API: {}", listener.local_addr()?);
        tracing::info!("  Coordinators: {}", self.config.coordinators.join(", "));
        tracing::info!("  Max retries: {}", self.config.max_retries);

        let registry = Arc::new(CoordinatorRegistry::new(
            &self.config.coordinators,
            self.config.policy(),
        )?);
        let _probes = registry.start();

        let router = create_router(RouterState {
            node_id: self.node_id.clone(),
            registry,
        });

        tracing::info!("✓ Router ready");

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await?;

        tracing::info!("Router {} stopped", self.node_id);
        Ok(())
    }
}
